//! Container processing-state machine
//!
//! States move along a fixed transition graph; [`transition_state`] is the
//! single validator. Containers store the state as an `AtomicU8` so hot
//! paths can poll it without taking the container lock.

use std::sync::Arc;

use crate::container::SignalSourceContainer;

/// Lifecycle state of a container's data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessingState {
    /// No data, or data present but not yet published to readers
    #[default]
    Idle = 0,
    /// Data available and consumable
    Ready = 1,
    /// A processor is actively working on the data
    Processing = 2,
    /// Processing finished, results await consumption
    Processed = 3,
    /// Processing failed; requires explicit reset
    Error = 4,
    /// Scheduled for detachment from the processing graph
    NeedsRemoval = 5,
}

impl ProcessingState {
    /// Decode from the atomic representation.
    pub fn from_u8(value: u8) -> ProcessingState {
        match value {
            1 => ProcessingState::Ready,
            2 => ProcessingState::Processing,
            3 => ProcessingState::Processed,
            4 => ProcessingState::Error,
            5 => ProcessingState::NeedsRemoval,
            _ => ProcessingState::Idle,
        }
    }

    /// Encode for atomic storage.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Stable lowercase name, for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingState::Idle => "idle",
            ProcessingState::Ready => "ready",
            ProcessingState::Processing => "processing",
            ProcessingState::Processed => "processed",
            ProcessingState::Error => "error",
            ProcessingState::NeedsRemoval => "needs_removal",
        }
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `new` is a legal successor of `current`.
///
/// Same-state requests are accepted as no-ops. `Error` can only be left
/// through an explicit reset to `Idle`; `NeedsRemoval` likewise.
pub fn transition_state(current: ProcessingState, new: ProcessingState) -> bool {
    use ProcessingState::*;
    if current == new {
        return true;
    }
    match current {
        Idle => matches!(new, Ready | Error),
        Ready => matches!(new, Processing | Idle | Error),
        Processing => matches!(new, Processed | Error),
        Processed => matches!(new, Ready | Idle),
        Error => matches!(new, Idle),
        NeedsRemoval => matches!(new, Idle),
    }
}

/// Callback invoked after a successful state transition, while the
/// container lock is held. Keep these short and re-entrant-safe: they may
/// call back into read-only container methods but must not block.
pub type StateCallback = Box<dyn Fn(&Arc<SignalSourceContainer>, ProcessingState) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::ProcessingState::*;
    use super::*;

    const ALL: [ProcessingState; 6] = [Idle, Ready, Processing, Processed, Error, NeedsRemoval];

    #[test]
    fn same_state_is_accepted() {
        for state in ALL {
            assert!(transition_state(state, state));
        }
    }

    #[test]
    fn legal_edges() {
        assert!(transition_state(Idle, Ready));
        assert!(transition_state(Idle, Error));
        assert!(transition_state(Ready, Processing));
        assert!(transition_state(Ready, Idle));
        assert!(transition_state(Ready, Error));
        assert!(transition_state(Processing, Processed));
        assert!(transition_state(Processing, Error));
        assert!(transition_state(Processed, Ready));
        assert!(transition_state(Processed, Idle));
        assert!(transition_state(Error, Idle));
        assert!(transition_state(NeedsRemoval, Idle));
    }

    #[test]
    fn illegal_edges() {
        assert!(!transition_state(Idle, Processing));
        assert!(!transition_state(Idle, Processed));
        assert!(!transition_state(Idle, NeedsRemoval));
        assert!(!transition_state(Ready, Processed));
        assert!(!transition_state(Ready, NeedsRemoval));
        assert!(!transition_state(Processing, Idle));
        assert!(!transition_state(Processing, Ready));
        assert!(!transition_state(Processing, NeedsRemoval));
        assert!(!transition_state(Processed, Processing));
        assert!(!transition_state(Processed, Error));
        assert!(!transition_state(Processed, NeedsRemoval));
        // Same-state requests are no-ops, so only distinct targets here
        for target in [Ready, Processing, Processed] {
            assert!(!transition_state(Error, target));
            assert!(!transition_state(NeedsRemoval, target));
        }
        assert!(!transition_state(Error, NeedsRemoval));
    }

    #[test]
    fn atomic_round_trip() {
        for state in ALL {
            assert_eq!(ProcessingState::from_u8(state.as_u8()), state);
        }
        // Unknown values decode to the safe default
        assert_eq!(ProcessingState::from_u8(200), Idle);
    }
}
