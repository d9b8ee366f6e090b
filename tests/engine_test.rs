//! Integration tests for the full processing cycle

use ndsignal::data::DataVariant;
use ndsignal::region::{Region, RegionCache, RegionCacheManager, RegionSegment};
use ndsignal::{
    ContainerBuffer, ContainerConfig, ContainerToBufferAdapter, ContiguousAccessProcessor,
    DataProcessor, ProcessingState, SignalSourceContainer,
};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn stereo_ramp(buffer_size: usize) -> Arc<SignalSourceContainer> {
    init_tracing();
    let container = SignalSourceContainer::new(
        ContainerConfig::new()
            .with_channels(2)
            .with_frames(4)
            .with_buffer_size(buffer_size),
    );
    container
        .set_raw_data(
            0,
            DataVariant::F64(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]),
        )
        .unwrap();
    container
}

/// Two readers on channel 0 and one on channel 1 all gate one generation.
#[test]
fn barrier_gates_on_every_registered_reader() {
    let container = stereo_ramp(4);
    let a = container.register_dimension_reader(0);
    let b = container.register_dimension_reader(0);
    let c = container.register_dimension_reader(1);

    container.mark_dimension_consumed(0, a);
    container.mark_dimension_consumed(1, c);
    assert!(!container.all_dimensions_consumed());

    container.mark_dimension_consumed(0, b);
    assert!(container.all_dimensions_consumed());

    // A new generation resets consumption but keeps registrations
    container.clear_all_consumption();
    assert!(!container.all_dimensions_consumed());
    assert!(container.has_active_readers());
}

/// Filling past capacity evicts exactly the least-recently-accessed
/// entry; a hit protects an entry from the next overflow.
#[test]
fn lru_cache_evicts_coldest_and_promotes_hits() {
    let manager = RegionCacheManager::new(3);
    manager.initialize();

    let regions: Vec<Region> = (0..4)
        .map(|i| Region::span(vec![i * 10], vec![i * 10 + 5]))
        .collect();
    for region in regions.iter().take(3) {
        manager.cache_region(RegionCache {
            source_region: region.clone(),
            ..Default::default()
        });
    }

    // Touch the oldest so the second-oldest becomes the eviction victim
    assert!(manager.get_cached_region(&regions[0]).is_some());
    manager.cache_region(RegionCache {
        source_region: regions[3].clone(),
        ..Default::default()
    });

    assert_eq!(manager.len(), 3);
    assert!(manager.get_cached_region(&regions[0]).is_some());
    assert!(manager.get_cached_region(&regions[1]).is_none());
    assert!(manager.get_cached_region(&regions[2]).is_some());
    assert!(manager.get_cached_region(&regions[3]).is_some());
}

/// Segments hydrated through the manager carry the cached payload.
#[test]
fn segment_cache_round_trip_through_manager() {
    let manager = RegionCacheManager::new(4);
    manager.initialize();

    let region = Region::span(vec![0, 0], vec![3, 1]);
    let mut warm = RegionSegment::from_region(region.clone());
    warm.mark_cached(vec![DataVariant::F64(vec![1.0, 2.0, 3.0, 4.0])]);
    manager.cache_segment(&warm);

    let cold = RegionSegment::from_region(region);
    let hydrated = manager.get_segment_with_cache(&cold).unwrap();
    assert!(hydrated.is_cached);
    assert_eq!(
        hydrated.cache.data,
        vec![DataVariant::F64(vec![1.0, 2.0, 3.0, 4.0])]
    );
}

/// A looping window walk stays inside the loop region: frames {1,2}
/// forever, per channel.
#[test]
fn looping_window_walk_repeats_loop_frames() {
    let container = stereo_ramp(4);
    container.set_looping(true);
    container.set_loop_region(Region::span(vec![1, 0], vec![2, 1]));
    container.set_read_position(&[1, 1]);

    let mut processor = ContiguousAccessProcessor::new().with_output_shape(vec![2, 2]);
    processor.on_attach(&container).unwrap();

    for _ in 0..3 {
        processor.process(&container).unwrap();
        let processed = container.get_processed_data();
        assert_eq!(processed[0], DataVariant::F64(vec![0.3, 0.5]));
        assert_eq!(processed[1], DataVariant::F64(vec![0.4, 0.6]));
        assert_eq!(container.read_positions(), vec![1, 1]);
    }
}

/// Full consumer-driven cycle with one adapter per channel: both buffers
/// land their channel's samples and the container is back to Ready only
/// once both have consumed.
#[test]
fn end_to_end_two_adapter_cycle() {
    let container = stereo_ramp(4);
    container.create_default_processor().unwrap();
    assert_eq!(container.processing_state(), ProcessingState::Ready);

    let mut ch0 = ContainerBuffer::new(container.clone(), 0).unwrap();
    let mut ch1 = ContainerBuffer::new(container.clone(), 1).unwrap();

    ch0.process();
    assert_eq!(container.processing_state(), ProcessingState::Processed);

    ch1.process();
    assert_eq!(ch0.samples(), vec![0.1, 0.3, 0.5, 0.7]);
    assert_eq!(ch1.samples(), vec![0.2, 0.4, 0.6, 0.8]);
    assert_eq!(container.processing_state(), ProcessingState::Ready);
}

/// A render thread draining cycles and a control thread flipping buffer
/// flags and tearing the container down must not block each other.
#[test]
fn concurrent_consumption_and_teardown_complete() {
    let container = stereo_ramp(4);
    container.set_looping(true);
    container.create_default_processor().unwrap();
    let mut ch0 = ContainerBuffer::new(container.clone(), 0).unwrap();

    let control = container.clone();
    let render = std::thread::spawn(move || {
        for _ in 0..200 {
            ch0.process();
        }
    });
    let controller = std::thread::spawn(move || {
        for _ in 0..200 {
            control.mark_buffers_for_processing(false);
        }
        control.update_processing_state(ProcessingState::NeedsRemoval);
    });
    render.join().unwrap();
    controller.join().unwrap();

    assert_eq!(container.processing_state(), ProcessingState::NeedsRemoval);
    assert!(container.get_channel_buffer(0).lock().marked_for_removal);
}

/// Loaders fill, flip ready, and detach cleanly.
#[test]
fn loader_lifecycle() {
    let container = SignalSourceContainer::new(ContainerConfig::new().with_buffer_size(4));
    container.setup(4, 48_000.0, 2);
    container
        .set_raw_data(
            0,
            DataVariant::F64(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]),
        )
        .unwrap();
    container.create_default_processor().unwrap();

    let buffer = container.get_channel_buffer(0);
    let mut adapter = ContainerToBufferAdapter::new(container.clone(), 0);
    adapter.on_attach(&buffer).unwrap();
    adapter.process(&buffer);
    assert_eq!(buffer.lock().samples, vec![0.1, 0.3, 0.5, 0.7]);

    adapter.on_detach(&buffer);
    assert!(!container.has_active_readers());

    // Teardown path: removal reaches the buffer
    container.update_processing_state(ProcessingState::NeedsRemoval);
    assert!(buffer.lock().marked_for_removal);
}
