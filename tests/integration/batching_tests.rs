//! Request batching tests against a loaded image.
//!
//! Tests verify:
//! - Requests issued in the same frame share one flush
//! - Each request in a batch gets its own read and its own result
//! - Aborts and failures stay local to the request that caused them

use std::sync::Arc;
use std::time::Duration;

use ngff_streamer::dataset::ImageConfig;
use ngff_streamer::pixel::{
    BaseSelection, FrameInterval, FrameScheduler, ManualScheduler, NextTick, PixelBuffer,
};
use ngff_streamer::store::AbortSignal;
use ngff_streamer::tile::{TileRequest, TileService};
use ngff_streamer::StoreError;

use super::test_utils::{ome_pyramid_store, pyramid_value, service_for};

async fn fixture_service(scheduler: Arc<dyn FrameScheduler>) -> TileService {
    let store = Arc::new(ome_pyramid_store("memory://batching"));
    service_for(store, "/", ImageConfig::new("/data/fixture.zarr"), Some(scheduler)).await
}

fn first_value(buffer: &PixelBuffer) -> u16 {
    match buffer {
        PixelBuffer::Uint16(values) => values[0],
        other => panic!("expected uint16 pixels, got {:?}", other.dtype()),
    }
}

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn test_same_frame_requests_share_one_flush() {
    let scheduler = Arc::new(ManualScheduler::new());
    let service = fixture_service(scheduler.clone()).await;
    let image = service.image("fixture").unwrap();
    let source = image.level(0).unwrap();
    let all = BaseSelection::default();

    let a = source.get_tile(0, 0, &all, None);
    let b = source.get_tile(1, 0, &all, None);
    let c = source.get_tile(2, 2, &all, None);

    // nothing has been read yet; one flush is armed
    assert_eq!(scheduler.scheduled(), 1);
    assert_eq!(scheduler.pending(), 1);

    scheduler.run_pending().await;
    let (a, b, c) = (a.await.unwrap(), b.await.unwrap(), c.await.unwrap());

    assert_eq!(first_value(&a.data), pyramid_value(0, 0, 0));
    assert_eq!(first_value(&b.data), pyramid_value(0, 0, 4));
    assert_eq!(first_value(&c.data), pyramid_value(0, 8, 8));
    assert_eq!((c.width, c.height), (4, 2));

    let stats = source.batch_stats();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.flushes_scheduled, 1);
    assert_eq!(stats.flushes_run, 1);
}

#[tokio::test]
async fn test_request_after_flush_arms_new_flush() {
    let scheduler = Arc::new(ManualScheduler::new());
    let service = fixture_service(scheduler.clone()).await;
    let source = service.image("fixture").unwrap().level(1).unwrap();
    let all = BaseSelection::default();

    let first = source.get_tile(0, 0, &all, None);
    scheduler.run_pending().await;
    first.await.unwrap();

    let second = source.get_tile(1, 1, &all, None);
    assert_eq!(scheduler.scheduled(), 2);
    scheduler.run_pending().await;
    second.await.unwrap();

    assert_eq!(source.batch_stats().flushes_run, 2);
}

#[tokio::test]
async fn test_concurrent_service_requests_batch_per_frame() {
    let service = fixture_service(Arc::new(FrameInterval::new(Duration::from_millis(5)))).await;

    let (a, b, c) = tokio::join!(
        service.get_tile(TileRequest::new("fixture", 0, 0, 0)),
        service.get_tile(TileRequest::new("fixture", 0, 1, 1)),
        service.get_tile(
            TileRequest::new("fixture", 0, 0, 0)
                .with_selection(BaseSelection::Positional(vec![1, 0, 0]))
        ),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let stats = service.image("fixture").unwrap().level(0).unwrap().batch_stats();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.flushes_run, 1);
}

#[tokio::test]
async fn test_levels_batch_independently() {
    let service = fixture_service(Arc::new(NextTick)).await;

    let (a, b) = tokio::join!(
        service.get_tile(TileRequest::new("fixture", 0, 0, 0)),
        service.get_tile(TileRequest::new("fixture", 1, 0, 0)),
    );
    assert!(a.is_ok() && b.is_ok());

    let image = service.image("fixture").unwrap();
    assert_eq!(image.level(0).unwrap().batch_stats().flushes_run, 1);
    assert_eq!(image.level(1).unwrap().batch_stats().flushes_run, 1);
}

// =============================================================================
// Isolation
// =============================================================================

#[tokio::test]
async fn test_abort_affects_only_its_request() {
    let scheduler = Arc::new(ManualScheduler::new());
    let service = fixture_service(scheduler.clone()).await;
    let source = service.image("fixture").unwrap().level(0).unwrap();
    let all = BaseSelection::default();

    let signal = AbortSignal::new();
    let aborted = source.get_tile(0, 0, &all, Some(signal.clone()));
    let sibling = source.get_tile(1, 0, &all, None);
    signal.abort();

    scheduler.run_pending().await;
    assert_eq!(aborted.await.unwrap_err(), StoreError::Aborted);
    assert!(sibling.await.is_ok());
}

#[tokio::test]
async fn test_invalid_selection_fails_alone() {
    let scheduler = Arc::new(ManualScheduler::new());
    let service = fixture_service(scheduler.clone()).await;
    let source = service.image("fixture").unwrap().level(0).unwrap();

    let bad = source.get_tile(0, 0, &BaseSelection::Positional(vec![7, 0, 0]), None);
    let good = source.get_tile(0, 0, &BaseSelection::Positional(vec![1, 0, 0]), None);
    assert_eq!(scheduler.scheduled(), 1);

    scheduler.run_pending().await;
    assert!(matches!(bad.await, Err(StoreError::InvalidSelection { .. })));
    assert_eq!(first_value(&good.await.unwrap().data), pyramid_value(1, 0, 0));
}

#[tokio::test]
async fn test_dropped_future_does_not_block_batch() {
    let scheduler = Arc::new(ManualScheduler::new());
    let service = fixture_service(scheduler.clone()).await;
    let source = service.image("fixture").unwrap().level(0).unwrap();
    let all = BaseSelection::default();

    drop(source.get_tile(0, 0, &all, None));
    let kept = source.get_tile(1, 0, &all, None);

    scheduler.run_pending().await;
    assert!(kept.await.is_ok());
    // the dropped request was still queued and read
    assert_eq!(source.batch_stats().requests, 2);
}
