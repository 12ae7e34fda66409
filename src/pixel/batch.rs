//! Per-frame request batching.
//!
//! Viewers issue bursts of tile requests while panning. Each request is
//! queued, and the first request of a burst arms a single flush through a
//! [`FrameScheduler`]. The flush drains everything queued so far and issues
//! one store read per request:
//!
//! ```text
//!   get_tile ──┐
//!   get_tile ──┼──► queue ──(armed once)──► scheduler ──► flush
//!   get_raster ┘                                            │
//!                                  ┌────────────┬───────────┤
//!                                  ▼            ▼           ▼
//!                               read #1      read #2     read #3
//!                                  │            │           │
//!                               oneshot      oneshot     oneshot
//! ```
//!
//! Reads run as independent tasks: a failing or slow read never affects
//! its siblings. Requests queued while a flush is running arm a new flush.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::store::{AbortSignal, ArrayChunk, ArrayHandle, DimSelection, SharedStore};

use super::dtype::{DtypeAdapter, PixelBuffer};

/// Default frame period when frame-aligned flushing is enabled.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// A flush waiting to be driven by a scheduler.
pub type FlushFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// =============================================================================
// Schedulers
// =============================================================================

/// Decides when an armed flush runs.
pub trait FrameScheduler: Send + Sync {
    fn schedule(&self, flush: FlushFuture);
}

/// Flush at the next Tokio yield point.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextTick;

impl FrameScheduler for NextTick {
    fn schedule(&self, flush: FlushFuture) {
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            flush.await;
        });
    }
}

/// Flush once per fixed frame period.
#[derive(Debug, Clone, Copy)]
pub struct FrameInterval {
    period: Duration,
}

impl FrameInterval {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for FrameInterval {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl FrameScheduler for FrameInterval {
    fn schedule(&self, flush: FlushFuture) {
        let period = self.period;
        tokio::spawn(async move {
            tokio::time::sleep(period).await;
            flush.await;
        });
    }
}

/// Holds armed flushes until [`run_pending`](Self::run_pending) is called.
///
/// Makes batch boundaries deterministic in tests.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<FlushFuture>>,
    scheduled: AtomicUsize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total flushes ever scheduled.
    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Flushes scheduled but not yet run.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run every flush scheduled so far.
    pub async fn run_pending(&self) {
        let flushes = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };
        for flush in flushes {
            flush.await;
        }
    }
}

impl FrameScheduler for ManualScheduler {
    fn schedule(&self, flush: FlushFuture) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(flush);
    }
}

// =============================================================================
// Results
// =============================================================================

/// Pixels returned for one tile or raster request.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelData {
    pub data: PixelBuffer,
    pub width: u64,
    pub height: u64,
}

impl PixelData {
    /// Width and height come from the returned chunk: `shape[1]` and `shape[0]`.
    fn from_chunk(chunk: ArrayChunk, adapter: DtypeAdapter) -> Self {
        let height = chunk.shape.first().copied().unwrap_or(0);
        let width = chunk.shape.get(1).copied().unwrap_or(0);
        Self {
            data: adapter.adapt(chunk.data),
            width,
            height,
        }
    }
}

/// Future resolving to the result of one queued request.
///
/// The request is already queued when this is created; awaiting it only
/// waits for the answer.
#[must_use = "the request is queued either way; drop the future to ignore its result"]
pub struct PendingPixels {
    rx: oneshot::Receiver<Result<PixelData, StoreError>>,
}

impl Future for PendingPixels {
    type Output = Result<PixelData, StoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(StoreError::Dropped)))
    }
}

// =============================================================================
// Batcher
// =============================================================================

struct PendingRequest {
    selection: Vec<DimSelection>,
    signal: Option<AbortSignal>,
    responder: oneshot::Sender<Result<PixelData, StoreError>>,
}

#[derive(Default)]
struct Queue {
    pending: Vec<PendingRequest>,
    armed: bool,
}

/// Counters describing batching behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    /// Requests enqueued
    pub requests: usize,
    /// Flushes armed
    pub flushes_scheduled: usize,
    /// Flushes executed
    pub flushes_run: usize,
}

/// Request queue for one array.
pub struct RequestBatcher {
    store: SharedStore,
    array: Arc<ArrayHandle>,
    adapter: DtypeAdapter,
    scheduler: Arc<dyn FrameScheduler>,
    queue: Mutex<Queue>,
    requests: AtomicUsize,
    flushes_scheduled: AtomicUsize,
    flushes_run: AtomicUsize,
}

impl RequestBatcher {
    pub fn new(
        store: SharedStore,
        array: Arc<ArrayHandle>,
        adapter: DtypeAdapter,
        scheduler: Arc<dyn FrameScheduler>,
    ) -> Self {
        Self {
            store,
            array,
            adapter,
            scheduler,
            queue: Mutex::new(Queue::default()),
            requests: AtomicUsize::new(0),
            flushes_scheduled: AtomicUsize::new(0),
            flushes_run: AtomicUsize::new(0),
        }
    }

    /// Queue a read and arm a flush if none is armed.
    pub fn enqueue(
        self: &Arc<Self>,
        selection: Vec<DimSelection>,
        signal: Option<AbortSignal>,
    ) -> PendingPixels {
        let (responder, rx) = oneshot::channel();

        let arm = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.pending.push(PendingRequest {
                selection,
                signal,
                responder,
            });
            !std::mem::replace(&mut queue.armed, true)
        };
        self.requests.fetch_add(1, Ordering::Relaxed);

        if arm {
            self.flushes_scheduled.fetch_add(1, Ordering::Relaxed);
            let batcher = Arc::clone(self);
            self.scheduler
                .schedule(Box::pin(async move { batcher.flush() }));
        }

        PendingPixels { rx }
    }

    /// Drain the queue and issue one independent read per request.
    fn flush(&self) {
        let batch = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.armed = false;
            std::mem::take(&mut queue.pending)
        };
        self.flushes_run.fetch_add(1, Ordering::Relaxed);

        debug!(
            store = %self.store.identifier(),
            path = %self.array.path,
            requests = batch.len(),
            "Flushing request batch"
        );

        for request in batch {
            let store = Arc::clone(&self.store);
            let array = Arc::clone(&self.array);
            let adapter = self.adapter;

            tokio::spawn(async move {
                let result = store
                    .read(&array, &request.selection, request.signal.as_ref())
                    .await
                    .map(|chunk| PixelData::from_chunk(chunk, adapter));

                if let Err(ref e) = result {
                    trace!(path = %array.path, error = %e, "Read failed");
                }
                // The caller may have stopped waiting.
                let _ = request.responder.send(result);
            });
        }
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            requests: self.requests.load(Ordering::Relaxed),
            flushes_scheduled: self.flushes_scheduled.load(Ordering::Relaxed),
            flushes_run: self.flushes_run.load(Ordering::Relaxed),
        }
    }
}
