use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{LoadError, StoreError};
use crate::ome::{resolve_pixel_sizes, Multiscale, PixelSize};
use crate::store::{AbortSignal, ArrayHandle, SharedStore, Slice};

use super::batch::{BatchStats, FrameScheduler, NextTick, PendingPixels, RequestBatcher};
use super::dtype::{DtypeAdapter, PixelDtype};
use super::selection::{build_selection, BaseSelection, X_AXIS, Y_AXIS};

/// Construction options for a [`PixelSource`].
#[derive(Clone)]
pub struct PixelSourceOptions {
    /// Axis names, one per array dimension
    pub labels: Vec<String>,

    /// Edge length of a square tile in pixels
    pub tile_size: u64,

    /// Pyramid metadata, used for calibration
    pub multiscales: Option<Arc<Vec<Multiscale>>>,

    /// When batched reads are flushed
    pub scheduler: Arc<dyn FrameScheduler>,
}

impl PixelSourceOptions {
    pub fn new(labels: Vec<String>, tile_size: u64) -> Self {
        Self {
            labels,
            tile_size,
            multiscales: None,
            scheduler: Arc::new(NextTick),
        }
    }

    pub fn with_multiscales(mut self, multiscales: Option<Arc<Vec<Multiscale>>>) -> Self {
        self.multiscales = multiscales;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn FrameScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }
}

/// Tile and raster access to one pyramid level.
///
/// Clones share the same request queue.
#[derive(Clone)]
pub struct PixelSource {
    array: Arc<ArrayHandle>,
    labels: Arc<Vec<String>>,
    tile_size: u64,
    multiscales: Option<Arc<Vec<Multiscale>>>,
    dataset_index: Option<usize>,
    adapter: DtypeAdapter,
    batcher: Arc<RequestBatcher>,
}

impl PixelSource {
    /// Wrap an opened array.
    ///
    /// Fails with `Schema` if the labels do not match the array rank and with
    /// `UnsupportedType` for non-numeric arrays.
    pub fn new(
        store: SharedStore,
        array: ArrayHandle,
        options: PixelSourceOptions,
    ) -> Result<Self, LoadError> {
        if options.labels.len() != array.shape.len() {
            return Err(LoadError::Schema(format!(
                "axis labels {:?} do not match rank {} of array {}",
                options.labels,
                array.shape.len(),
                array.path
            )));
        }
        if options.tile_size == 0 {
            return Err(LoadError::Configuration(
                "tile size must be greater than zero".to_string(),
            ));
        }

        let adapter = DtypeAdapter::for_dtype(&array.dtype)?;

        let dataset_index = options.multiscales.as_ref().and_then(|ms| {
            let index = ms
                .first()?
                .datasets
                .iter()
                .position(|d| d.matches_path(&array.path));
            if index.is_none() {
                warn!(path = %array.path, "No multiscale dataset matches array path");
            }
            index
        });

        let array = Arc::new(array);
        let batcher = Arc::new(RequestBatcher::new(
            store,
            Arc::clone(&array),
            adapter,
            options.scheduler,
        ));

        Ok(Self {
            array,
            labels: Arc::new(options.labels),
            tile_size: options.tile_size,
            multiscales: options.multiscales,
            dataset_index,
            adapter,
            batcher,
        })
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    pub fn array(&self) -> &ArrayHandle {
        &self.array
    }

    pub fn path(&self) -> &str {
        &self.array.path
    }

    pub fn shape(&self) -> &[u64] {
        &self.array.shape
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn tile_size(&self) -> u64 {
        self.tile_size
    }

    /// Renderer dtype of returned buffers.
    pub fn dtype(&self) -> PixelDtype {
        self.adapter.target()
    }

    pub fn multiscales(&self) -> Option<&[Multiscale]> {
        self.multiscales.as_deref().map(Vec::as_slice)
    }

    fn extent_at(&self, index: Option<usize>) -> u64 {
        index
            .and_then(|i| self.array.shape.get(i))
            .copied()
            .unwrap_or(1)
    }

    /// Index of the last non-channel axis, for arrays without `x`/`y` labels.
    fn trailing_spatial(&self, offset: usize) -> Option<usize> {
        let last = self.array.shape.len().checked_sub(1)?;
        let channel_last = self.labels.iter().position(|l| l == "c") == Some(last);
        let skip = offset + usize::from(channel_last);
        last.checked_sub(skip)
    }

    /// Extent of the `x` axis.
    pub fn width(&self) -> u64 {
        let index = self
            .labels
            .iter()
            .position(|l| l == X_AXIS)
            .or_else(|| self.trailing_spatial(0));
        self.extent_at(index)
    }

    /// Extent of the `y` axis.
    pub fn height(&self) -> u64 {
        let index = self
            .labels
            .iter()
            .position(|l| l == Y_AXIS)
            .or_else(|| self.trailing_spatial(1));
        self.extent_at(index)
    }

    /// Number of tiles along x and y.
    pub fn tile_count(&self) -> (u64, u64) {
        (
            self.width().div_ceil(self.tile_size),
            self.height().div_ceil(self.tile_size),
        )
    }

    /// Physical pixel size of this level in nanometers.
    pub fn pixel_size(&self) -> Option<PixelSize> {
        let multiscales = self.multiscales.as_ref()?;
        resolve_pixel_sizes(multiscales, self.dataset_index?)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read tile `(x, y)`.
    ///
    /// The last tile in a row or column is clipped to the level extent. The
    /// request is queued immediately; the returned future yields its pixels.
    pub fn get_tile(
        &self,
        x: u64,
        y: u64,
        selection: &BaseSelection,
        signal: Option<AbortSignal>,
    ) -> PendingPixels {
        let x_range = tile_span(x, self.tile_size, self.width());
        let y_range = tile_span(y, self.tile_size, self.height());
        let selection = build_selection(selection, &self.labels, x_range, y_range);
        self.batcher.enqueue(selection, signal)
    }

    /// Read the full spatial extent of this level.
    pub fn get_raster(&self, selection: &BaseSelection, signal: Option<AbortSignal>) -> PendingPixels {
        let selection = build_selection(selection, &self.labels, Slice::all(), Slice::all());
        self.batcher.enqueue(selection, signal)
    }

    /// Hook for failed tile reads. Failures are left to the caller to render.
    pub fn on_tile_error(&self, err: &StoreError) {
        debug!(path = %self.array.path, error = %err, "Tile read failed");
    }

    pub fn batch_stats(&self) -> BatchStats {
        self.batcher.stats()
    }
}

/// Pixel range of tile `index` along an axis, clamped to `extent`.
fn tile_span(index: u64, tile_size: u64, extent: u64) -> Slice {
    let start = index.saturating_mul(tile_size).min(extent);
    let stop = start.saturating_add(tile_size).min(extent);
    Slice::new(start, stop)
}

impl std::fmt::Debug for PixelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSource")
            .field("path", &self.array.path)
            .field("shape", &self.array.shape)
            .field("labels", &self.labels)
            .field("tile_size", &self.tile_size)
            .field("dtype", &self.dtype())
            .finish()
    }
}
