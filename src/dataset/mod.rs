//! Dataset loading: from a store path to [`SourceData`].
//!
//! ```text
//!   store.open(path)
//!         │
//!         ▼
//!    classify ──► Plate ───► plate grid  ─┐
//!         │  ──► Well  ───► well grid   ─┤
//!         │  ──► Ome   ───► omero channels + labels
//!         │  ──► Multiscales ─┐          │
//!         │  ──► Array ───────┤          │
//!         │                   ▼          │
//!         │      load_levels, resolve_axes_and_channel,
//!         │      guess_tile_size, build_pixel_sources
//!         │                   │          │
//!         │                   ▼          ▼
//!         └────────────── single / multi channel ──► SourceData
//! ```

mod classify;
mod config;
mod levels;
mod ngff;

use std::sync::Arc;

use tracing::info;

use crate::channels::{load_multi_channel, load_single_channel, SourceData};
use crate::error::LoadError;
use crate::ome::{Axis, Multiscale};
use crate::pixel::{FrameScheduler, NextTick, PixelSource};
use crate::store::{ArrayHandle, SharedStore};

pub use classify::{classify, DatasetKind, OME_VALIDATOR_URL};
pub use config::{ContrastLimitsConfig, ImageConfig, ModelMatrixInput};
pub use levels::{
    build_pixel_sources, guess_tile_size, load_levels, resolve_axes_and_channel,
    AxisLabelStrategy, AxisResolution, DefaultAxisLabels, DEFAULT_TILE_SIZE,
};

/// Opens datasets from one store.
///
/// Every pixel source created by a loader flushes through the loader's
/// scheduler.
#[derive(Clone)]
pub struct DatasetLoader {
    store: SharedStore,
    scheduler: Arc<dyn FrameScheduler>,
    axis_strategy: Arc<dyn AxisLabelStrategy>,
}

impl DatasetLoader {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            scheduler: Arc::new(NextTick),
            axis_strategy: Arc::new(DefaultAxisLabels),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn FrameScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_axis_strategy(mut self, strategy: Arc<dyn AxisLabelStrategy>) -> Self {
        self.axis_strategy = strategy;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Open and classify the node at `path`.
    pub async fn classify(&self, path: &str, source: &str) -> Result<DatasetKind, LoadError> {
        let node = self.store.open(path).await?;
        classify(self.store.as_ref(), node, source).await
    }

    /// Load the dataset at `path`.
    pub async fn load(&self, path: &str, config: &ImageConfig) -> Result<SourceData, LoadError> {
        let kind = self.classify(path, &config.source).await?;
        info!(
            store = %self.store.identifier(),
            path = %path,
            kind = kind.name(),
            "Loading dataset"
        );
        self.load_kind(kind, config).await
    }

    /// Load an already classified dataset.
    pub async fn load_kind(
        &self,
        kind: DatasetKind,
        config: &ImageConfig,
    ) -> Result<SourceData, LoadError> {
        match kind {
            DatasetKind::Plate { group, plate } => self.load_plate(config, &group, &plate).await,
            DatasetKind::Well { group, well } => self.load_well(config, &group, &well).await,
            DatasetKind::Ome {
                group,
                multiscales,
                omero,
            } => self.load_ome(config, &group, multiscales, &omero).await,
            DatasetKind::Multiscales { group, multiscales } => {
                let (levels, axes) = load_levels(self.store.as_ref(), &group, &multiscales).await?;
                self.load_image(config, levels, axes, Some(multiscales)).await
            }
            DatasetKind::Array(array) => self.load_image(config, vec![array], None, None).await,
        }
    }

    async fn load_image(
        &self,
        config: &ImageConfig,
        levels: Vec<ArrayHandle>,
        axes: Option<Vec<Axis>>,
        multiscales: Option<Vec<Multiscale>>,
    ) -> Result<SourceData, LoadError> {
        let first = levels
            .first()
            .ok_or_else(|| LoadError::Schema("image has no pyramid levels".to_string()))?;
        let resolution =
            resolve_axes_and_channel(config, axes.as_deref(), first, self.axis_strategy.as_ref())?;
        let tile_size = guess_tile_size(first);

        let loader = build_pixel_sources(
            &self.store,
            levels,
            &resolution.labels,
            multiscales.map(Arc::new),
            tile_size,
            &self.scheduler,
        )?;
        channel_source(config, loader, resolution.channel_axis).await
    }
}

/// Multi-channel when a channel axis is known, single-channel otherwise.
async fn channel_source(
    config: &ImageConfig,
    loader: Vec<PixelSource>,
    channel_axis: Option<usize>,
) -> Result<SourceData, LoadError> {
    match channel_axis {
        Some(axis) => load_multi_channel(config, loader, axis).await,
        None => load_single_channel(config, loader).await,
    }
}
