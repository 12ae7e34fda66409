//! Pyramid levels, axis labels and tile size.

use std::sync::Arc;

use tracing::debug;

use crate::error::LoadError;
use crate::ome::{Axis, Multiscale, DEFAULT_AXIS_NAMES};
use crate::pixel::{FrameScheduler, PixelSource, PixelSourceOptions, RGBA_CHANNEL_AXIS};
use crate::store::{join_path, ArrayHandle, ChunkStore, GroupNode, SharedStore, StoreNode};

use super::ImageConfig;

/// Tile size used when an array has no usable chunk extents.
pub const DEFAULT_TILE_SIZE: u64 = 256;

const CHANNEL_AXIS: &str = "c";

// =============================================================================
// Levels
// =============================================================================

/// Open every dataset of the first multiscale under `group`, in declared
/// order (full resolution first).
///
/// Returns the level arrays and the declared axes, if any.
pub async fn load_levels(
    store: &dyn ChunkStore,
    group: &GroupNode,
    multiscales: &[Multiscale],
) -> Result<(Vec<ArrayHandle>, Option<Vec<Axis>>), LoadError> {
    let multiscale = multiscales
        .first()
        .ok_or_else(|| LoadError::Schema(format!("no multiscales declared at {}", group.path)))?;
    if multiscale.datasets.is_empty() {
        return Err(LoadError::Schema(format!(
            "multiscale at {} declares no datasets",
            group.path
        )));
    }

    let mut levels = Vec::with_capacity(multiscale.datasets.len());
    for dataset in &multiscale.datasets {
        let path = join_path(&group.path, &dataset.path);
        match store.open(&path).await? {
            StoreNode::Array(array) => levels.push(array),
            StoreNode::Group(_) => {
                return Err(LoadError::Schema(format!(
                    "dataset '{}' at {} is not an array",
                    dataset.path, path
                )))
            }
        }
    }

    debug!(path = %group.path, levels = levels.len(), "Loaded pyramid levels");
    Ok((levels, multiscale.declared_axes()))
}

// =============================================================================
// Axis Labels
// =============================================================================

/// Guesses axis names for arrays without axis metadata.
pub trait AxisLabelStrategy: Send + Sync {
    fn labels(&self, array: &ArrayHandle) -> Vec<String>;
}

/// Names axes from the tail of `t,c,z,y,x`.
///
/// Arrays whose last extent is 3 or 4 (rank 3 and up) are treated as
/// interleaved RGB(A) and end with `y,x,_c`. Axes beyond five are named
/// `dim_<i>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAxisLabels;

impl AxisLabelStrategy for DefaultAxisLabels {
    fn labels(&self, array: &ArrayHandle) -> Vec<String> {
        let rank = array.shape.len();
        let names: Vec<&str> = if is_interleaved(&array.shape) {
            vec!["t", "z", "y", "x", RGBA_CHANNEL_AXIS]
        } else {
            DEFAULT_AXIS_NAMES.to_vec()
        };

        let extra = rank.saturating_sub(names.len());
        let suffix = &names[names.len() - (rank - extra)..];
        (0..extra)
            .map(|i| format!("dim_{}", i))
            .chain(suffix.iter().map(|s| s.to_string()))
            .collect()
    }
}

fn is_interleaved(shape: &[u64]) -> bool {
    shape.len() >= 3 && matches!(shape.last(), Some(3) | Some(4))
}

/// Axis labels and channel axis for a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisResolution {
    pub labels: Vec<String>,
    pub channel_axis: Option<usize>,
}

/// Resolve axis labels and the channel axis.
///
/// Explicit configuration wins, then NGFF axes, then the guessing strategy.
pub fn resolve_axes_and_channel(
    config: &ImageConfig,
    ngff_axes: Option<&[Axis]>,
    first_level: &ArrayHandle,
    strategy: &dyn AxisLabelStrategy,
) -> Result<AxisResolution, LoadError> {
    let explicit = config.axis_labels.is_some() && config.channel_axis.is_some();

    let (labels, channel_axis) = match ngff_axes {
        Some(axes) if !explicit => {
            let labels = config
                .axis_labels
                .clone()
                .unwrap_or_else(|| axes.iter().map(|a| a.name.clone()).collect());
            let channel = config
                .channel_axis
                .or_else(|| axes.iter().position(Axis::is_channel));
            (labels, channel)
        }
        _ => {
            let labels = config
                .axis_labels
                .clone()
                .unwrap_or_else(|| strategy.labels(first_level));
            let channel = config
                .channel_axis
                .or_else(|| labels.iter().position(|l| l == CHANNEL_AXIS));
            (labels, channel)
        }
    };

    let rank = first_level.shape.len();
    if labels.len() != rank {
        return Err(LoadError::Schema(format!(
            "axis labels {:?} do not match rank {} of {}",
            labels, rank, first_level.path
        )));
    }
    if let Some(axis) = channel_axis {
        if axis >= rank {
            return Err(LoadError::Configuration(format!(
                "cannot determine how to display array: channel_axis {} for rank {}",
                axis, rank
            )));
        }
    }

    Ok(AxisResolution {
        labels,
        channel_axis,
    })
}

// =============================================================================
// Tile Size
// =============================================================================

/// Tile size from the spatial chunk extents, rounded down to a power of two.
pub fn guess_tile_size(array: &ArrayHandle) -> u64 {
    let end = if is_interleaved(&array.shape) {
        array.chunks.len().saturating_sub(1)
    } else {
        array.chunks.len()
    };
    let spatial = &array.chunks[end.saturating_sub(2)..end];
    match spatial.iter().copied().min() {
        Some(extent) if extent > 0 => 1 << (u64::BITS - 1 - extent.leading_zeros()),
        _ => DEFAULT_TILE_SIZE,
    }
}

// =============================================================================
// Pixel Sources
// =============================================================================

/// One pixel source per level, sharing labels, tile size and scheduler.
pub fn build_pixel_sources(
    store: &SharedStore,
    levels: Vec<ArrayHandle>,
    labels: &[String],
    multiscales: Option<Arc<Vec<Multiscale>>>,
    tile_size: u64,
    scheduler: &Arc<dyn FrameScheduler>,
) -> Result<Vec<PixelSource>, LoadError> {
    levels
        .into_iter()
        .map(|array| {
            let options = PixelSourceOptions::new(labels.to_vec(), tile_size)
                .with_multiscales(multiscales.clone())
                .with_scheduler(Arc::clone(scheduler));
            PixelSource::new(Arc::clone(store), array, options)
        })
        .collect()
}
