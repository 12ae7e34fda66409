//! Channel configuration and layer defaults.
//!
//! Turns loaded pixel sources plus an [`ImageConfig`] into the records a
//! rendering layer consumes:
//!
//! ```text
//!   Vec<PixelSource> + ImageConfig
//!            │
//!            ▼
//!   load_single_channel / load_multi_channel
//!            │  (validates lengths, fills colors, visibilities,
//!            │   names and sampled contrast limits)
//!            ▼
//!        SourceData ──► init_layer_state ──► LayerState
//! ```
//!
//! [`ImageConfig`]: crate::dataset::ImageConfig

mod layer;
mod resolve;

use serde::Serialize;
use tracing::warn;

use crate::dataset::ModelMatrixInput;
use crate::ome::LabelColor;
use crate::pixel::PixelSource;

pub use layer::{
    init_layer_state, LabelLayerState, LayerKind, LayerProps, LayerState, SelectionTransform,
    DEFAULT_LABEL_OPACITY,
};
pub use resolve::{
    calc_contrast_limits, calc_data_range, default_colors, default_visibilities, hex_to_rgb,
    load_multi_channel, load_single_channel,
};

/// Maximum number of channels shown initially.
pub const MAX_CHANNELS: usize = 6;

pub const CYAN: &str = "#00FFFF";
pub const YELLOW: &str = "#FFFF00";
pub const MAGENTA: &str = "#FF00FF";
pub const RED: &str = "#FF0000";
pub const GREEN: &str = "#00FF00";
pub const BLUE: &str = "#0000FF";
pub const WHITE: &str = "#FFFFFF";

/// Palette cycled for visible channels.
pub const CYMRGB: [&str; 6] = [CYAN, YELLOW, MAGENTA, RED, GREEN, BLUE];

// =============================================================================
// Model Matrix
// =============================================================================

/// A 4x4 affine transform stored as 16 values in the order supplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelMatrix(pub [f64; 16]);

impl ModelMatrix {
    pub const IDENTITY: ModelMatrix = ModelMatrix([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Parse a configured matrix. Missing input is the identity; invalid
    /// input logs a warning and falls back to the identity.
    pub fn parse(input: Option<&ModelMatrixInput>) -> Self {
        let values: Result<Vec<f64>, String> = match input {
            None => return Self::IDENTITY,
            Some(ModelMatrixInput::Values(values)) => Ok(values.clone()),
            Some(ModelMatrixInput::Text(text)) => text
                .split(',')
                .map(|part| {
                    part.trim()
                        .parse::<f64>()
                        .map_err(|_| format!("'{}' is not a number", part.trim()))
                })
                .collect(),
        };

        match values.and_then(|v| {
            <[f64; 16]>::try_from(v.as_slice())
                .map_err(|_| format!("expected 16 values, got {}", v.len()))
        }) {
            Ok(matrix) => ModelMatrix(matrix),
            Err(reason) => {
                warn!(reason = %reason, "Invalid model_matrix, using identity");
                Self::IDENTITY
            }
        }
    }
}

impl Default for ModelMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// =============================================================================
// Source Data
// =============================================================================

/// Per-layer defaults applied when the layer is first shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerDefaults {
    /// Index per axis; the channel axis is overwritten per channel
    pub selection: Vec<u64>,
    pub colormap: String,
    pub opacity: f64,
}

/// A label image overlaid on its parent.
#[derive(Debug, Clone)]
pub struct LabelSource {
    pub name: String,
    pub loader: Vec<PixelSource>,
    pub colors: Vec<LabelColor>,
    pub model_matrix: ModelMatrix,
}

/// One cell of a plate or well grid.
#[derive(Debug, Clone)]
pub struct GridLoader {
    pub name: String,
    pub row: usize,
    pub col: usize,
    pub loader: PixelSource,
}

/// Grid of images for plates and wells.
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub loaders: Vec<GridLoader>,
    pub rows: usize,
    pub columns: usize,
}

/// Everything the rendering layer needs to show one image.
///
/// Per-channel vectors (`colors`, `names`, `contrast_limits`,
/// `visibilities`) all have one entry per channel.
#[derive(Debug, Clone)]
pub struct SourceData {
    /// Pyramid levels, full resolution first
    pub loader: Vec<PixelSource>,
    pub name: Option<String>,
    pub channel_axis: Option<usize>,
    /// Hex colors
    pub colors: Vec<String>,
    pub names: Vec<String>,
    /// `None` for hidden channels whose range was not sampled
    pub contrast_limits: Vec<Option<[f64; 2]>>,
    pub visibilities: Vec<bool>,
    pub model_matrix: ModelMatrix,
    pub defaults: LayerDefaults,
    pub axis_labels: Vec<String>,
    pub labels: Vec<LabelSource>,
    pub grid: Option<GridLayout>,
}

impl SourceData {
    /// Number of logical channels.
    pub fn channel_count(&self) -> usize {
        self.visibilities.len()
    }
}
