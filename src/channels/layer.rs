use serde::Serialize;
use tracing::warn;

use crate::error::LoadError;
use crate::ome::LabelColor;

use super::resolve::hex_to_rgb;
use super::{ModelMatrix, SourceData, MAX_CHANNELS};

/// Opacity of label overlays when first shown.
pub const DEFAULT_LABEL_OPACITY: f64 = 0.5;

const FALLBACK_CONTRAST_LIMITS: [f64; 2] = [0.0, 255.0];

/// What kind of layer renders a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Single-level image
    Image,
    /// Pyramid with optional label overlays
    Multiscale,
    /// Plate or well grid
    Grid,
}

/// Per-channel rendering properties for the visible channels only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerProps {
    pub id: String,
    pub selections: Vec<Vec<u64>>,
    pub colors: Vec<[u8; 3]>,
    pub contrast_limits: Vec<[f64; 2]>,
    pub contrast_limits_range: Vec<[f64; 2]>,
    pub channels_visible: Vec<bool>,
    pub opacity: f64,
    pub colormap: String,
    pub model_matrix: ModelMatrix,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
}

/// Initial state of a label overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelLayerState {
    pub id: String,
    pub name: String,
    pub on: bool,
    pub opacity: f64,
    pub colors: Vec<LabelColor>,
    pub model_matrix: ModelMatrix,

    #[serde(skip)]
    pub transform: SelectionTransform,
}

/// Initial state of an image layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerState {
    pub kind: LayerKind,
    pub on: bool,
    pub layer_props: LayerProps,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelLayerState>,
}

// =============================================================================
// Selection Transform
// =============================================================================

/// Maps a selection on the parent image to one on a label image.
///
/// Label axes of extent 1 always select 0; other axes copy the parent's
/// index for the axis with the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTransform {
    /// Parent axis index per label axis, `None` for singleton axes
    mapping: Vec<Option<usize>>,
}

impl SelectionTransform {
    pub fn new(
        label_labels: &[String],
        label_shape: &[u64],
        source_labels: &[String],
        source_shape: &[u64],
    ) -> Result<Self, LoadError> {
        if label_labels.len() != label_shape.len() {
            return Err(LoadError::Schema(format!(
                "label axes {:?} do not match label rank {}",
                label_labels,
                label_shape.len()
            )));
        }
        if source_labels.len() != source_shape.len() {
            return Err(LoadError::Schema(format!(
                "image axes {:?} do not match image rank {}",
                source_labels,
                source_shape.len()
            )));
        }

        let mapping = label_labels
            .iter()
            .zip(label_shape)
            .map(|(name, extent)| {
                let position = source_labels.iter().position(|s| s == name);
                match (position, *extent) {
                    (Some(index), extent) if extent != 1 => Ok(Some(index)),
                    (Some(_), _) => Ok(None),
                    (None, _) => Err(LoadError::Schema(format!(
                        "label axis '{}' is not an axis of the image {:?}",
                        name, source_labels
                    ))),
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { mapping })
    }

    /// Translate a parent selection. Missing parent indices read as 0.
    pub fn apply(&self, source_selection: &[u64]) -> Vec<u64> {
        self.mapping
            .iter()
            .map(|slot| {
                slot.and_then(|i| source_selection.get(i).copied())
                    .unwrap_or(0)
            })
            .collect()
    }
}

// =============================================================================
// Layer State
// =============================================================================

/// Build the initial layer state for loaded source data.
pub fn init_layer_state(id: &str, source: &SourceData) -> Result<LayerState, LoadError> {
    let visible: Vec<usize> = source
        .visibilities
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(i, _)| i)
        .take(MAX_CHANNELS)
        .collect();

    let mut props = LayerProps {
        id: id.to_string(),
        selections: Vec::with_capacity(visible.len()),
        colors: Vec::with_capacity(visible.len()),
        contrast_limits: Vec::with_capacity(visible.len()),
        contrast_limits_range: Vec::with_capacity(visible.len()),
        channels_visible: vec![true; visible.len()],
        opacity: source.defaults.opacity,
        colormap: source.defaults.colormap.clone(),
        model_matrix: source.model_matrix,
        rows: None,
        columns: None,
    };

    for index in visible {
        let mut selection = source.defaults.selection.clone();
        if let Some(slot) = source.channel_axis.and_then(|axis| selection.get_mut(axis)) {
            *slot = index as u64;
        }
        props.selections.push(selection);

        let color = source.colors.get(index).map(String::as_str).unwrap_or_default();
        props.colors.push(hex_to_rgb(color).unwrap_or_else(|| {
            warn!(channel = index, color = %color, "Invalid channel color, using white");
            [255, 255, 255]
        }));

        let limits = source
            .contrast_limits
            .get(index)
            .copied()
            .flatten()
            .unwrap_or(FALLBACK_CONTRAST_LIMITS);
        props.contrast_limits.push(limits);
        props.contrast_limits_range.push(limits);
    }

    if let Some(grid) = &source.grid {
        props.rows = Some(grid.rows);
        props.columns = Some(grid.columns);
        return Ok(LayerState {
            kind: LayerKind::Grid,
            on: true,
            layer_props: props,
            labels: Vec::new(),
        });
    }

    if source.loader.len() == 1 {
        return Ok(LayerState {
            kind: LayerKind::Image,
            on: true,
            layer_props: props,
            labels: Vec::new(),
        });
    }

    let base = source
        .loader
        .first()
        .ok_or_else(|| LoadError::Schema("image has no pyramid levels".to_string()))?;
    let labels = source
        .labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let label_base = label.loader.first().ok_or_else(|| {
                LoadError::Schema(format!("label '{}' has no pyramid levels", label.name))
            })?;
            let transform = SelectionTransform::new(
                label_base.labels(),
                label_base.shape(),
                base.labels(),
                base.shape(),
            )?;
            Ok(LabelLayerState {
                id: format!("{}_{}", id, i),
                name: label.name.clone(),
                on: false,
                opacity: DEFAULT_LABEL_OPACITY,
                colors: label.colors.clone(),
                model_matrix: label.model_matrix,
                transform,
            })
        })
        .collect::<Result<_, LoadError>>()?;

    Ok(LayerState {
        kind: LayerKind::Multiscale,
        on: true,
        layer_props: props,
        labels,
    })
}
