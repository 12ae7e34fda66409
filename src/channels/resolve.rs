use tracing::debug;

use crate::dataset::{ContrastLimitsConfig, ImageConfig};
use crate::error::{LoadError, StoreError};
use crate::pixel::{BaseSelection, PixelData, PixelDtype, PixelSource};

use super::{LayerDefaults, ModelMatrix, SourceData, CYMRGB, GREEN, MAGENTA, MAX_CHANNELS, WHITE};

// =============================================================================
// Defaults
// =============================================================================

/// The first [`MAX_CHANNELS`] channels are visible.
pub fn default_visibilities(n: usize) -> Vec<bool> {
    (0..n).map(|i| i < MAX_CHANNELS).collect()
}

/// Default hex colors for `n` channels.
///
/// Up to six channels use a fixed palette; beyond that every channel is
/// white except visible ones, which cycle through the palette in order.
pub fn default_colors(n: usize, visibilities: &[bool]) -> Vec<String> {
    let palette: Vec<&str> = match n {
        1 => vec![WHITE],
        2 => vec![MAGENTA, GREEN],
        3 => CYMRGB[3..6].to_vec(),
        n if n <= CYMRGB.len() => CYMRGB[..n].to_vec(),
        n => {
            let mut colors = vec![WHITE; n];
            let visible = visibilities
                .iter()
                .enumerate()
                .filter(|(_, visible)| **visible)
                .map(|(i, _)| i);
            for (slot, index) in visible.enumerate() {
                if let Some(color) = colors.get_mut(index) {
                    *color = CYMRGB[slot % CYMRGB.len()];
                }
            }
            colors
        }
    };
    palette.into_iter().map(str::to_string).collect()
}

/// Parse `#RRGGBB` (the `#` is optional).
pub fn hex_to_rgb(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

// =============================================================================
// Data Range
// =============================================================================

fn range_of(pixels: &PixelData) -> [f64; 2] {
    match pixels.data.min_max() {
        Some((lo, hi)) if lo < hi => [lo, hi],
        _ => [0.0, 1.0],
    }
}

/// Estimate display limits by reading one raster.
///
/// `Uint8` data is assumed to span `[0, 255]` and is not read. Empty or
/// constant rasters yield `[0, 1]`.
pub async fn calc_data_range(source: &PixelSource, selection: &[u64]) -> Result<[f64; 2], StoreError> {
    if source.dtype() == PixelDtype::Uint8 {
        return Ok([0.0, 255.0]);
    }
    let raster = source
        .get_raster(&BaseSelection::Positional(selection.to_vec()), None)
        .await?;
    Ok(range_of(&raster))
}

/// Sample the data range of every visible channel. Hidden channels get `None`.
///
/// All rasters are queued before any is awaited so they share one batch.
pub async fn calc_contrast_limits(
    source: &PixelSource,
    channel_axis: usize,
    visibilities: &[bool],
    base_selection: &[u64],
) -> Result<Vec<Option<[f64; 2]>>, StoreError> {
    if source.dtype() == PixelDtype::Uint8 {
        return Ok(visibilities
            .iter()
            .map(|visible| visible.then_some([0.0, 255.0]))
            .collect());
    }

    let pending: Vec<_> = visibilities
        .iter()
        .enumerate()
        .map(|(index, visible)| {
            visible.then(|| {
                let mut selection = base_selection.to_vec();
                if let Some(slot) = selection.get_mut(channel_axis) {
                    *slot = index as u64;
                }
                source.get_raster(&BaseSelection::Positional(selection), None)
            })
        })
        .collect();

    let mut limits = Vec::with_capacity(pending.len());
    for request in pending {
        limits.push(match request {
            Some(request) => Some(range_of(&request.await?)),
            None => None,
        });
    }

    debug!(path = %source.path(), channels = limits.len(), "Sampled contrast limits");
    Ok(limits)
}

// =============================================================================
// Loaders
// =============================================================================

fn defaults(config: &ImageConfig, rank: usize) -> LayerDefaults {
    LayerDefaults {
        selection: vec![0; rank],
        colormap: config.colormap.clone().unwrap_or_default(),
        opacity: config.opacity.unwrap_or(1.0),
    }
}

fn check_channel_len(property: &str, len: Option<usize>, n: usize) -> Result<(), LoadError> {
    match len {
        Some(len) if len != n => Err(LoadError::Configuration(format!(
            "channel_axis is length {} and provided channel_axis property {} is different size.",
            n, property
        ))),
        _ => Ok(()),
    }
}

/// Build source data for an image with one logical channel.
pub async fn load_single_channel(
    config: &ImageConfig,
    loader: Vec<PixelSource>,
) -> Result<SourceData, LoadError> {
    let (base, lowres) = match (loader.first(), loader.last()) {
        (Some(base), Some(lowres)) => (base, lowres),
        _ => return Err(LoadError::Schema("image has no pyramid levels".to_string())),
    };
    let defaults = defaults(config, base.shape().len());

    let limits = match &config.contrast_limits {
        Some(ContrastLimitsConfig::Single(limits)) => *limits,
        Some(ContrastLimitsConfig::PerChannel(limits)) if limits.len() == 1 => limits[0],
        Some(ContrastLimitsConfig::PerChannel(limits)) => {
            return Err(LoadError::Configuration(format!(
                "contrast_limits has {} entries but the image has a single channel",
                limits.len()
            )))
        }
        None => calc_data_range(lowres, &defaults.selection).await?,
    };

    Ok(SourceData {
        name: config.name.clone(),
        channel_axis: None,
        colors: vec![config.color.clone().unwrap_or_else(|| WHITE.to_string())],
        names: vec!["channel_0".to_string()],
        contrast_limits: vec![Some(limits)],
        visibilities: vec![config.visibility.unwrap_or(true)],
        model_matrix: ModelMatrix::parse(config.model_matrix.as_ref()),
        defaults,
        axis_labels: base.labels().to_vec(),
        labels: Vec::new(),
        grid: None,
        loader,
    })
}

/// Build source data for an image whose `channel_axis` enumerates channels.
///
/// Every per-channel property supplied in `config` must have one entry per
/// channel.
pub async fn load_multi_channel(
    config: &ImageConfig,
    loader: Vec<PixelSource>,
    channel_axis: usize,
) -> Result<SourceData, LoadError> {
    let (base, lowres) = match (loader.first(), loader.last()) {
        (Some(base), Some(lowres)) => (base, lowres),
        _ => return Err(LoadError::Schema("image has no pyramid levels".to_string())),
    };
    let n = *base.shape().get(channel_axis).ok_or_else(|| {
        LoadError::Configuration(format!(
            "cannot determine how to display array: channel_axis {} is out of range",
            channel_axis
        ))
    })? as usize;

    let contrast_len = config.contrast_limits.as_ref().map(|c| match c {
        ContrastLimitsConfig::Single(_) => 1,
        ContrastLimitsConfig::PerChannel(v) => v.len(),
    });
    check_channel_len("contrast_limits", contrast_len, n)?;
    check_channel_len("visibilities", config.visibilities.as_ref().map(Vec::len), n)?;
    check_channel_len("names", config.names.as_ref().map(Vec::len), n)?;
    check_channel_len("colors", config.colors.as_ref().map(Vec::len), n)?;

    let defaults = defaults(config, base.shape().len());
    let visibilities = config
        .visibilities
        .clone()
        .unwrap_or_else(|| default_visibilities(n));
    let colors = config
        .colors
        .clone()
        .unwrap_or_else(|| default_colors(n, &visibilities));
    let names = config
        .names
        .clone()
        .unwrap_or_else(|| (0..n).map(|i| format!("channel_{}", i)).collect());

    let contrast_limits = match &config.contrast_limits {
        Some(ContrastLimitsConfig::Single(limits)) => vec![Some(*limits)],
        Some(ContrastLimitsConfig::PerChannel(limits)) => limits.iter().copied().map(Some).collect(),
        None => calc_contrast_limits(lowres, channel_axis, &visibilities, &defaults.selection).await?,
    };

    Ok(SourceData {
        name: config.name.clone(),
        channel_axis: Some(channel_axis),
        colors,
        names,
        contrast_limits,
        visibilities,
        model_matrix: ModelMatrix::parse(config.model_matrix.as_ref()),
        defaults,
        axis_labels: base.labels().to_vec(),
        labels: Vec::new(),
        grid: None,
        loader,
    })
}
