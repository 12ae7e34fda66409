//! Physical calibration from multiscale scale transforms.
//!
//! All sizes are normalized to nanometers per pixel. `None` means the
//! metadata does not support calibration; it is never an error.

use serde::Serialize;

use super::{Axis, Multiscale};

/// Default target width of a scale bar in screen pixels.
pub const DEFAULT_SCALE_BAR_WIDTH: f64 = 150.0;

/// Nanometers per pixel along x and y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
}

/// Convert a value in `unit` to nanometers.
///
/// Only angstrom and micrometer/micron are converted; every other unit,
/// including `"pixels"`, passes through unchanged.
pub fn convert_to_nanometers(value: f64, unit: &str) -> f64 {
    match unit.to_lowercase().as_str() {
        "angstrom" => value / 10.0,
        "micrometer" | "micron" => value * 1000.0,
        _ => value,
    }
}

struct LevelCalibration<'a> {
    axes: Vec<Axis>,
    scale: &'a [f64],
    unit: String,
}

impl LevelCalibration<'_> {
    fn axis_value(&self, name: &str) -> Option<f64> {
        let index = self
            .axes
            .iter()
            .position(|axis| axis.name.eq_ignore_ascii_case(name))?;
        self.scale
            .get(index)
            .map(|v| convert_to_nanometers(*v, &self.unit))
    }
}

fn level_calibration(multiscales: &[Multiscale], level: usize) -> Option<LevelCalibration<'_>> {
    let multiscale = multiscales.first()?;
    let scale = multiscale.datasets.get(level)?.scale()?;
    let axes = multiscale.axes_or_default();
    let unit = axes
        .iter()
        .find(|axis| axis.is_space() && axis.unit.is_some())
        .and_then(|axis| axis.unit.clone())
        .unwrap_or_else(|| "pixels".to_string());

    Some(LevelCalibration { axes, scale, unit })
}

/// Nanometers per pixel along x at `level`.
pub fn resolve_pixel_size(multiscales: &[Multiscale], level: usize) -> Option<f64> {
    level_calibration(multiscales, level)?.axis_value("x")
}

/// Nanometers per pixel along x and y at `level`. Requires both axes.
pub fn resolve_pixel_sizes(multiscales: &[Multiscale], level: usize) -> Option<PixelSize> {
    let calibration = level_calibration(multiscales, level)?;
    Some(PixelSize {
        x: calibration.axis_value("x")?,
        y: calibration.axis_value("y")?,
    })
}

/// Size of one screen pixel at `zoom`, derived from level 0.
///
/// Assumes each pyramid level halves the resolution of the previous one.
pub fn resolve_current_pixel_size(multiscales: &[Multiscale], zoom: f64) -> Option<f64> {
    resolve_pixel_size(multiscales, 0).map(|size| size * 2f64.powf(-zoom))
}

// =============================================================================
// Scale Bar
// =============================================================================

/// A scale bar rounded to a "nice" physical length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleBar {
    /// Physical length in nanometers
    pub length_nm: f64,

    /// On-screen width in pixels
    pub width_px: f64,

    /// Display label, e.g. `"50 nm"` or `"2.0 µm"`
    pub label: String,
}

impl ScaleBar {
    /// Pick a 1/2/5 x 10^n length close to `target_px` screen pixels.
    ///
    /// Returns `None` for a non-positive or non-finite pixel size.
    pub fn for_pixel_size(nm_per_px: f64, target_px: f64) -> Option<Self> {
        if !nm_per_px.is_finite() || nm_per_px <= 0.0 || target_px <= 0.0 {
            return None;
        }

        let rough = target_px * nm_per_px;
        let magnitude = 10f64.powf(rough.log10().floor());
        let residual = rough / magnitude;

        let nice = if residual < 1.5 {
            magnitude
        } else if residual < 3.5 {
            2.0 * magnitude
        } else if residual < 7.5 {
            5.0 * magnitude
        } else {
            10.0 * magnitude
        };

        let label = if nice < 1.0 {
            format!("{:.1} nm", nice)
        } else if nice < 1000.0 {
            format!("{:.0} nm", nice)
        } else {
            format!("{:.1} µm", nice / 1000.0)
        };

        Some(Self {
            length_nm: nice,
            width_px: nice / nm_per_px,
            label,
        })
    }
}
