//! OME-NGFF metadata.
//!
//! Typed schemas for the attribute documents this crate understands, plus
//! the calibration logic that turns pyramid scale transforms into physical
//! pixel sizes.
//!
//! # Supported Documents
//!
//! | Key                       | Type            | Meaning                          |
//! |---------------------------|-----------------|----------------------------------|
//! | `multiscales`             | [`Multiscale`]  | Pyramid levels, axes, scales     |
//! | `omero`                   | [`Omero`]       | Channel rendering hints          |
//! | `plate`                   | [`Plate`]       | HCS plate layout                 |
//! | `well`                    | [`Well`]        | Fields of view in a well         |
//! | `image-label`             | [`ImageLabel`]  | Label image colors               |
//! | `bioformats2raw.layout`   | integer         | Legacy flat layout marker        |
//!
//! NGFF 0.5 wraps all of these in an `ome` object; [`resolve_attrs`] unwraps it.

mod calibration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use calibration::{
    convert_to_nanometers, resolve_current_pixel_size, resolve_pixel_size, resolve_pixel_sizes,
    PixelSize, ScaleBar, DEFAULT_SCALE_BAR_WIDTH,
};

/// Axis names assumed for NGFF <= 0.3 data that declares no `axes`.
pub const DEFAULT_AXIS_NAMES: [&str; 5] = ["t", "c", "z", "y", "x"];

/// Unwrap the NGFF 0.5 `ome` envelope if present.
pub fn resolve_attrs(attrs: &Map<String, Value>) -> Map<String, Value> {
    match attrs.get("ome") {
        Some(Value::Object(inner)) => inner.clone(),
        _ => attrs.clone(),
    }
}

// =============================================================================
// Axes
// =============================================================================

/// A normalized axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Axis {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            unit: None,
        }
    }

    pub fn is_space(&self) -> bool {
        self.kind.as_deref() == Some("space")
    }

    pub fn is_channel(&self) -> bool {
        self.kind.as_deref() == Some("channel")
    }
}

/// Axes may be declared as bare names (NGFF 0.3) or as records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisSpec {
    Name(String),
    Axis(Axis),
}

impl AxisSpec {
    pub fn normalize(&self) -> Axis {
        match self {
            AxisSpec::Name(name) => Axis::named(name.clone()),
            AxisSpec::Axis(axis) => axis.clone(),
        }
    }
}

// =============================================================================
// Multiscales
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Scale {
        #[serde(default)]
        scale: Vec<f64>,
    },
    Translation {
        #[serde(default)]
        translation: Vec<f64>,
    },
    Identity,
    #[serde(other)]
    Unknown,
}

/// One pyramid level as declared in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub path: String,

    #[serde(
        rename = "coordinateTransformations",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

impl Dataset {
    /// The first `scale` transform, if any.
    pub fn scale(&self) -> Option<&[f64]> {
        self.coordinate_transformations.iter().find_map(|t| match t {
            CoordinateTransformation::Scale { scale } => Some(scale.as_slice()),
            _ => None,
        })
    }

    /// Whether `array_path` names this dataset (matched on whole path segments).
    pub fn matches_path(&self, array_path: &str) -> bool {
        let suffix = self.path.trim_matches('/');
        let array_path = array_path.trim_end_matches('/');
        array_path == suffix || array_path.ends_with(&format!("/{}", suffix))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axes: Option<Vec<AxisSpec>>,

    pub datasets: Vec<Dataset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Multiscale {
    /// Declared axes, normalized.
    pub fn declared_axes(&self) -> Option<Vec<Axis>> {
        self.axes
            .as_ref()
            .map(|axes| axes.iter().map(AxisSpec::normalize).collect())
    }

    /// Declared axes, or `t,c,z,y,x` when the metadata predates `axes`.
    pub fn axes_or_default(&self) -> Vec<Axis> {
        self.declared_axes().unwrap_or_else(|| {
            DEFAULT_AXIS_NAMES
                .iter()
                .map(|name| Axis::named(*name))
                .collect()
        })
    }
}

// =============================================================================
// Omero
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OmeroChannel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderingDefaults {
    #[serde(rename = "defaultT", default, skip_serializing_if = "Option::is_none")]
    pub default_t: Option<u64>,

    #[serde(rename = "defaultZ", default, skip_serializing_if = "Option::is_none")]
    pub default_z: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Omero {
    pub channels: Vec<OmeroChannel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdefs: Option<RenderingDefaults>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// =============================================================================
// Plate / Well
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntry {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateWell {
    pub path: String,

    #[serde(rename = "rowIndex", default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,

    #[serde(rename = "columnIndex", default, skip_serializing_if = "Option::is_none")]
    pub column_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plate {
    pub rows: Vec<NamedEntry>,
    pub columns: Vec<NamedEntry>,
    pub wells: Vec<PlateWell>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Plate {
    /// Grid position `(row, column)` of a well.
    ///
    /// Uses the declared indices when present, otherwise matches the
    /// `<row>/<column>` path segments against the row and column names.
    pub fn well_position(&self, well: &PlateWell) -> Option<(usize, usize)> {
        if let (Some(row), Some(col)) = (well.row_index, well.column_index) {
            return Some((row, col));
        }
        let mut parts = well.path.trim_matches('/').split('/');
        let row_name = parts.next()?;
        let col_name = parts.next()?;
        let row = self.rows.iter().position(|r| r.name == row_name)?;
        let col = self.columns.iter().position(|c| c.name == col_name)?;
        Some((row, col))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellImage {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Well {
    pub images: Vec<WellImage>,
}

// =============================================================================
// Labels
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelColor {
    #[serde(rename = "label-value")]
    pub label_value: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgba: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageLabel {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<LabelColor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_attrs_unwraps_ome_envelope() {
        let attrs = json!({"ome": {"multiscales": []}, "other": 1});
        let resolved = resolve_attrs(attrs.as_object().unwrap());
        assert!(resolved.contains_key("multiscales"));
        assert!(!resolved.contains_key("other"));

        let plain = json!({"multiscales": []});
        let resolved = resolve_attrs(plain.as_object().unwrap());
        assert!(resolved.contains_key("multiscales"));
    }

    #[test]
    fn test_axes_accept_strings_and_records() {
        let ms: Multiscale = serde_json::from_value(json!({
            "axes": ["c", {"name": "y", "type": "space", "unit": "micrometer"}, "x"],
            "datasets": [{"path": "0"}]
        }))
        .unwrap();
        let axes = ms.declared_axes().unwrap();
        assert_eq!(axes[0], Axis::named("c"));
        assert!(axes[1].is_space());
        assert_eq!(axes[1].unit.as_deref(), Some("micrometer"));
    }

    #[test]
    fn test_missing_axes_default_to_tczyx() {
        let ms: Multiscale = serde_json::from_value(json!({"datasets": [{"path": "0"}]})).unwrap();
        let names: Vec<_> = ms.axes_or_default().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["t", "c", "z", "y", "x"]);
    }

    #[test]
    fn test_dataset_scale_and_path_match() {
        let ds: Dataset = serde_json::from_value(json!({
            "path": "1",
            "coordinateTransformations": [
                {"type": "translation", "translation": [0.0, 0.0]},
                {"type": "scale", "scale": [2.0, 2.0]}
            ]
        }))
        .unwrap();
        assert_eq!(ds.scale(), Some(&[2.0, 2.0][..]));
        assert!(ds.matches_path("/image.zarr/1"));
        assert!(!ds.matches_path("/image.zarr/11"));
    }

    #[test]
    fn test_unknown_transform_type_is_tolerated() {
        let ds: Dataset = serde_json::from_value(json!({
            "path": "0",
            "coordinateTransformations": [{"type": "affine", "affine": []}]
        }))
        .unwrap();
        assert_eq!(ds.scale(), None);
    }

    #[test]
    fn test_plate_well_position_from_path() {
        let plate: Plate = serde_json::from_value(json!({
            "rows": [{"name": "A"}, {"name": "B"}],
            "columns": [{"name": "1"}, {"name": "2"}, {"name": "3"}],
            "wells": [{"path": "B/3"}, {"path": "A/1", "rowIndex": 0, "columnIndex": 0}]
        }))
        .unwrap();
        assert_eq!(plate.well_position(&plate.wells[0]), Some((1, 2)));
        assert_eq!(plate.well_position(&plate.wells[1]), Some((0, 0)));
    }
}
