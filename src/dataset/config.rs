//! Caller-supplied image configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Contrast limits for one channel, or one pair per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContrastLimitsConfig {
    Single([f64; 2]),
    PerChannel(Vec<[f64; 2]>),
}

/// A model matrix as 16 numbers, or as a comma-separated string of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelMatrixInput {
    Values(Vec<f64>),
    Text(String),
}

/// How one image should be opened and displayed.
///
/// Every field except `source` is optional; omitted values are taken from
/// the dataset's metadata or computed defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Location of the dataset
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Axis names overriding metadata and guesses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_labels: Option<Vec<String>>,

    /// Channel axis overriding metadata and guesses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_axis: Option<usize>,

    /// Single-channel color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast_limits: Option<ContrastLimitsConfig>,

    /// Single-channel visibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibilities: Option<Vec<bool>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_matrix: Option<ModelMatrixInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap: Option<String>,
}

/// Keys whose query-string values are always plain strings.
const STRING_KEYS: &[&str] = &["source", "name", "color", "colormap"];

impl ImageConfig {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Parse a URL query string such as
    /// `source=/data/img.zarr&channel_axis=1&colors=["#FF0000","#00FF00"]`.
    ///
    /// Values that parse as JSON are used as JSON; `axis_labels` also
    /// accepts a comma-separated list.
    pub fn from_query(query: &str) -> Result<Self, String> {
        let query = query.trim_start_matches('?');
        let mut map = Map::new();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let parsed = if STRING_KEYS.contains(&key.as_ref()) {
                Value::String(value.into_owned())
            } else if key == "axis_labels" && !value.trim_start().starts_with('[') {
                Value::Array(
                    value
                        .split(',')
                        .map(|s| Value::String(s.trim().to_string()))
                        .collect(),
                )
            } else {
                serde_json::from_str(&value).unwrap_or_else(|_| Value::String(value.into_owned()))
            };
            map.insert(key.into_owned(), parsed);
        }

        if !map.contains_key("source") {
            return Err("query string has no 'source'".to_string());
        }

        serde_json::from_value(Value::Object(map)).map_err(|e| format!("invalid image config: {}", e))
    }
}
