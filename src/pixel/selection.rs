//! Building complete store selections from partial viewer selections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::{DimSelection, Slice};

pub const X_AXIS: &str = "x";
pub const Y_AXIS: &str = "y";

/// Reserved pseudo-axis holding interleaved RGB(A) samples.
pub const RGBA_CHANNEL_AXIS: &str = "_c";

/// A caller-supplied selection of non-spatial axes.
///
/// Either a full positional vector in array axis order, or a sparse map of
/// axis name to index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BaseSelection {
    Positional(Vec<u64>),
    Named(BTreeMap<String, u64>),
}

impl Default for BaseSelection {
    fn default() -> Self {
        BaseSelection::Named(BTreeMap::new())
    }
}

impl BaseSelection {
    /// Parse `"0,1,0"` or a JSON array/object such as `{"c": 1, "z": 4}`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::default());
        }

        if input.starts_with('{') || input.starts_with('[') {
            return serde_json::from_str(input)
                .map_err(|e| format!("invalid selection '{}': {}", input, e));
        }

        input
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u64>()
                    .map_err(|_| format!("invalid selection index '{}'", part.trim()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(BaseSelection::Positional)
    }
}

/// Build a selection with one entry per label.
///
/// A positional base is copied (zero-padded or truncated to the label
/// count); a named base fills a zero vector, ignoring unknown names. The
/// `x` and `y` axes then receive the given slices and `_c` is set to the
/// whole axis, overriding anything the base supplied.
pub fn build_selection(
    base: &BaseSelection,
    labels: &[String],
    x: Slice,
    y: Slice,
) -> Vec<DimSelection> {
    let mut selection: Vec<DimSelection> = match base {
        BaseSelection::Positional(indices) => {
            let mut out: Vec<DimSelection> =
                indices.iter().copied().map(DimSelection::Index).collect();
            out.resize(labels.len(), DimSelection::Index(0));
            out
        }
        BaseSelection::Named(named) => {
            let mut out = vec![DimSelection::Index(0); labels.len()];
            for (name, index) in named {
                if let Some(pos) = labels.iter().position(|l| l == name) {
                    out[pos] = DimSelection::Index(*index);
                }
            }
            out
        }
    };

    for (label, value) in [(X_AXIS, x), (Y_AXIS, y), (RGBA_CHANNEL_AXIS, Slice::all())] {
        if let Some(pos) = labels.iter().position(|l| l == label) {
            selection[pos] = DimSelection::Slice(value);
        }
    }

    selection
}
