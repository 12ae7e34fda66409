//! Dataset layout classification.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::LoadError;
use crate::ome::{resolve_attrs, Multiscale, Omero, Plate, Well};
use crate::store::{parent_path, ArrayHandle, ChunkStore, GroupNode, StoreNode};

/// Viewer for layouts this crate cannot open directly.
pub const OME_VALIDATOR_URL: &str = "https://ome.github.io/ome-ngff-validator/";

/// A store node classified by its layout, with its metadata validated.
#[derive(Debug, Clone)]
pub enum DatasetKind {
    /// A bare array with no pyramid metadata
    Array(ArrayHandle),

    /// A plate of wells; `group` is the plate group
    Plate { group: GroupNode, plate: Plate },

    /// A well holding one or more fields
    Well { group: GroupNode, well: Well },

    /// A multiscale image with OMERO rendering metadata
    Ome {
        group: GroupNode,
        multiscales: Vec<Multiscale>,
        omero: Omero,
    },

    /// A multiscale image without rendering metadata
    Multiscales {
        group: GroupNode,
        multiscales: Vec<Multiscale>,
    },
}

impl DatasetKind {
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Array(_) => "array",
            DatasetKind::Plate { .. } => "plate",
            DatasetKind::Well { .. } => "well",
            DatasetKind::Ome { .. } => "ome-multiscales",
            DatasetKind::Multiscales { .. } => "multiscales",
        }
    }
}

/// Deserialize `key` from `attrs`, if present.
pub(super) fn parse_key<T: DeserializeOwned>(
    attrs: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<T>, LoadError> {
    match attrs.get(key) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            LoadError::Schema(format!("invalid '{}' metadata at {}: {}", key, path, e))
        }),
    }
}

/// Classify an opened node.
///
/// Groups are checked in priority order: plate, well, OME multiscales,
/// plate parent of an attribute-less group, bioformats2raw layout, then
/// plain multiscales. `source` is only used to build the redirect URL.
pub async fn classify(
    store: &dyn ChunkStore,
    node: StoreNode,
    source: &str,
) -> Result<DatasetKind, LoadError> {
    let group = match node {
        StoreNode::Array(array) => return Ok(DatasetKind::Array(array)),
        StoreNode::Group(group) => group,
    };
    let attrs = resolve_attrs(&group.attrs);

    if let Some(plate) = parse_key::<Plate>(&attrs, "plate", &group.path)? {
        return Ok(DatasetKind::Plate { group, plate });
    }

    if let Some(well) = parse_key::<Well>(&attrs, "well", &group.path)? {
        return Ok(DatasetKind::Well { group, well });
    }

    if attrs.contains_key("multiscales") && attrs.contains_key("omero") {
        let multiscales = parse_key(&attrs, "multiscales", &group.path)?.unwrap_or_default();
        if let Some(omero) = parse_key::<Omero>(&attrs, "omero", &group.path)? {
            return Ok(DatasetKind::Ome {
                group,
                multiscales,
                omero,
            });
        }
    }

    if attrs.is_empty() {
        if let Some(parent) = parent_path(&group.path) {
            match store.open(&parent).await {
                Ok(StoreNode::Group(parent)) => {
                    let parent_attrs = resolve_attrs(&parent.attrs);
                    if let Some(plate) = parse_key::<Plate>(&parent_attrs, "plate", &parent.path)? {
                        debug!(path = %group.path, plate = %parent.path, "Opening parent plate");
                        return Ok(DatasetKind::Plate {
                            group: parent,
                            plate,
                        });
                    }
                }
                Ok(StoreNode::Array(_)) => {}
                Err(e) => debug!(path = %parent, error = %e, "Parent group not readable"),
            }
        }
    }

    if attrs.contains_key("bioformats2raw.layout") {
        let url = url::Url::parse_with_params(OME_VALIDATOR_URL, &[("source", source)])
            .map(String::from)
            .unwrap_or_else(|_| format!("{}?source={}", OME_VALIDATOR_URL, source));
        return Err(LoadError::Redirect {
            message: "Please open in ome-ngff-validator".to_string(),
            url,
        });
    }

    match parse_key::<Vec<Multiscale>>(&attrs, "multiscales", &group.path)? {
        Some(multiscales) => Ok(DatasetKind::Multiscales { group, multiscales }),
        None => Err(LoadError::Schema(
            "Group is missing multiscales specification.".to_string(),
        )),
    }
}
