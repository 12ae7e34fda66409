//! Chunked-array store protocol.
//!
//! The rest of the crate never touches chunk encoding. It opens nodes by path
//! and reads selections from arrays through the [`ChunkStore`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      PixelSource / dataset loaders      │
//! └────────────────────┬────────────────────┘
//!                      │ open(path), read(array, selection)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            ChunkStore Trait             │
//! └────────────────────┬────────────────────┘
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  InMemoryStore  │    │      ZarrStore      │
//! │ (tests, demos)  │    │ (zarrs filesystem)  │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! Node paths are absolute within the store (`/`, `/image.zarr/0`).

mod dtype;
mod memory;
mod signal;
mod zarr;

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

pub use dtype::{ArrayData, DataType};
pub use memory::InMemoryStore;
pub use signal::AbortSignal;
pub use zarr::ZarrStore;

/// Shared handle to a store, as held by pixel sources.
pub type SharedStore = Arc<dyn ChunkStore>;

// =============================================================================
// Selections
// =============================================================================

/// A half-open range along one axis. `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Slice {
    pub start: Option<u64>,
    pub stop: Option<u64>,
}

impl Slice {
    /// `[start, stop)`
    pub fn new(start: u64, stop: u64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
        }
    }

    /// The whole axis.
    pub fn all() -> Self {
        Self::default()
    }
}

/// Selection along one axis: a fixed index (axis dropped from the output)
/// or a range (axis kept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimSelection {
    Index(u64),
    Slice(Slice),
}

impl From<u64> for DimSelection {
    fn from(index: u64) -> Self {
        DimSelection::Index(index)
    }
}

impl From<Slice> for DimSelection {
    fn from(slice: Slice) -> Self {
        DimSelection::Slice(slice)
    }
}

impl fmt::Display for DimSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimSelection::Index(i) => write!(f, "{}", i),
            DimSelection::Slice(s) => {
                if let Some(start) = s.start {
                    write!(f, "{}", start)?;
                }
                f.write_str(":")?;
                if let Some(stop) = s.stop {
                    write!(f, "{}", stop)?;
                }
                Ok(())
            }
        }
    }
}

/// Resolve a selection against an array shape.
///
/// Returns the per-axis element ranges to read and the output shape (axes
/// selected by index are dropped). Slice bounds are clamped to the axis
/// extent; an index past the extent is an error.
pub fn resolve_ranges(
    path: &str,
    shape: &[u64],
    selection: &[DimSelection],
) -> Result<(Vec<Range<u64>>, Vec<u64>), StoreError> {
    if selection.len() != shape.len() {
        return Err(StoreError::InvalidSelection {
            path: path.to_string(),
            message: format!(
                "selection has {} entries but array has rank {}",
                selection.len(),
                shape.len()
            ),
        });
    }

    let mut ranges = Vec::with_capacity(shape.len());
    let mut out_shape = Vec::new();

    for (axis, (sel, &extent)) in selection.iter().zip(shape).enumerate() {
        match sel {
            DimSelection::Index(i) => {
                if *i >= extent {
                    return Err(StoreError::InvalidSelection {
                        path: path.to_string(),
                        message: format!(
                            "index {} out of range for axis {} with extent {}",
                            i, axis, extent
                        ),
                    });
                }
                ranges.push(*i..*i + 1);
            }
            DimSelection::Slice(s) => {
                let stop = s.stop.unwrap_or(extent).min(extent);
                let start = s.start.unwrap_or(0).min(stop);
                ranges.push(start..stop);
                out_shape.push(stop - start);
            }
        }
    }

    Ok((ranges, out_shape))
}

// =============================================================================
// Nodes
// =============================================================================

/// An opened array. Read-only from this crate's perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayHandle {
    /// Absolute node path within the store
    pub path: String,

    /// Extent of each axis
    pub shape: Vec<u64>,

    /// Chunk extent of each axis
    pub chunks: Vec<u64>,

    /// Element type as declared by the store
    pub dtype: DataType,

    /// User attributes
    pub attrs: Map<String, Value>,
}

/// An opened group and its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub path: String,
    pub attrs: Map<String, Value>,
}

/// A store node is either an array or a group.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreNode {
    Array(ArrayHandle),
    Group(GroupNode),
}

impl StoreNode {
    pub fn path(&self) -> &str {
        match self {
            StoreNode::Array(a) => &a.path,
            StoreNode::Group(g) => &g.path,
        }
    }
}

/// Data returned by a store read.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayChunk {
    pub data: ArrayData,
    pub shape: Vec<u64>,
}

// =============================================================================
// ChunkStore Trait
// =============================================================================

/// Trait for the external chunked-array store.
///
/// Implementations own decoding and are responsible for honoring the abort
/// signal, surfacing [`StoreError::Aborted`] when it fires. The crate never
/// writes through this trait.
#[async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    /// Open the array or group at `path`.
    async fn open(&self, path: &str) -> Result<StoreNode, StoreError>;

    /// Read `selection` from `array`.
    ///
    /// `selection` has one entry per axis of the array.
    async fn read(
        &self,
        array: &ArrayHandle,
        selection: &[DimSelection],
        signal: Option<&AbortSignal>,
    ) -> Result<ArrayChunk, StoreError>;

    /// A human-readable identifier for logging.
    fn identifier(&self) -> &str;
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Normalize a node path: leading `/`, no trailing `/`, no `.` or empty segments.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Join a child path onto a node path.
pub fn join_path(base: &str, child: &str) -> String {
    normalize_path(&format!("{}/{}", base, child))
}

/// Parent of a node path, or `None` for the root.
pub fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path == "/" {
        return None;
    }
    Some(join_path(&path, ".."))
}
