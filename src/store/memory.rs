//! In-memory chunk store.
//!
//! Holds groups and fully materialized arrays keyed by node path. Every read
//! is counted and logged so tests can assert on request patterns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;

use super::{
    normalize_path, resolve_ranges, AbortSignal, ArrayChunk, ArrayData, ArrayHandle, ChunkStore,
    DimSelection, GroupNode, StoreNode,
};

enum MemoryNode {
    Group(Map<String, Value>),
    Array { handle: ArrayHandle, data: ArrayData },
}

/// A chunk store backed by in-memory arrays.
///
/// # Example
///
/// ```
/// use ngff_streamer::store::{ArrayData, InMemoryStore};
/// use serde_json::json;
///
/// let store = InMemoryStore::new("memory://demo")
///     .with_group("/", json!({"multiscales": [{"datasets": [{"path": "0"}]}]}))
///     .with_array("/0", vec![4, 4], vec![2, 2], ArrayData::Uint8(vec![0; 16]));
/// assert_eq!(store.read_count(), 0);
/// ```
pub struct InMemoryStore {
    identifier: String,
    nodes: HashMap<String, MemoryNode>,
    read_count: Arc<AtomicUsize>,
    reads: Arc<Mutex<Vec<(String, Vec<DimSelection>)>>>,
    failing: Vec<String>,
}

impl InMemoryStore {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            nodes: HashMap::new(),
            read_count: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(Mutex::new(Vec::new())),
            failing: Vec::new(),
        }
    }

    /// Add a group. `attrs` must be a JSON object; anything else is stored as empty.
    pub fn with_group(mut self, path: &str, attrs: Value) -> Self {
        let attrs = match attrs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.nodes
            .insert(normalize_path(path), MemoryNode::Group(attrs));
        self
    }

    /// Add an array holding `data` in C order.
    pub fn with_array(
        mut self,
        path: &str,
        shape: Vec<u64>,
        chunks: Vec<u64>,
        data: ArrayData,
    ) -> Self {
        let path = normalize_path(path);
        let handle = ArrayHandle {
            path: path.clone(),
            shape,
            chunks,
            dtype: data.dtype(),
            attrs: Map::new(),
        };
        self.nodes.insert(path, MemoryNode::Array { handle, data });
        self
    }

    /// Make every read of the array at `path` fail.
    pub fn with_failing_array(mut self, path: &str) -> Self {
        self.failing.push(normalize_path(path));
        self
    }

    /// Number of reads issued so far.
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Every read issued so far, as `(path, selection)`.
    pub fn reads(&self) -> Vec<(String, Vec<DimSelection>)> {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn open(&self, path: &str) -> Result<StoreNode, StoreError> {
        let path = normalize_path(path);
        match self.nodes.get(&path) {
            Some(MemoryNode::Group(attrs)) => Ok(StoreNode::Group(GroupNode {
                path,
                attrs: attrs.clone(),
            })),
            Some(MemoryNode::Array { handle, .. }) => Ok(StoreNode::Array(handle.clone())),
            None => Err(StoreError::NotFound(path)),
        }
    }

    async fn read(
        &self,
        array: &ArrayHandle,
        selection: &[DimSelection],
        signal: Option<&AbortSignal>,
    ) -> Result<ArrayChunk, StoreError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((array.path.clone(), selection.to_vec()));

        // Yield once so sibling reads interleave and aborts can land.
        tokio::task::yield_now().await;
        if signal.is_some_and(AbortSignal::is_aborted) {
            return Err(StoreError::Aborted);
        }

        if self.failing.contains(&array.path) {
            return Err(StoreError::Read {
                path: array.path.clone(),
                message: "simulated read failure".to_string(),
            });
        }

        let (handle, data) = match self.nodes.get(&array.path) {
            Some(MemoryNode::Array { handle, data }) => (handle, data),
            _ => return Err(StoreError::NotFound(array.path.clone())),
        };

        let expected: u64 = handle.shape.iter().product();
        if data.len() as u64 != expected {
            return Err(StoreError::Metadata {
                path: handle.path.clone(),
                message: format!(
                    "array holds {} elements but shape {:?} needs {}",
                    data.len(),
                    handle.shape,
                    expected
                ),
            });
        }

        let (ranges, shape) = resolve_ranges(&handle.path, &handle.shape, selection)?;
        Ok(ArrayChunk {
            data: data.gather(&handle.shape, &ranges),
            shape,
        })
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
