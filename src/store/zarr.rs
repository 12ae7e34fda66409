//! Filesystem Zarr store backed by `zarrs`.
//!
//! Both node metadata (v2 or v3) and chunk decoding go through `zarrs`.
//! Every call into it runs on the blocking thread pool.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;
use zarrs::array::{Array, ArrayCreateError, ArrayShardedExt, ArraySubset};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::{Group, GroupCreateError};
use zarrs::plugin::ExtensionName;

use crate::error::StoreError;

use super::{
    normalize_path, resolve_ranges, AbortSignal, ArrayChunk, ArrayData, ArrayHandle, ChunkStore,
    DataType, DimSelection, GroupNode, StoreNode,
};

type ArrayCache = Arc<Mutex<HashMap<String, Arc<Array<FilesystemStore>>>>>;

/// A chunk store reading Zarr v2/v3 hierarchies from a local directory.
///
/// Opened `zarrs` arrays are cached by node path.
pub struct ZarrStore {
    storage: Arc<FilesystemStore>,
    identifier: String,
    arrays: ArrayCache,
}

impl ZarrStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let storage = FilesystemStore::new(&root).map_err(|e| StoreError::Read {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            identifier: format!("file://{}", root.display()),
            storage: Arc::new(storage),
            arrays: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Open a store for a dataset directory.
    ///
    /// The store is rooted at the dataset's parent directory so that a well
    /// nested under a plate can still reach the plate metadata. Returns the
    /// store and the dataset's node path within it.
    pub fn for_source(source: impl AsRef<Path>) -> Result<(Self, String), StoreError> {
        let source = source.as_ref();
        let canonical = source.canonicalize().map_err(|e| {
            StoreError::NotFound(format!("{}: {}", source.display(), e))
        })?;

        let name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        match (canonical.parent(), name) {
            (Some(parent), Some(name)) => Ok((Self::new(parent)?, normalize_path(&name))),
            _ => Ok((Self::new(&canonical)?, "/".to_string())),
        }
    }

    fn array_for(
        storage: &Arc<FilesystemStore>,
        cache: &ArrayCache,
        path: &str,
    ) -> Result<Arc<Array<FilesystemStore>>, StoreError> {
        let mut arrays = cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(array) = arrays.get(path) {
            return Ok(Arc::clone(array));
        }

        let array = Array::open(Arc::clone(storage), path).map_err(|e| StoreError::Metadata {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        let array = Arc::new(array);
        arrays.insert(path.to_string(), Arc::clone(&array));
        Ok(array)
    }
}

#[async_trait]
impl ChunkStore for ZarrStore {
    async fn open(&self, path: &str) -> Result<StoreNode, StoreError> {
        let path = normalize_path(path);
        let storage = Arc::clone(&self.storage);
        let cache = Arc::clone(&self.arrays);
        let node_path = path.clone();

        tokio::task::spawn_blocking(move || open_node(storage, &cache, node_path))
            .await
            .map_err(|e| StoreError::Read {
                path,
                message: e.to_string(),
            })?
    }

    async fn read(
        &self,
        array: &ArrayHandle,
        selection: &[DimSelection],
        signal: Option<&AbortSignal>,
    ) -> Result<ArrayChunk, StoreError> {
        let (ranges, shape) = resolve_ranges(&array.path, &array.shape, selection)?;
        if signal.is_some_and(AbortSignal::is_aborted) {
            return Err(StoreError::Aborted);
        }

        let storage = Arc::clone(&self.storage);
        let cache = Arc::clone(&self.arrays);
        let path = array.path.clone();
        let dtype = array.dtype.clone();

        debug!(store = %self.identifier, path = %path, ?ranges, "Decoding array subset");

        let task = tokio::task::spawn_blocking(move || {
            let zarr_array = Self::array_for(&storage, &cache, &path)?;
            let subset = ArraySubset::new_with_ranges(&ranges);
            decode_subset(&zarr_array, &subset, &dtype, &path)
        });

        let joined = match signal {
            Some(signal) => tokio::select! {
                joined = task => joined,
                _ = signal.aborted() => return Err(StoreError::Aborted),
            },
            None => task.await,
        };

        let data = joined.map_err(|e| StoreError::Read {
            path: array.path.clone(),
            message: e.to_string(),
        })??;

        Ok(ArrayChunk { data, shape })
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Decoding
// =============================================================================

macro_rules! retrieve {
    ($array:expr, $subset:expr, $path:expr, $variant:ident, $ty:ty) => {{
        let values: Vec<$ty> =
            $array
                .retrieve_array_subset($subset)
                .map_err(|e| StoreError::Read {
                    path: $path.to_string(),
                    message: e.to_string(),
                })?;
        ArrayData::$variant(values)
    }};
}

fn decode_subset(
    array: &Array<FilesystemStore>,
    subset: &ArraySubset,
    dtype: &DataType,
    path: &str,
) -> Result<ArrayData, StoreError> {
    let data = match dtype {
        DataType::Int8 => retrieve!(array, subset, path, Int8, i8),
        DataType::Int16 => retrieve!(array, subset, path, Int16, i16),
        DataType::Int32 => retrieve!(array, subset, path, Int32, i32),
        DataType::Int64 => retrieve!(array, subset, path, Int64, i64),
        DataType::Uint8 => retrieve!(array, subset, path, Uint8, u8),
        DataType::Uint16 => retrieve!(array, subset, path, Uint16, u16),
        DataType::Uint32 => retrieve!(array, subset, path, Uint32, u32),
        DataType::Uint64 => retrieve!(array, subset, path, Uint64, u64),
        DataType::Float16 => retrieve!(array, subset, path, Float16, half::f16),
        DataType::Float32 => retrieve!(array, subset, path, Float32, f32),
        DataType::Float64 => retrieve!(array, subset, path, Float64, f64),
        DataType::Other(name) => {
            return Err(StoreError::Read {
                path: path.to_string(),
                message: format!("cannot decode dtype {}", name),
            })
        }
    };
    Ok(data)
}

// =============================================================================
// Metadata
// =============================================================================

fn open_node(
    storage: Arc<FilesystemStore>,
    cache: &ArrayCache,
    path: String,
) -> Result<StoreNode, StoreError> {
    let array_err = match Array::open(Arc::clone(&storage), &path) {
        Ok(array) => {
            let handle = array_handle(&path, &array)?;
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path, Arc::new(array));
            return Ok(StoreNode::Array(handle));
        }
        Err(e) => e,
    };

    match Group::open(storage, &path) {
        Ok(group) => Ok(StoreNode::Group(GroupNode {
            attrs: group.attributes().clone(),
            path,
        })),
        Err(GroupCreateError::MissingMetadata)
            if matches!(array_err, ArrayCreateError::MissingMetadata) =>
        {
            Err(StoreError::NotFound(path))
        }
        Err(GroupCreateError::MissingMetadata) => Err(StoreError::Metadata {
            path,
            message: array_err.to_string(),
        }),
        Err(e) => Err(StoreError::Metadata {
            path,
            message: e.to_string(),
        }),
    }
}

/// Describe an opened array. For sharded arrays the chunk shape is the
/// inner chunk, the unit the codec can decode on its own.
fn array_handle(path: &str, array: &Array<FilesystemStore>) -> Result<ArrayHandle, StoreError> {
    let shape = array.shape().to_vec();

    let chunks = match array.subchunk_shape() {
        Some(inner) => inner,
        None => array
            .chunk_shape(&vec![0; shape.len()])
            .map_err(|e| StoreError::Metadata {
                path: path.to_string(),
                message: e.to_string(),
            })?,
    };
    let chunks = chunks.iter().map(|c| c.get()).collect();

    let data_type = array.data_type();
    let dtype = match data_type.name_v3() {
        Some(name) => DataType::from_v3_name(&name),
        None => DataType::Other(data_type.to_string()),
    };

    Ok(ArrayHandle {
        path: path.to_string(),
        shape,
        chunks,
        dtype,
        attrs: array.attributes().clone(),
    })
}
