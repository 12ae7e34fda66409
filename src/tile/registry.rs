//! Image registry: loaded datasets addressable by id.
//!
//! Images are loaded once at startup. Each entry keeps its [`SourceData`]
//! (pixel sources for every level) and the initial [`LayerState`].
//!
//! # Example
//!
//! ```ignore
//! use ngff_streamer::dataset::ImageConfig;
//! use ngff_streamer::tile::ImageRegistry;
//!
//! let mut registry = ImageRegistry::new();
//! let id = registry
//!     .load_source(ImageConfig::new("/data/image.zarr"), scheduler)
//!     .await?;
//! let image = registry.get(&id).unwrap();
//! println!("{} levels", image.data.loader.len());
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::channels::{init_layer_state, GridLoader, LabelSource, LayerState, SourceData};
use crate::dataset::{DatasetLoader, ImageConfig};
use crate::error::LoadError;
use crate::pixel::{FrameScheduler, PixelSource};
use crate::store::ZarrStore;

/// A dataset that has been opened and is ready to serve tiles.
#[derive(Debug)]
pub struct LoadedImage {
    /// Registry id, unique within the registry
    pub id: String,

    /// The configuration it was opened with
    pub config: ImageConfig,

    /// Classified layout (`"multiscales"`, `"plate"`, ...)
    pub kind: &'static str,

    pub data: SourceData,

    pub layer: LayerState,
}

impl LoadedImage {
    /// Pixel source for a pyramid level.
    pub fn level(&self, level: usize) -> Option<&PixelSource> {
        self.data.loader.get(level)
    }

    pub fn level_count(&self) -> usize {
        self.data.loader.len()
    }

    /// Grid cell at `(row, col)` of a plate or well.
    pub fn cell(&self, row: usize, col: usize) -> Option<&GridLoader> {
        self.data
            .grid
            .as_ref()?
            .loaders
            .iter()
            .find(|cell| cell.row == row && cell.col == col)
    }

    /// Label image by name.
    pub fn label(&self, name: &str) -> Option<&LabelSource> {
        self.data.labels.iter().find(|label| label.name == name)
    }
}

/// Registry of loaded images, ordered by id.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: BTreeMap<String, Arc<LoadedImage>>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<LoadedImage>> {
        self.images.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LoadedImage>> {
        self.images.values()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// An id derived from the source's file stem, suffixed until unique.
    pub fn unique_id(&self, source: &str) -> String {
        let stem = Path::new(source.trim_end_matches('/'))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base: String = stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let base = if base.is_empty() { "image".to_string() } else { base };

        let mut id = base.clone();
        let mut n = 2;
        while self.images.contains_key(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        id
    }

    /// Open `config.source` from the filesystem and register it.
    pub async fn load_source(
        &mut self,
        config: ImageConfig,
        scheduler: Arc<dyn FrameScheduler>,
    ) -> Result<String, LoadError> {
        let (store, path) = ZarrStore::for_source(&config.source)?;
        let loader = DatasetLoader::new(Arc::new(store)).with_scheduler(scheduler);
        self.load_with(&loader, &path, config).await
    }

    /// Load the node at `path` through `loader` and register it.
    pub async fn load_with(
        &mut self,
        loader: &DatasetLoader,
        path: &str,
        config: ImageConfig,
    ) -> Result<String, LoadError> {
        let kind = loader.classify(path, &config.source).await?;
        let kind_name = kind.name();
        let data = loader.load_kind(kind, &config).await?;

        let id = self.unique_id(&config.source);
        let layer = init_layer_state(&id, &data)?;

        info!(
            id = %id,
            source = %config.source,
            kind = kind_name,
            levels = data.loader.len(),
            channels = data.channel_count(),
            "Registered image"
        );

        self.images.insert(
            id.clone(),
            Arc::new(LoadedImage {
                id: id.clone(),
                config,
                kind: kind_name,
                data,
                layer,
            }),
        );
        Ok(id)
    }
}
