//! # NGFF Streamer
//!
//! Tiled pixel access for OME-NGFF / Zarr image pyramids.
//!
//! Datasets are opened from a chunked-array store, classified by layout
//! (plain array, multiscales, OME multiscales, plate, well), and turned into
//! per-level pixel sources. Tile reads issued in the same frame are batched
//! and dispatched together.
//!
//! ## Architecture
//!
//! - [`store`] - Chunked-array store abstraction (filesystem Zarr, in-memory)
//! - [`ome`] - OME-NGFF metadata types and physical calibration
//! - [`pixel`] - Pixel sources, selections and request batching
//! - [`channels`] - Channel defaults, contrast limits and layer state
//! - [`dataset`] - Layout classification and dataset loading
//! - [`tile`] - Image registry and tile service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ngff_streamer::{ImageConfig, ImageRegistry, NextTick, TileRequest, TileService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = ImageRegistry::new();
//!     let id = registry
//!         .load_source(ImageConfig::new("/data/image.ome.zarr"), Arc::new(NextTick))
//!         .await
//!         .unwrap();
//!
//!     let service = TileService::new(registry);
//!     let tile = service.get_tile(TileRequest::new(id, 0, 0, 0)).await.unwrap();
//!     println!("{}x{} {}", tile.width, tile.height, tile.dtype.as_str());
//! }
//! ```

pub mod channels;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ome;
pub mod pixel;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use channels::{init_layer_state, LayerKind, LayerState, SourceData};
pub use config::{Cli, Command, InspectConfig, ServeConfig};
pub use dataset::{DatasetKind, DatasetLoader, ImageConfig};
pub use error::{LoadError, StoreError, TileError};
pub use pixel::{
    BaseSelection, FrameInterval, FrameScheduler, ManualScheduler, NextTick, PixelData,
    PixelDtype, PixelSource,
};
pub use server::{
    calibration_handler, create_router, health_handler, image_metadata_handler, images_handler,
    layer_handler, raster_handler, tile_handler, AppState, ErrorResponse, HealthResponse,
    RouterConfig,
};
pub use store::{ChunkStore, InMemoryStore, ZarrStore};
pub use tile::{
    ImageRegistry, LoadedImage, PixelTarget, RasterRequest, TileRequest, TileResponse, TileService,
};
