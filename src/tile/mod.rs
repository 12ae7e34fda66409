//! Tile service layer.
//!
//! The tile service sits between the HTTP layer and the loaded datasets:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │   level / bounds checks, calibration    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             ImageRegistry               │
//! │   LoadedImage { SourceData, LayerState }│
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ImageRegistry`]: Datasets opened at startup, keyed by id
//! - [`TileService`]: Entry point for tile, raster and calibration requests
//! - [`TileRequest`]: Parameters for a tile request
//! - [`TileResponse`]: Raw little-endian pixels and their geometry

mod registry;
mod service;

pub use registry::{ImageRegistry, LoadedImage};
pub use service::{
    Calibration, PixelTarget, RasterRequest, TileRequest, TileResponse, TileService,
    DEFAULT_MAX_RASTER_PIXELS,
};
