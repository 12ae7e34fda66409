//! HTTP server layer for NGFF Streamer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │           GET /tiles/{image_id}/{level}/{x}/{y}                 │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (requests, error mapping)│  │  (router config, CORS)      │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    calibration_handler, health_handler, image_metadata_handler, images_handler, layer_handler,
    raster_handler, tile_handler, AppState, CalibrationQueryParams, ChannelResponse,
    ErrorResponse, HealthResponse, ImageMetadataResponse, ImageSummary, ImagesResponse,
    LevelMetadataResponse, PixelQueryParams, TilePathParams, PIXEL_DTYPE_HEADER,
    PIXEL_HEIGHT_HEADER, PIXEL_WIDTH_HEADER,
};
pub use routes::{create_router, RouterConfig};
