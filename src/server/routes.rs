//! Router configuration for NGFF Streamer.
//!
//! # Route Structure
//!
//! ```text
//! /health                                   - Health check
//! /images                                   - List loaded images
//! /images/{image_id}                        - Level geometry and channels
//! /images/{image_id}/layer                  - Initial layer state
//! /images/{image_id}/calibration            - Pixel size and scale bar
//! /tiles/{image_id}/{level}/{x}/{y}         - Raw tile pixels
//! /tiles/{image_id}/cells/{row}/{col}/{level}/{x}/{y}
//!                                           - Tile of a plate or well cell
//! /tiles/{image_id}/labels/{name}/{level}/{x}/{y}
//!                                           - Tile of a label image
//! /raster/{image_id}/{level}                - Raw pixels of a whole level
//! /raster/{image_id}/cells/{row}/{col}/{level}
//! /raster/{image_id}/labels/{name}/{level}
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ngff_streamer::server::{create_router, RouterConfig};
//! use ngff_streamer::tile::TileService;
//!
//! let tile_service = TileService::new(registry);
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(tile_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    calibration_handler, cell_raster_handler, cell_tile_handler, health_handler,
    image_metadata_handler, images_handler, label_raster_handler, label_tile_handler,
    layer_handler, raster_handler, tile_handler, AppState, PIXEL_DTYPE_HEADER,
    PIXEL_HEIGHT_HEADER, PIXEL_WIDTH_HEADER,
};
use crate::tile::{TileService, DEFAULT_MAX_RASTER_PIXELS};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Largest raster (width x height) served in one response
    pub max_raster_pixels: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    /// - Rasters are capped at 4096 x 4096 pixels
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
            max_raster_pixels: DEFAULT_MAX_RASTER_PIXELS,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the largest raster, in pixels, served in one response.
    pub fn with_max_raster_pixels(mut self, max_pixels: u64) -> Self {
        self.max_raster_pixels = max_pixels;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router with CORS and optional request tracing.
pub fn create_router(tile_service: TileService, config: RouterConfig) -> Router {
    let tile_service = tile_service.with_max_raster_pixels(config.max_raster_pixels);
    let app_state = AppState::with_cache_max_age(tile_service, config.cache_max_age);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/images", get(images_handler))
        .route("/images/{image_id}", get(image_metadata_handler))
        .route("/images/{image_id}/layer", get(layer_handler))
        .route("/images/{image_id}/calibration", get(calibration_handler))
        .route("/tiles/{image_id}/{level}/{x}/{y}", get(tile_handler))
        .route(
            "/tiles/{image_id}/cells/{row}/{col}/{level}/{x}/{y}",
            get(cell_tile_handler),
        )
        .route(
            "/tiles/{image_id}/labels/{name}/{level}/{x}/{y}",
            get(label_tile_handler),
        )
        .route("/raster/{image_id}/{level}", get(raster_handler))
        .route(
            "/raster/{image_id}/cells/{row}/{col}/{level}",
            get(cell_raster_handler),
        )
        .route(
            "/raster/{image_id}/labels/{name}/{level}",
            get(label_raster_handler),
        )
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
///
/// The pixel geometry headers are exposed so browser clients can decode
/// raw tile bodies.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([PIXEL_WIDTH_HEADER, PIXEL_HEIGHT_HEADER, PIXEL_DTYPE_HEADER])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
