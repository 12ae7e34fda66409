//! HTTP request handlers for the NGFF Streamer API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /images` - List loaded images
//! - `GET /images/{image_id}` - Level geometry and channel settings
//! - `GET /images/{image_id}/layer` - Initial layer state
//! - `GET /images/{image_id}/calibration` - Pixel size and scale bar for a zoom
//! - `GET /tiles/{image_id}/{level}/{x}/{y}` - Raw tile pixels
//! - `GET /tiles/{image_id}/cells/{row}/{col}/{level}/{x}/{y}` - Tile of a grid cell
//! - `GET /tiles/{image_id}/labels/{name}/{level}/{x}/{y}` - Tile of a label image
//! - `GET /raster/{image_id}/{level}` - Raw pixels of a whole level
//! - `GET /raster/{image_id}/cells/{row}/{col}/{level}` - Whole level of a grid cell
//! - `GET /raster/{image_id}/labels/{name}/{level}` - Whole level of a label image

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::channels::LayerState;
use crate::error::{StoreError, TileError};
use crate::ome::PixelSize;
use crate::pixel::{BaseSelection, PixelDtype, PixelSource};
use crate::tile::{
    Calibration, LoadedImage, PixelTarget, RasterRequest, TileRequest, TileResponse, TileService,
};

/// Element width of the raw pixel body, in pixels.
pub const PIXEL_WIDTH_HEADER: HeaderName = HeaderName::from_static("x-pixel-width");

/// Element height of the raw pixel body, in pixels.
pub const PIXEL_HEIGHT_HEADER: HeaderName = HeaderName::from_static("x-pixel-height");

/// Element type of the raw pixel body, e.g. `Uint16`.
pub const PIXEL_DTYPE_HEADER: HeaderName = HeaderName::from_static("x-pixel-dtype");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub tile_service: Arc<TileService>,

    /// Cache-Control max-age in seconds for pixel responses
    pub cache_max_age: u32,
}

impl AppState {
    pub fn new(tile_service: TileService) -> Self {
        Self::with_cache_max_age(tile_service, 3600)
    }

    pub fn with_cache_max_age(tile_service: TileService, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{image_id}/{level}/{x}/{y}`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub image_id: String,

    /// Pyramid level (0 = highest resolution)
    pub level: usize,

    /// Tile column
    pub x: u64,

    /// Tile row
    pub y: u64,
}

/// Path parameters for grid cell tile requests.
///
/// Extracted from: `/tiles/{image_id}/cells/{row}/{col}/{level}/{x}/{y}`
#[derive(Debug, Deserialize)]
pub struct CellTilePathParams {
    pub image_id: String,

    /// Grid row of the cell
    pub row: usize,

    /// Grid column of the cell
    pub col: usize,

    pub level: usize,
    pub x: u64,
    pub y: u64,
}

/// Path parameters for label tile requests.
///
/// Extracted from: `/tiles/{image_id}/labels/{name}/{level}/{x}/{y}`
#[derive(Debug, Deserialize)]
pub struct LabelTilePathParams {
    pub image_id: String,

    /// Label image name, as listed by `/images/{image_id}`
    pub name: String,

    pub level: usize,
    pub x: u64,
    pub y: u64,
}

/// Path parameters for grid cell raster requests.
///
/// Extracted from: `/raster/{image_id}/cells/{row}/{col}/{level}`
#[derive(Debug, Deserialize)]
pub struct CellRasterPathParams {
    pub image_id: String,
    pub row: usize,
    pub col: usize,
    pub level: usize,
}

/// Path parameters for label raster requests.
///
/// Extracted from: `/raster/{image_id}/labels/{name}/{level}`
#[derive(Debug, Deserialize)]
pub struct LabelRasterPathParams {
    pub image_id: String,
    pub name: String,
    pub level: usize,
}

/// Query parameters for tile and raster requests.
#[derive(Debug, Default, Deserialize)]
pub struct PixelQueryParams {
    /// Indices for the non-spatial axes: `0,1,0`, `[0,1,0]` or `{"c":1}`
    #[serde(default)]
    pub selection: Option<String>,
}

impl PixelQueryParams {
    pub fn selection(&self) -> Result<BaseSelection, TileError> {
        match &self.selection {
            Some(s) => BaseSelection::parse(s).map_err(TileError::InvalidSelection),
            None => Ok(BaseSelection::default()),
        }
    }
}

/// Query parameters for calibration requests.
#[derive(Debug, Deserialize)]
pub struct CalibrationQueryParams {
    /// Viewer zoom, 0 = full resolution, negative = zoomed out
    #[serde(default)]
    pub zoom: f64,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_level")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One entry of the image list.
#[derive(Debug, Serialize)]
pub struct ImageSummary {
    pub id: String,
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Classified layout (`"multiscales"`, `"plate"`, ...)
    pub kind: String,
    pub level_count: usize,
    pub channel_count: usize,
}

impl From<&LoadedImage> for ImageSummary {
    fn from(image: &LoadedImage) -> Self {
        Self {
            id: image.id.clone(),
            source: image.config.source.clone(),
            name: image.data.name.clone(),
            kind: image.kind.to_string(),
            level_count: image.level_count(),
            channel_count: image.data.channel_count(),
        }
    }
}

/// Response from the image list endpoint.
#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    pub images: Vec<ImageSummary>,
}

/// Metadata for a single pyramid level.
#[derive(Debug, Serialize)]
pub struct LevelMetadataResponse {
    /// Pyramid level index (0 = highest resolution)
    pub level: usize,

    /// Array path within the store
    pub path: String,
    pub shape: Vec<u64>,
    pub width: u64,
    pub height: u64,
    pub tile_size: u64,
    pub tiles_x: u64,
    pub tiles_y: u64,

    /// Nanometers per pixel, when the pyramid is calibrated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_size: Option<PixelSize>,
}

impl LevelMetadataResponse {
    fn new(level: usize, source: &PixelSource) -> Self {
        let (tiles_x, tiles_y) = source.tile_count();
        Self {
            level,
            path: source.path().to_string(),
            shape: source.shape().to_vec(),
            width: source.width(),
            height: source.height(),
            tile_size: source.tile_size(),
            tiles_x,
            tiles_y,
            pixel_size: source.pixel_size(),
        }
    }

    fn for_levels(sources: &[PixelSource]) -> Vec<Self> {
        sources
            .iter()
            .enumerate()
            .map(|(level, source)| Self::new(level, source))
            .collect()
    }
}

/// One cell of a plate or well grid.
#[derive(Debug, Serialize)]
pub struct CellResponse {
    pub name: String,
    pub row: usize,
    pub col: usize,

    /// Cells are served at a single level
    pub levels: Vec<LevelMetadataResponse>,
}

/// One label image overlaid on the image.
#[derive(Debug, Serialize)]
pub struct LabelResponse {
    pub name: String,
    pub levels: Vec<LevelMetadataResponse>,
}

/// Settings of one logical channel.
#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    pub name: String,
    pub color: String,
    pub visible: bool,

    /// Absent for hidden channels whose range was not sampled
    pub contrast_limits: Option<[f64; 2]>,
}

/// Response from the image metadata endpoint.
#[derive(Debug, Serialize)]
pub struct ImageMetadataResponse {
    #[serde(flatten)]
    pub summary: ImageSummary,

    pub axis_labels: Vec<String>,
    pub channel_axis: Option<usize>,
    pub dtype: Option<PixelDtype>,
    pub channels: Vec<ChannelResponse>,
    pub levels: Vec<LevelMetadataResponse>,

    /// Grid cells, addressable under `/tiles/{image_id}/cells/...`
    pub cells: Vec<CellResponse>,

    /// Label images, addressable under `/tiles/{image_id}/labels/...`
    pub labels: Vec<LabelResponse>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// 5xx errors are logged at ERROR, 404s at DEBUG and other 4xx at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            TileError::ImageNotFound { image_id } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Image not found: {}", image_id),
            ),

            TileError::InvalidLevel { level, max_levels } => (
                StatusCode::BAD_REQUEST,
                "invalid_level",
                format!(
                    "Invalid level: {} (image has {} levels, valid range: 0-{})",
                    level,
                    max_levels,
                    max_levels.saturating_sub(1)
                ),
            ),

            TileError::TileOutOfBounds {
                level,
                x,
                y,
                max_x,
                max_y,
            } => (
                StatusCode::BAD_REQUEST,
                "tile_out_of_bounds",
                format!(
                    "Tile coordinates ({}, {}) at level {} are out of bounds (max: {}, {})",
                    x,
                    y,
                    level,
                    max_x.saturating_sub(1),
                    max_y.saturating_sub(1)
                ),
            ),

            TileError::CellNotFound { .. } | TileError::LabelNotFound { .. } => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }

            TileError::RasterTooLarge { .. } => (
                StatusCode::BAD_REQUEST,
                "raster_too_large",
                self.to_string(),
            ),

            TileError::InvalidSelection(message) => (
                StatusCode::BAD_REQUEST,
                "invalid_selection",
                message.clone(),
            ),

            TileError::Fetch(store_err) => match store_err {
                StoreError::InvalidSelection { .. } => (
                    StatusCode::BAD_REQUEST,
                    "invalid_selection",
                    store_err.to_string(),
                ),
                StoreError::NotFound(path) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Array not found: {}", path),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "fetch_error",
                    store_err.to_string(),
                ),
            },
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

/// Raw pixel body with geometry and cache headers.
fn pixel_response(response: TileResponse, cache_max_age: u32) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", cache_max_age),
            ),
            (PIXEL_WIDTH_HEADER, response.width.to_string()),
            (PIXEL_HEIGHT_HEADER, response.height.to_string()),
            (PIXEL_DTYPE_HEADER, response.dtype.as_str().to_string()),
        ],
        response.data,
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{image_id}/{level}/{x}/{y}`
///
/// # Path Parameters
///
/// - `image_id`: Image identifier from `/images`
/// - `level`: Pyramid level (0 = highest resolution)
/// - `x`: Tile column
/// - `y`: Tile row
///
/// # Query Parameters
///
/// - `selection`: Indices for non-spatial axes (default: all zeros)
///
/// # Response
///
/// - `200 OK`: Little-endian pixels, row-major
/// - `400 Bad Request`: Invalid level, tile coordinates or selection
/// - `404 Not Found`: Image not found
/// - `500 Internal Server Error`: Store read failed
///
/// # Headers
///
/// - `Content-Type: application/octet-stream`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Pixel-Width`, `X-Pixel-Height`: Geometry of the body; edge tiles are clipped
/// - `X-Pixel-Dtype`: Element type of the body
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<PixelQueryParams>,
) -> Result<Response, TileError> {
    let request = TileRequest::new(params.image_id, params.level, params.x, params.y);
    fetch_tile(&state, request, &query).await
}

/// Handle tile requests for one cell of a plate or well grid.
///
/// # Endpoint
///
/// `GET /tiles/{image_id}/cells/{row}/{col}/{level}/{x}/{y}`
///
/// Cells have a single level, so `level` must be 0. Returns `404 Not Found`
/// when the grid has no image at `(row, col)`.
pub async fn cell_tile_handler(
    State(state): State<AppState>,
    Path(params): Path<CellTilePathParams>,
    Query(query): Query<PixelQueryParams>,
) -> Result<Response, TileError> {
    let request = TileRequest::new(params.image_id, params.level, params.x, params.y)
        .with_target(PixelTarget::Cell {
            row: params.row,
            col: params.col,
        });
    fetch_tile(&state, request, &query).await
}

/// Handle tile requests for a label image.
///
/// # Endpoint
///
/// `GET /tiles/{image_id}/labels/{name}/{level}/{x}/{y}`
///
/// Returns `404 Not Found` when the image has no label called `name`.
pub async fn label_tile_handler(
    State(state): State<AppState>,
    Path(params): Path<LabelTilePathParams>,
    Query(query): Query<PixelQueryParams>,
) -> Result<Response, TileError> {
    let request = TileRequest::new(params.image_id, params.level, params.x, params.y)
        .with_target(PixelTarget::Label(params.name));
    fetch_tile(&state, request, &query).await
}

async fn fetch_tile(
    state: &AppState,
    request: TileRequest,
    query: &PixelQueryParams,
) -> Result<Response, TileError> {
    let request = request.with_selection(query.selection()?);
    let response = state.tile_service.get_tile(request).await?;

    Ok(pixel_response(response, state.cache_max_age))
}

/// Handle raster requests.
///
/// # Endpoint
///
/// `GET /raster/{image_id}/{level}`
///
/// Same query parameters, response and headers as the tile endpoint, for the
/// full spatial extent of the level. Levels above the configured pixel limit
/// are rejected with `400 Bad Request`.
pub async fn raster_handler(
    State(state): State<AppState>,
    Path((image_id, level)): Path<(String, usize)>,
    Query(query): Query<PixelQueryParams>,
) -> Result<Response, TileError> {
    fetch_raster(&state, RasterRequest::new(image_id, level), &query).await
}

/// Handle raster requests for one cell of a plate or well grid.
///
/// # Endpoint
///
/// `GET /raster/{image_id}/cells/{row}/{col}/{level}`
pub async fn cell_raster_handler(
    State(state): State<AppState>,
    Path(params): Path<CellRasterPathParams>,
    Query(query): Query<PixelQueryParams>,
) -> Result<Response, TileError> {
    let cell = PixelTarget::Cell {
        row: params.row,
        col: params.col,
    };
    let request = RasterRequest::new(params.image_id, params.level).with_target(cell);
    fetch_raster(&state, request, &query).await
}

/// Handle raster requests for a label image.
///
/// # Endpoint
///
/// `GET /raster/{image_id}/labels/{name}/{level}`
pub async fn label_raster_handler(
    State(state): State<AppState>,
    Path(params): Path<LabelRasterPathParams>,
    Query(query): Query<PixelQueryParams>,
) -> Result<Response, TileError> {
    let request = RasterRequest::new(params.image_id, params.level)
        .with_target(PixelTarget::Label(params.name));
    fetch_raster(&state, request, &query).await
}

async fn fetch_raster(
    state: &AppState,
    request: RasterRequest,
    query: &PixelQueryParams,
) -> Result<Response, TileError> {
    let request = request.with_selection(query.selection()?);
    let response = state.tile_service.get_raster(request).await?;

    Ok(pixel_response(response, state.cache_max_age))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle image list requests.
///
/// # Endpoint
///
/// `GET /images`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "images": [
///     {"id": "sample", "source": "/data/sample.zarr", "kind": "multiscales",
///      "level_count": 3, "channel_count": 2}
///   ]
/// }
/// ```
pub async fn images_handler(State(state): State<AppState>) -> Json<ImagesResponse> {
    let images = state
        .tile_service
        .registry()
        .iter()
        .map(|image| ImageSummary::from(image.as_ref()))
        .collect();
    Json(ImagesResponse { images })
}

/// Handle image metadata requests.
///
/// # Endpoint
///
/// `GET /images/{image_id}`
///
/// # Response
///
/// `200 OK` with the image summary, axis labels, per-channel settings, the
/// geometry of every level and the grid cells and label images served
/// alongside it.
///
/// # Errors
///
/// - `404 Not Found`: Image not found
pub async fn image_metadata_handler(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<ImageMetadataResponse>, TileError> {
    let image = state.tile_service.image(&image_id)?;
    let data = &image.data;

    let channels = (0..data.channel_count())
        .map(|i| ChannelResponse {
            name: data.names.get(i).cloned().unwrap_or_default(),
            color: data.colors.get(i).cloned().unwrap_or_default(),
            visible: data.visibilities[i],
            contrast_limits: data.contrast_limits.get(i).copied().flatten(),
        })
        .collect();

    let cells = data
        .grid
        .iter()
        .flat_map(|grid| &grid.loaders)
        .map(|cell| CellResponse {
            name: cell.name.clone(),
            row: cell.row,
            col: cell.col,
            levels: vec![LevelMetadataResponse::new(0, &cell.loader)],
        })
        .collect();

    let labels = data
        .labels
        .iter()
        .map(|label| LabelResponse {
            name: label.name.clone(),
            levels: LevelMetadataResponse::for_levels(&label.loader),
        })
        .collect();

    Ok(Json(ImageMetadataResponse {
        summary: ImageSummary::from(image.as_ref()),
        axis_labels: data.axis_labels.clone(),
        channel_axis: data.channel_axis,
        dtype: data.loader.first().map(|source| source.dtype()),
        channels,
        levels: LevelMetadataResponse::for_levels(&data.loader),
        cells,
        labels,
    }))
}

/// Handle layer state requests.
///
/// # Endpoint
///
/// `GET /images/{image_id}/layer`
///
/// # Response
///
/// `200 OK` with the initial layer state: kind, per-channel selections,
/// RGB colors, contrast limits and label overlays.
pub async fn layer_handler(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<LayerState>, TileError> {
    let image = state.tile_service.image(&image_id)?;
    Ok(Json(image.layer.clone()))
}

/// Handle calibration requests.
///
/// # Endpoint
///
/// `GET /images/{image_id}/calibration?zoom={zoom}`
///
/// # Response
///
/// `200 OK` with JSON body; `pixel_size_nm` and `scale_bar` are null when
/// the pyramid carries no physical scale:
/// ```json
/// {
///   "zoom": -1.0,
///   "pixel_size_nm": 500.0,
///   "scale_bar": {"length_nm": 50000.0, "width_px": 100.0, "label": "50 µm"}
/// }
/// ```
pub async fn calibration_handler(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    Query(query): Query<CalibrationQueryParams>,
) -> Result<Json<Calibration>, TileError> {
    Ok(Json(state.tile_service.calibration(&image_id, query.zoom)?))
}

// =============================================================================
// Tests
// =============================================================================
