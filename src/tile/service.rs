//! Tile Service for serving raw pixel tiles.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TileService                          │
//! │   get_tile() / get_raster()                                 │
//! │     1. Look up image,       3. Queue read on PixelSource    │
//! │        cell or label        4. Encode little-endian bytes   │
//! │     2. Validate level/tile                                  │
//! └──────────────┬───────────────────────────┬──────────────────┘
//!                ▼                           ▼
//!        ┌───────────────┐          ┌─────────────────┐
//!        │ ImageRegistry │          │   PixelSource   │
//!        └───────────────┘          │ (batched reads) │
//!                                   └─────────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::error::TileError;
use crate::ome::{resolve_current_pixel_size, ScaleBar, DEFAULT_SCALE_BAR_WIDTH};
use crate::pixel::{BaseSelection, PixelData, PixelDtype, PixelSource};

use super::registry::{ImageRegistry, LoadedImage};

// =============================================================================
// Requests and Responses
// =============================================================================

/// Default cap on the pixel count of one raster response (4096 x 4096).
pub const DEFAULT_MAX_RASTER_PIXELS: u64 = 4096 * 4096;

/// Which pyramid of an image a request reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PixelTarget {
    /// The image's own levels
    #[default]
    Image,

    /// One cell of a plate or well grid; cells have a single level
    Cell { row: usize, col: usize },

    /// A label image, by name
    Label(String),
}

/// A request for one tile.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub image_id: String,

    pub target: PixelTarget,

    /// Pyramid level (0 = highest resolution)
    pub level: usize,

    /// Tile column
    pub x: u64,

    /// Tile row
    pub y: u64,

    /// Indices for the non-spatial axes
    pub selection: BaseSelection,
}

impl TileRequest {
    pub fn new(image_id: impl Into<String>, level: usize, x: u64, y: u64) -> Self {
        Self {
            image_id: image_id.into(),
            target: PixelTarget::Image,
            level,
            x,
            y,
            selection: BaseSelection::default(),
        }
    }

    pub fn with_target(mut self, target: PixelTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_selection(mut self, selection: BaseSelection) -> Self {
        self.selection = selection;
        self
    }
}

/// A request for the full spatial extent of one level.
#[derive(Debug, Clone)]
pub struct RasterRequest {
    pub image_id: String,
    pub target: PixelTarget,
    pub level: usize,
    pub selection: BaseSelection,
}

impl RasterRequest {
    pub fn new(image_id: impl Into<String>, level: usize) -> Self {
        Self {
            image_id: image_id.into(),
            target: PixelTarget::Image,
            level,
            selection: BaseSelection::default(),
        }
    }

    pub fn with_target(mut self, target: PixelTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_selection(mut self, selection: BaseSelection) -> Self {
        self.selection = selection;
        self
    }
}

/// Raw pixels with their geometry.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Little-endian element bytes, row-major
    pub data: Bytes,
    pub width: u64,
    pub height: u64,
    pub dtype: PixelDtype,
}

impl From<PixelData> for TileResponse {
    fn from(pixels: PixelData) -> Self {
        Self {
            dtype: pixels.data.dtype(),
            data: pixels.data.to_le_bytes(),
            width: pixels.width,
            height: pixels.height,
        }
    }
}

/// Physical calibration at a zoom level.
#[derive(Debug, Clone, Serialize)]
pub struct Calibration {
    pub zoom: f64,

    /// Nanometers per screen pixel, when the pyramid is calibrated
    pub pixel_size_nm: Option<f64>,

    pub scale_bar: Option<ScaleBar>,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Validates requests against the registry and forwards them to pixel sources.
#[derive(Debug, Clone)]
pub struct TileService {
    registry: Arc<ImageRegistry>,
    max_raster_pixels: u64,
}

impl TileService {
    pub fn new(registry: ImageRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            max_raster_pixels: DEFAULT_MAX_RASTER_PIXELS,
        }
    }

    /// Cap the pixel count (width x height) of raster responses.
    pub fn with_max_raster_pixels(mut self, max_pixels: u64) -> Self {
        self.max_raster_pixels = max_pixels;
        self
    }

    pub fn max_raster_pixels(&self) -> u64 {
        self.max_raster_pixels
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    pub fn image(&self, image_id: &str) -> Result<&Arc<LoadedImage>, TileError> {
        self.registry
            .get(image_id)
            .ok_or_else(|| TileError::ImageNotFound {
                image_id: image_id.to_string(),
            })
    }

    /// Levels of the image, grid cell or label addressed by `target`.
    pub fn levels(
        &self,
        image_id: &str,
        target: &PixelTarget,
    ) -> Result<&[PixelSource], TileError> {
        let image = self.image(image_id)?;
        match target {
            PixelTarget::Image => Ok(&image.data.loader),
            PixelTarget::Cell { row, col } => image
                .cell(*row, *col)
                .map(|cell| std::slice::from_ref(&cell.loader))
                .ok_or(TileError::CellNotFound {
                    row: *row,
                    col: *col,
                }),
            PixelTarget::Label(name) => image
                .label(name)
                .map(|label| label.loader.as_slice())
                .ok_or_else(|| TileError::LabelNotFound { name: name.clone() }),
        }
    }

    fn level(
        &self,
        image_id: &str,
        target: &PixelTarget,
        level: usize,
    ) -> Result<&PixelSource, TileError> {
        let levels = self.levels(image_id, target)?;
        levels.get(level).ok_or(TileError::InvalidLevel {
            level,
            max_levels: levels.len(),
        })
    }

    /// Fetch one tile.
    ///
    /// Edge tiles are clipped to the level extent, so their width or height
    /// may be smaller than the tile size.
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let source = self.level(&request.image_id, &request.target, request.level)?;

        let (max_x, max_y) = source.tile_count();
        if request.x >= max_x || request.y >= max_y {
            return Err(TileError::TileOutOfBounds {
                level: request.level,
                x: request.x,
                y: request.y,
                max_x,
                max_y,
            });
        }

        let pixels = source
            .get_tile(request.x, request.y, &request.selection, None)
            .await
            .inspect_err(|e| source.on_tile_error(e))?;
        Ok(pixels.into())
    }

    /// Fetch the full spatial extent of a level.
    ///
    /// Levels with more than `max_raster_pixels` pixels are rejected before
    /// anything is read.
    pub async fn get_raster(&self, request: RasterRequest) -> Result<TileResponse, TileError> {
        let source = self.level(&request.image_id, &request.target, request.level)?;

        let (width, height) = (source.width(), source.height());
        if width.saturating_mul(height) > self.max_raster_pixels {
            return Err(TileError::RasterTooLarge {
                width,
                height,
                max_pixels: self.max_raster_pixels,
            });
        }

        let pixels = source.get_raster(&request.selection, None).await?;
        Ok(pixels.into())
    }

    /// Pixel size and scale bar at `zoom` (0 = full resolution, -1 = half).
    pub fn calibration(&self, image_id: &str, zoom: f64) -> Result<Calibration, TileError> {
        let image = self.image(image_id)?;
        let pixel_size_nm = image
            .level(0)
            .and_then(PixelSource::multiscales)
            .and_then(|ms| resolve_current_pixel_size(ms, zoom));
        let scale_bar =
            pixel_size_nm.and_then(|nm| ScaleBar::for_pixel_size(nm, DEFAULT_SCALE_BAR_WIDTH));

        Ok(Calibration {
            zoom,
            pixel_size_nm,
            scale_bar,
        })
    }
}
