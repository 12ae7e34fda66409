use thiserror::Error;

/// Errors surfaced by a chunked-array store.
///
/// These stay local to a single read: one failing request never affects its
/// siblings in the same batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// No array or group exists at the given path
    #[error("Node not found: {0}")]
    NotFound(String),

    /// The caller aborted the read through its signal
    #[error("Read aborted")]
    Aborted,

    /// Selection does not fit the array
    #[error("Invalid selection for {path}: {message}")]
    InvalidSelection { path: String, message: String },

    /// Underlying read or decode failure
    #[error("Read failed for {path}: {message}")]
    Read { path: String, message: String },

    /// Node metadata could not be parsed
    #[error("Invalid metadata at {path}: {message}")]
    Metadata { path: String, message: String },

    /// The pending request was dropped before it could be answered
    #[error("Request dropped before completion")]
    Dropped,
}

/// Errors raised while opening a dataset and building its pixel sources.
///
/// All variants are fatal to loading the dataset and are never retried.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Metadata is missing required fields or is internally inconsistent
    #[error("Schema error: {0}")]
    Schema(String),

    /// Caller-supplied configuration is inconsistent with the data
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The layout is recognized but not viewable here; `url` points to a tool that can open it
    #[error("{message} ({url})")]
    Redirect { message: String, url: String },

    /// The array dtype has no renderer adaptation
    #[error("Unsupported dtype: {0}")]
    UnsupportedType(String),

    /// Store error while opening nodes or sampling data
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors returned by the tile API.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// No image is registered under this id
    #[error("Image not found: {image_id}")]
    ImageNotFound { image_id: String },

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: image has {max_levels} levels")]
    InvalidLevel { level: usize, max_levels: usize },

    /// Requested tile coordinates are outside the level
    #[error("Tile ({x}, {y}) out of bounds at level {level}")]
    TileOutOfBounds {
        level: usize,
        x: u64,
        y: u64,
        max_x: u64,
        max_y: u64,
    },

    /// The image has no grid cell at this position
    #[error("No grid cell at row {row}, column {col}")]
    CellNotFound { row: usize, col: usize },

    /// The image has no label image with this name
    #[error("Label not found: {name}")]
    LabelNotFound { name: String },

    /// The level is larger than a raster response may be
    #[error("Raster of {width}x{height} pixels exceeds the limit of {max_pixels}")]
    RasterTooLarge {
        width: u64,
        height: u64,
        max_pixels: u64,
    },

    /// Selection query parameter could not be parsed
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// The store read for this tile failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] StoreError),
}
