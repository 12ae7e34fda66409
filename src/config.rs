//! Configuration management for NGFF Streamer.
//!
//! This module provides:
//! - Command-line arguments via clap (`serve` and `inspect` subcommands)
//! - Environment variables with `NGFF_` prefix
//! - Image configuration files (JSON, one object or an array of objects)
//!
//! # Environment Variables
//!
//! - `NGFF_HOST` - Server bind address (default: 0.0.0.0)
//! - `NGFF_PORT` - Server port (default: 3000)
//! - `NGFF_SOURCES` - Comma-separated dataset paths or query strings
//! - `NGFF_IMAGE_CONFIG` - Path to a JSON file of image configurations
//! - `NGFF_FRAME_INTERVAL_MS` - Batch flush period; unset flushes on the next tick
//! - `NGFF_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `NGFF_CORS_ORIGINS` - Allowed CORS origins (comma-separated)
//! - `NGFF_MAX_RASTER_PIXELS` - Largest raster served in one response (default: 16777216)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::dataset::ImageConfig;
use crate::pixel::{FrameInterval, FrameScheduler, NextTick};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default raster size limit in pixels (4096 x 4096).
pub const DEFAULT_MAX_RASTER_PIXELS: u64 = crate::tile::DEFAULT_MAX_RASTER_PIXELS;

// =============================================================================
// CLI Arguments
// =============================================================================

/// NGFF Streamer - tiled pixel access for OME-NGFF / Zarr pyramids.
#[derive(Parser, Debug, Clone)]
#[command(name = "ngff-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load datasets and serve their tiles over HTTP.
    Serve(ServeConfig),

    /// Print how a dataset is classified and loaded.
    Inspect(InspectConfig),
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "NGFF_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "NGFF_PORT")]
    pub port: u16,

    // =========================================================================
    // Dataset Configuration
    // =========================================================================
    /// Datasets to serve: filesystem paths, or query strings such as
    /// `source=/data/img.zarr&channel_axis=1`.
    #[arg(env = "NGFF_SOURCES", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// JSON file holding one image configuration or an array of them.
    #[arg(long, env = "NGFF_IMAGE_CONFIG")]
    pub image_config: Option<PathBuf>,

    /// Flush batched reads once per this many milliseconds.
    ///
    /// If not specified, queued reads flush on the next scheduler tick.
    #[arg(long, env = "NGFF_FRAME_INTERVAL_MS")]
    pub frame_interval_ms: Option<u64>,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "NGFF_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Largest raster, in pixels (width x height), served by `/raster`.
    #[arg(long, default_value_t = DEFAULT_MAX_RASTER_PIXELS, env = "NGFF_MAX_RASTER_PIXELS")]
    pub max_raster_pixels: u64,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "NGFF_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.sources.is_empty() && self.image_config.is_none() {
            return Err(
                "No datasets given. Pass one or more sources, or set --image-config or NGFF_IMAGE_CONFIG"
                    .to_string(),
            );
        }

        if self.frame_interval_ms == Some(0) {
            return Err("frame_interval_ms must be greater than 0".to_string());
        }

        if self.max_raster_pixels == 0 {
            return Err("max_raster_pixels must be greater than 0".to_string());
        }

        if let Some(path) = &self.image_config {
            if !path.is_file() {
                return Err(format!("Image config file not found: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The scheduler every pixel source flushes through.
    pub fn scheduler(&self) -> Arc<dyn FrameScheduler> {
        match self.frame_interval_ms {
            Some(ms) => Arc::new(FrameInterval::new(Duration::from_millis(ms))),
            None => Arc::new(NextTick),
        }
    }

    /// Image configurations from the config file followed by the sources.
    pub fn image_configs(&self) -> Result<Vec<ImageConfig>, String> {
        let mut configs = match &self.image_config {
            Some(path) => read_image_configs(path)?,
            None => Vec::new(),
        };
        for source in &self.sources {
            configs.push(parse_source(source)?);
        }
        Ok(configs)
    }
}

/// Options for the `inspect` command.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Dataset path, or a query string with a `source` key.
    pub source: String,

    /// Print the loaded layer state as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    pub fn image_config(&self) -> Result<ImageConfig, String> {
        parse_source(&self.source)
    }
}

// =============================================================================
// Image Configuration Files
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageConfigFile {
    Many(Vec<ImageConfig>),
    One(ImageConfig),
}

/// Parse a JSON document holding one image configuration or an array of them.
pub fn parse_image_configs(json: &str) -> Result<Vec<ImageConfig>, String> {
    let file: ImageConfigFile =
        serde_json::from_str(json).map_err(|e| format!("invalid image config: {}", e))?;
    Ok(match file {
        ImageConfigFile::Many(configs) => configs,
        ImageConfigFile::One(config) => vec![config],
    })
}

fn read_image_configs(path: &Path) -> Result<Vec<ImageConfig>, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse_image_configs(&json).map_err(|e| format!("{}: {}", path.display(), e))
}

/// A plain path, or a query string when it contains `source=`.
fn parse_source(source: &str) -> Result<ImageConfig, String> {
    if source.contains("source=") {
        ImageConfig::from_query(source)
    } else {
        Ok(ImageConfig::new(source))
    }
}

// =============================================================================
// Tests
// =============================================================================
