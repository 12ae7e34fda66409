//! Pixel sources: tile and raster reads over one pyramid level.
//!
//! A [`PixelSource`] turns viewer requests into store selections through
//! [`build_selection`], queues them on its [`RequestBatcher`], and adapts the
//! returned elements into renderer buffers with a [`DtypeAdapter`].

pub mod batch;
mod dtype;
pub mod selection;
mod source;

pub use batch::{
    BatchStats, FrameInterval, FrameScheduler, ManualScheduler, NextTick, PendingPixels,
    PixelData, RequestBatcher, DEFAULT_FRAME_INTERVAL,
};
pub use dtype::{DtypeAdapter, PixelBuffer, PixelDtype};
pub use selection::{build_selection, BaseSelection, RGBA_CHANNEL_AXIS};
pub use source::{PixelSource, PixelSourceOptions};
