//! Frame ingestion sources.
//!
//! This module provides sources for captured frames:
//! - Synthetic camera (`stub://` URIs, demo and tests)
//! - Still image files (feature: ingest-image)
//!
//! Camera hardware access is not implemented here; platform capture layers plug in
//! by implementing `FrameSource`.
//!
//! Sources are responsible for:
//! - Assigning monotonic sequence numbers at capture time
//! - Reporting the native pixel format and orientation
//! - Rate limiting / frame decimation
//!
//! Sources MUST NOT block on the pipeline. If the inference worker is busy, the
//! caller drops the frame.

#[cfg(feature = "ingest-image")]
pub mod image_file;
pub(crate) mod normalize;
pub mod synthetic;

use anyhow::Result;

use crate::frame::Frame;

#[cfg(feature = "ingest-image")]
pub use image_file::ImageFileSource;
pub use synthetic::{SourceConfig, SyntheticSource};

/// A producer of captured frames.
pub trait FrameSource: Send {
    /// Open the device or stream. Failure here is fatal to session start.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

/// Open the source named by `config.uri`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "ingest-image")]
    if config.uri.starts_with("file://") {
        return Ok(Box::new(ImageFileSource::new(config)?));
    }
    Ok(Box::new(SyntheticSource::new(config)?))
}
