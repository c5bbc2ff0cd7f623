//! Captured frames and presentation surface dimensions.
//!
//! - `Frame`: Pixel buffer produced by a `FrameSource`, consumed once by the pipeline.
//! - `SurfaceSize`: Dimensions of the presentation surface detections are mapped onto.
//!
//! A `Frame` is handed to the pipeline by value and dropped once processed. It is
//! deliberately not `Clone`, so the same capture cannot be fed twice by accident.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::ingest::normalize::{expected_len, normalize_to_rgb};

/// Pixel layout of a frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 8-bit RGB.
    Rgb24,
    /// Y plane followed by interleaved UV at quarter resolution.
    Nv12,
}

/// Orientation metadata reported by the capture device.
///
/// Carried through for consumers; detectors receive pixels as captured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image. Ownership moves into the pipeline, which reads the pixels once.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub orientation: Orientation,

    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        orientation: Orientation,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            orientation,
            sequence,
        }
    }

    /// Raw buffer length, for diagnostics.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Check the buffer is readable: non-zero dimensions and a length matching the format.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "frame #{} has empty dimensions {}x{}",
                self.sequence,
                self.width,
                self.height
            ));
        }
        if self.data.is_empty() {
            return Err(anyhow!("frame #{} has an empty buffer", self.sequence));
        }
        let expected = expected_len(self.width, self.height, self.format)?;
        if self.data.len() != expected {
            return Err(anyhow!(
                "frame #{} {:?} length mismatch: expected {}, got {}",
                self.sequence,
                self.format,
                expected,
                self.data.len()
            ));
        }
        Ok(())
    }

    /// Packed RGB pixels for inference. Borrows when the frame is already RGB.
    pub(crate) fn rgb_pixels(&self) -> Result<Cow<'_, [u8]>> {
        self.validate()?;
        match self.format {
            PixelFormat::Rgb24 => Ok(Cow::Borrowed(&self.data)),
            PixelFormat::Nv12 => Ok(Cow::Owned(normalize_to_rgb(
                &self.data,
                self.width,
                self.height,
                self.format,
            )?)),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Buffers are large; print the length only.
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("orientation", &self.orientation)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// SurfaceSize
// ----------------------------------------------------------------------------

/// Presentation surface dimensions in display pixels. May change between frames.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
}

impl SurfaceSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for SurfaceSize {
    type Err = anyhow::Error;

    /// Parses `WIDTHxHEIGHT`, e.g. `390x844`.
    fn from_str(value: &str) -> Result<Self> {
        let (w, h) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("surface size must look like WIDTHxHEIGHT, got {value:?}"))?;
        let width: f32 = w
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid surface width {w:?}"))?;
        let height: f32 = h
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid surface height {h:?}"))?;
        let size = Self::new(width, height);
        if size.is_empty() || !width.is_finite() || !height.is_finite() {
            return Err(anyhow!("surface size must be positive, got {value:?}"));
        }
        Ok(size)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
