//! Synthetic camera.
//!
//! Produces frames with a dark gradient background and a bright square that drifts
//! across the scene, so detectors see content that changes from frame to frame.
//! Only `stub://` URIs are accepted; any other scheme is reported as an unavailable
//! camera, which callers treat as fatal at startup.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::normalize::rgb_to_nv12;
use super::{FrameSource, SourceStats};
use crate::frame::{Frame, Orientation, PixelFormat};

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URI (e.g., "stub://back_camera").
    pub uri: String,
    /// Target frame rate. `next_frame` paces itself to this rate; 0 disables pacing.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub orientation: Orientation,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://back_camera".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
            format: PixelFormat::Rgb24,
            orientation: Orientation::Up,
        }
    }
}

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    connected: bool,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !config.uri.starts_with("stub://") {
            return Err(anyhow!(
                "camera unavailable: no capture backend for {}",
                config.uri
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera unavailable: invalid resolution {}x{}",
                config.width,
                config.height
            ));
        }
        if config.format == PixelFormat::Nv12 && (config.width % 2 != 0 || config.height % 2 != 0)
        {
            return Err(anyhow!("NV12 capture requires even dimensions"));
        }
        Ok(Self {
            config,
            frame_count: 0,
            connected: false,
            last_frame_at: None,
        })
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.config.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / self.config.target_fps as f64))
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval(), self.last_frame_at) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    /// Render the scene for the current frame count as packed RGB.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let mut pixels = vec![0u8; w * h * 3];

        let side = (w.min(h) / 4).max(1);
        let travel = w.saturating_sub(side).max(1);
        let left = (self.frame_count as usize * 4) % travel;
        let top = h.saturating_sub(side) / 2;

        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * 3;
                let inside = x >= left && x < left + side && y >= top && y < top + side;
                if inside {
                    pixels[offset..offset + 3].copy_from_slice(&[240, 220, 40]);
                } else {
                    let shade = ((x + y) * 64 / (w + h)) as u8;
                    pixels[offset..offset + 3].copy_from_slice(&[shade, shade, shade / 2]);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always available.
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{} {:?})",
            self.config.uri,
            self.config.width,
            self.config.height,
            self.config.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("source {} is not connected", self.config.uri));
        }
        self.pace();
        self.frame_count += 1;

        let rgb = self.generate_synthetic_pixels();
        let data = match self.config.format {
            PixelFormat::Rgb24 => rgb,
            PixelFormat::Nv12 => rgb_to_nv12(&rgb, self.config.width, self.config.height)?,
        };

        Ok(Frame::new(
            data,
            self.config.width,
            self.config.height,
            self.config.format,
            self.config.orientation,
            self.frame_count,
        ))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> SourceConfig {
        SourceConfig {
            uri: "stub://test".to_string(),
            target_fps: 0,
            width: 64,
            height: 48,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn synthetic_source_produces_sequenced_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!(first.width, 64);
        assert_eq!(first.height, 48);
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        first.validate()?;
        assert_eq!(source.stats().frames_captured, 2);

        Ok(())
    }

    #[test]
    fn nv12_frames_are_readable() -> Result<()> {
        let mut source = SyntheticSource::new(SourceConfig {
            format: PixelFormat::Nv12,
            ..stub_config()
        })?;
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!(frame.byte_len(), 64 * 48 * 3 / 2);
        frame.validate()?;
        Ok(())
    }

    #[test]
    fn non_stub_uri_is_an_unavailable_camera() {
        let err = SyntheticSource::new(SourceConfig {
            uri: "rtsp://10.0.0.2/stream".to_string(),
            ..stub_config()
        })
        .err()
        .expect("non-stub uri must fail");
        assert!(err.to_string().contains("camera unavailable"));
    }

    #[test]
    fn capture_requires_connect() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config())?;
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        Ok(())
    }
}
