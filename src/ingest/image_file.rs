//! Still image source.
//!
//! Replays a local JPEG/PNG file, or every image in a local directory in name order,
//! as a looping frame stream. Useful for checking a model against known pictures.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{Frame, PixelFormat};

pub struct ImageFileSource {
    config: SourceConfig,
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
}

impl ImageFileSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let path = config
            .uri
            .strip_prefix("file://")
            .ok_or_else(|| anyhow!("image source requires a file:// uri"))?;
        let paths = collect_images(Path::new(path))?;
        Ok(Self {
            config,
            paths,
            cursor: 0,
            frame_count: 0,
        })
    }
}

impl FrameSource for ImageFileSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "ImageFileSource: {} image(s) from {}",
            self.paths.len(),
            self.config.uri
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let path = &self.paths[self.cursor % self.paths.len()];
        self.cursor = self.cursor.wrapping_add(1);
        self.frame_count += 1;

        let image =
            image::open(path).with_context(|| format!("decode image {}", path.display()))?;
        let (width, height) = image.dimensions();
        let rgb = image.into_rgb8();

        Ok(Frame::new(
            rgb.into_raw(),
            width,
            height,
            PixelFormat::Rgb24,
            self.config.orientation,
            self.frame_count,
        ))
    }

    fn is_healthy(&self) -> bool {
        !self.paths.is_empty()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.uri.clone(),
        }
    }
}

fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("camera unavailable: cannot read {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png")
                })
        })
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(anyhow!(
            "camera unavailable: no images found in {}",
            path.display()
        ));
    }
    Ok(paths)
}
