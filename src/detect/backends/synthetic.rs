use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{NormalizedRect, RawDetection};

const LABELS: &[&str] = &[
    "person", "bicycle", "car", "dog", "cat", "bottle", "cup", "chair", "laptop", "banana",
];

/// Luma above which a pixel counts as foreground.
const FOREGROUND_LUMA: f32 = 180.0;

/// Deterministic CPU backend for demos and tests.
///
/// Reports the bounding box of bright foreground pixels as one object, labelled from a
/// digest of its average colour, plus one low-confidence "clutter" box derived from a
/// digest of the whole frame. Output depends only on the pixels, so identical frames
/// yield identical detections.
#[derive(Default)]
pub struct SyntheticBackend;

impl SyntheticBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 || pixels.len() != w * h * 3 {
            return Err(anyhow!(
                "expected {}x{} RGB frame, received {} bytes",
                width,
                height,
                pixels.len()
            ));
        }

        let mut detections = Vec::with_capacity(2);
        if let Some(object) = foreground_object(pixels, w, h) {
            detections.push(object);
        }
        detections.push(clutter(pixels));
        Ok(detections)
    }
}

fn foreground_object(pixels: &[u8], w: usize, h: usize) -> Option<RawDetection> {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
    let mut count = 0usize;
    let mut color_sum = [0u64; 3];

    for (i, px) in pixels.chunks_exact(3).enumerate() {
        let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
        if luma < FOREGROUND_LUMA {
            continue;
        }
        let (x, y) = (i % w, i / w);
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
        count += 1;
        for (sum, &c) in color_sum.iter_mut().zip(px) {
            *sum += c as u64;
        }
    }

    if count == 0 {
        return None;
    }

    let box_w = max_x - min_x + 1;
    let box_h = max_y - min_y + 1;
    let coverage = count as f32 / (box_w * box_h) as f32;

    // Quantize so small shading changes keep the same label.
    let avg: Vec<u8> = color_sum
        .iter()
        .map(|sum| ((*sum / count as u64) as u8) & 0xE0)
        .collect();
    let digest = Sha256::digest(&avg);
    let label = LABELS[digest[0] as usize % LABELS.len()];

    // Pixel rows count down from the top; model boxes count up from the bottom.
    let bbox = NormalizedRect::new(
        min_x as f32 / w as f32,
        1.0 - (max_y + 1) as f32 / h as f32,
        box_w as f32 / w as f32,
        box_h as f32 / h as f32,
    );
    Some(RawDetection::new(
        label,
        (0.55 + 0.4 * coverage).min(0.99),
        bbox,
    ))
}

/// Background noise the way real models emit it: always at or below 0.3 confidence.
fn clutter(pixels: &[u8]) -> RawDetection {
    let digest = Sha256::digest(pixels);
    let unit = |b: u8| b as f32 / 255.0;
    let w = 0.1 + 0.4 * unit(digest[2]);
    let h = 0.1 + 0.4 * unit(digest[3]);
    RawDetection::new(
        "clutter",
        0.3 * unit(digest[1]),
        NormalizedRect::new(
            (1.0 - w) * unit(digest[4]),
            (1.0 - h) * unit(digest[5]),
            w,
            h,
        ),
    )
}
