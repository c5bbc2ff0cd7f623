use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{NormalizedRect, RawDetection};

/// Boxes overlapping a stronger box of the same label by more than this are dropped.
const NMS_IOU: f32 = 0.45;

/// Candidates scoring below this are discarded before suppression.
const MIN_SCORE: f32 = 0.05;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single `[1, 3, H, W]` f32 input and a `[1, N, 5 + classes]` output whose
/// rows are `cx, cy, w, h, objectness, class scores...` in input pixels. Frames are
/// resized (nearest neighbour) to the model input before inference.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: Vec<String>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model and its label list (one label per line) from disk.
    pub fn new<P: AsRef<Path>>(model_path: P, labels_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let labels_path = labels_path.as_ref();
        let labels: Vec<String> = std::fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read labels from {}", labels_path.display()))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            return Err(anyhow!("label file {} is empty", labels_path.display()));
        }

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            width,
            height,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let (src_w, src_h) = (width as usize, height as usize);
        let (dst_w, dst_h) = (self.width as usize, self.height as usize);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, dst_h, dst_w),
            |(_, channel, y, x)| {
                let sx = x * src_w / dst_w;
                let sy = y * src_h / dst_h;
                pixels[(sy * src_w + sx) * 3 + channel] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = rows.shape();
        if shape.len() != 3 {
            return Err(anyhow!("unexpected output shape {:?}", shape));
        }
        let stride = shape[2];
        let flat: Vec<f32> = rows.iter().copied().collect();
        decode_rows(&flat, stride, (self.width, self.height), &self.labels)
    }
}

/// Decode flattened `cx, cy, w, h, objectness, class scores...` rows.
///
/// Coordinates are in model input pixels with a top-left origin; the returned boxes
/// are normalized with a bottom-left origin.
fn decode_rows(
    flat: &[f32],
    stride: usize,
    (input_width, input_height): (u32, u32),
    labels: &[String],
) -> Result<Vec<RawDetection>> {
    if stride < 6 || flat.len() % stride != 0 {
        return Err(anyhow!(
            "output of {} values does not split into rows of {} (need at least 6)",
            flat.len(),
            stride
        ));
    }

    let (mw, mh) = (input_width as f32, input_height as f32);
    let mut candidates: Vec<RawDetection> = Vec::new();
    for row in flat.chunks_exact(stride) {
        let objectness = row[4];
        let Some((class, class_score)) = row[5..]
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        let score = objectness * class_score;
        if !score.is_finite() || score < MIN_SCORE {
            continue;
        }
        let label = labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class_{class}"));
        let (cx, cy, w, h) = (row[0] / mw, row[1] / mh, row[2] / mw, row[3] / mh);
        candidates.push(RawDetection::new(
            label,
            score.clamp(0.0, 1.0),
            NormalizedRect::new(cx - w / 2.0, 1.0 - (cy + h / 2.0), w, h),
        ));
    }

    Ok(suppress(candidates))
}

/// Greedy per-label non-maximum suppression. Output is sorted by descending score.
fn suppress(mut candidates: Vec<RawDetection>) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.label == candidate.label && iou(&k.bbox, &candidate.bbox) > NMS_IOU);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &NormalizedRect, b: &NormalizedRect) -> f32 {
    let ix = (a.x + a.w).min(b.x + b.w) - a.x.max(b.x);
    let iy = (a.y + a.h).min(b.y + b.h) - a.y.max(b.y);
    if ix <= 0.0 || iy <= 0.0 {
        return 0.0;
    }
    let inter = ix * iy;
    inter / (a.w * a.h + b.w * b.h - inter)
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}
