//! Frame-to-detections pipeline.
//!
//! `DetectionPipeline::process` runs one frame through the detector, drops results at
//! or below the confidence threshold, maps the survivors into display coordinates and
//! gives each a fresh identifier. It never fails: unreadable frames, a missing model
//! and inference errors all become a `DetectionOutcome::Skipped`, which collapses to
//! an empty `DetectionSet` for presentation.

use anyhow::Result;
use rand::RngCore;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::config::PipelineConfig;
use crate::detect::{BackendRegistry, LazyDetector, RawDetection};
use crate::frame::{Frame, SurfaceSize};
use crate::geometry::{to_display, PixelRect};

/// Detections at or below this confidence are discarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

// ----------------------------------------------------------------------------
// Output types
// ----------------------------------------------------------------------------

/// Per-frame identifier of a displayed detection. Never reused across frames.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetectionId([u8; 16]);

impl DetectionId {
    pub fn fresh() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DetectionId({})", self)
    }
}

impl Serialize for DetectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A detection placed on the presentation surface.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayDetection {
    pub id: DetectionId,
    pub label: String,
    pub confidence: f32,
    pub bbox: PixelRect,
}

impl DisplayDetection {
    /// Overlay caption, e.g. `"dog 87%"`.
    pub fn caption(&self) -> String {
        format!("{} {:.0}%", self.label, self.confidence * 100.0)
    }

    /// Same label, confidence and box; identifiers are ignored.
    pub fn same_content(&self, other: &DisplayDetection) -> bool {
        self.label == other.label && self.confidence == other.confidence && self.bbox == other.bbox
    }
}

/// Every detection for one processed frame, in detector order.
///
/// A set replaces its predecessor in whole; nothing is merged or tracked across frames.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionSet {
    pub frame_sequence: u64,
    pub surface: SurfaceSize,
    pub detections: Vec<DisplayDetection>,
}

impl DetectionSet {
    pub fn empty(frame_sequence: u64, surface: SurfaceSize) -> Self {
        Self {
            frame_sequence,
            surface,
            detections: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DisplayDetection> {
        self.detections.iter()
    }
}

/// Why a frame produced no detections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The frame buffer was empty or malformed.
    FrameUnreadable(String),
    /// The model could not be loaded; stays this way for the session.
    DetectorUnavailable(String),
    /// The model ran and failed on this frame.
    InferenceFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FrameUnreadable(e) => write!(f, "frame unreadable: {}", e),
            SkipReason::DetectorUnavailable(e) => write!(f, "detector unavailable: {}", e),
            SkipReason::InferenceFailed(e) => write!(f, "inference failed: {}", e),
        }
    }
}

/// Result of processing one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    Detected(DetectionSet),
    Skipped {
        frame_sequence: u64,
        surface: SurfaceSize,
        reason: SkipReason,
    },
}

impl DetectionOutcome {
    pub fn frame_sequence(&self) -> u64 {
        match self {
            DetectionOutcome::Detected(set) => set.frame_sequence,
            DetectionOutcome::Skipped { frame_sequence, .. } => *frame_sequence,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            DetectionOutcome::Detected(_) => None,
            DetectionOutcome::Skipped { reason, .. } => Some(reason),
        }
    }

    /// The set to present. Skipped frames present as empty.
    pub fn into_set(self) -> DetectionSet {
        match self {
            DetectionOutcome::Detected(set) => set,
            DetectionOutcome::Skipped {
                frame_sequence,
                surface,
                ..
            } => DetectionSet::empty(frame_sequence, surface),
        }
    }
}

// ----------------------------------------------------------------------------
// DetectionPipeline
// ----------------------------------------------------------------------------

pub struct DetectionPipeline {
    detector: LazyDetector,
    threshold: f32,
}

impl DetectionPipeline {
    pub fn new(detector: LazyDetector) -> Self {
        Self {
            detector,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// Pipeline for the configured backend and threshold. The model loads on first frame.
    pub fn from_config(config: &PipelineConfig, registry: &BackendRegistry) -> Result<Self> {
        let detector = registry.detector(&config.detector.backend)?;
        Ok(Self::new(detector).with_threshold(config.confidence_threshold))
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Run one frame through the detector. The frame is consumed and dropped here.
    pub fn process(&mut self, frame: Frame, surface: SurfaceSize) -> DetectionOutcome {
        let frame_sequence = frame.sequence;
        let skipped = |reason: SkipReason| {
            log::debug!("frame #{} skipped: {}", frame_sequence, reason);
            DetectionOutcome::Skipped {
                frame_sequence,
                surface,
                reason,
            }
        };

        let pixels = match frame.rgb_pixels() {
            Ok(pixels) => pixels,
            Err(e) => return skipped(SkipReason::FrameUnreadable(format!("{:#}", e))),
        };

        let backend = match self.detector.backend() {
            Ok(backend) => backend,
            Err(e) => return skipped(SkipReason::DetectorUnavailable(format!("{:#}", e))),
        };

        let raw = match backend.detect(&pixels, frame.width, frame.height) {
            Ok(raw) => raw,
            Err(e) => return skipped(SkipReason::InferenceFailed(format!("{:#}", e))),
        };

        let detections = to_display_detections(&raw, surface, self.threshold);
        log::trace!(
            "frame #{}: {} raw, {} kept",
            frame_sequence,
            raw.len(),
            detections.len()
        );
        DetectionOutcome::Detected(DetectionSet {
            frame_sequence,
            surface,
            detections,
        })
    }
}

/// Filter by confidence (strictly above `threshold`) and place on `surface`.
///
/// Detector order is preserved. Non-finite confidences or boxes are dropped.
pub fn to_display_detections(
    raw: &[RawDetection],
    surface: SurfaceSize,
    threshold: f32,
) -> Vec<DisplayDetection> {
    raw.iter()
        .filter(|d| d.confidence.is_finite() && d.confidence > threshold && d.bbox.is_finite())
        .map(|d| DisplayDetection {
            id: DetectionId::fresh(),
            label: d.label.clone(),
            confidence: d.confidence,
            bbox: to_display(&d.bbox, surface),
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{NormalizedRect, ScriptedBackend};
    use crate::frame::{Orientation, PixelFormat};
    use anyhow::anyhow;

    fn frame(sequence: u64) -> Frame {
        Frame::new(
            vec![0u8; 4 * 4 * 3],
            4,
            4,
            PixelFormat::Rgb24,
            Orientation::Up,
            sequence,
        )
    }

    fn surface() -> SurfaceSize {
        SurfaceSize::new(400.0, 800.0)
    }

    fn pipeline(backend: ScriptedBackend) -> DetectionPipeline {
        DetectionPipeline::new(LazyDetector::ready(backend))
    }

    fn raw(label: &str, confidence: f32) -> RawDetection {
        RawDetection::new(label, confidence, NormalizedRect::new(0.25, 0.5, 0.5, 0.25))
    }

    #[test]
    fn drops_detections_at_or_below_threshold() {
        let mut pipeline = pipeline(ScriptedBackend::new(vec![
            raw("low", 0.1),
            raw("edge", 0.3),
            raw("kept", 0.31),
        ]));

        let set = pipeline.process(frame(1), surface()).into_set();
        let labels: Vec<&str> = set.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["kept"]);
    }

    #[test]
    fn keeps_detector_order_and_values() {
        let mut pipeline = pipeline(ScriptedBackend::new(vec![
            raw("dog", 0.4),
            raw("cat", 0.9),
            raw("cup", 0.6),
        ]));

        let set = pipeline.process(frame(1), surface()).into_set();
        let got: Vec<(&str, f32)> = set
            .iter()
            .map(|d| (d.label.as_str(), d.confidence))
            .collect();
        assert_eq!(got, vec![("dog", 0.4), ("cat", 0.9), ("cup", 0.6)]);
        assert_eq!(set.detections[0].bbox, PixelRect::new(100.0, 200.0, 200.0, 200.0));
    }

    #[test]
    fn ids_are_fresh_each_frame() {
        let mut pipeline = pipeline(ScriptedBackend::new(vec![raw("dog", 0.8), raw("dog", 0.8)]));

        let first = pipeline.process(frame(1), surface()).into_set();
        let second = pipeline.process(frame(2), surface()).into_set();

        assert_ne!(first.detections[0].id, first.detections[1].id);
        assert_ne!(first.detections[0].id, second.detections[0].id);
        assert!(first.detections[0].same_content(&second.detections[0]));
    }

    #[test]
    fn unreadable_frame_is_skipped() {
        let mut pipeline = pipeline(ScriptedBackend::new(vec![raw("dog", 0.8)]));
        let broken = Frame::new(Vec::new(), 4, 4, PixelFormat::Rgb24, Orientation::Up, 9);

        let outcome = pipeline.process(broken, surface());
        assert!(matches!(
            outcome.skip_reason(),
            Some(SkipReason::FrameUnreadable(_))
        ));
        let set = outcome.into_set();
        assert!(set.is_empty());
        assert_eq!(set.frame_sequence, 9);
    }

    #[test]
    fn inference_failure_is_skipped_then_recovers() {
        let mut pipeline = pipeline(
            ScriptedBackend::new(vec![raw("dog", 0.8)]).then_fail("gpu reset"),
        );

        let failed = pipeline.process(frame(1), surface());
        assert!(matches!(
            failed.skip_reason(),
            Some(SkipReason::InferenceFailed(_))
        ));
        assert!(failed.into_set().is_empty());

        let recovered = pipeline.process(frame(2), surface()).into_set();
        assert_eq!(recovered.len(), 1);
    }

    #[test]
    fn missing_model_skips_every_frame() {
        let mut pipeline = DetectionPipeline::new(LazyDetector::deferred(
            "coreml",
            Box::new(|| Err(anyhow!("model not bundled"))),
        ));

        for seq in 1..=3 {
            let outcome = pipeline.process(frame(seq), surface());
            assert!(matches!(
                outcome.skip_reason(),
                Some(SkipReason::DetectorUnavailable(_))
            ));
            assert!(outcome.into_set().is_empty());
        }
    }

    #[test]
    fn non_finite_confidence_is_dropped() {
        let mut pipeline = pipeline(ScriptedBackend::new(vec![raw("nan", f32::NAN)]));
        assert!(pipeline.process(frame(1), surface()).into_set().is_empty());
    }

    #[test]
    fn custom_threshold_applies() {
        let mut pipeline = pipeline(ScriptedBackend::new(vec![raw("dog", 0.4)])).with_threshold(0.5);
        assert_eq!(pipeline.threshold(), 0.5);
        assert!(pipeline.process(frame(1), surface()).into_set().is_empty());
    }

    #[test]
    fn caption_rounds_confidence_to_percent() {
        let detection = DisplayDetection {
            id: DetectionId::fresh(),
            label: "dog".to_string(),
            confidence: 0.876,
            bbox: PixelRect::new(0.0, 0.0, 1.0, 1.0),
        };
        assert_eq!(detection.caption(), "dog 88%");
        assert_eq!(detection.id.to_string().len(), 32);
    }
}
