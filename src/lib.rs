//! live-detect
//!
//! Real-time detection pipeline: frames come in from a camera-like source, run through
//! a pluggable detector, and the latest set of on-screen detections is published to a
//! presentation context.
//!
//! # Architecture
//!
//! ```text
//! FrameSource ──try_send──▶ InferenceWorker ──publish──▶ latest-value slot ──▶ PresentationLoop
//!   (capture)               (DetectionPipeline)          (Arc swap)            (Presenter)
//! ```
//!
//! - Frames are consumed exactly once and never retained.
//! - Detections at or below the confidence threshold (0.3) are discarded.
//! - Boxes are mapped from normalized bottom-left model space to top-left display pixels.
//! - Each published set replaces the previous one in whole; identifiers are fresh per frame.
//! - Per-frame failures (bad buffer, missing model, inference error) yield an empty set.
//!
//! # Module Structure
//!
//! - `frame`: Captured frames and surface dimensions
//! - `ingest`: Frame sources (synthetic camera, still images)
//! - `detect`: Detector backends, registry, deferred model loading
//! - `geometry`: Model → display coordinate mapping
//! - `pipeline`: Per-frame processing and output types
//! - `publish`: Latest-value slot shared with the presentation context
//! - `worker`: Inference thread with drop-on-busy frame queue
//! - `present`: Presenters and the presentation loop
//! - `config`: File + environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod pipeline;
pub mod present;
pub mod publish;
pub mod worker;

pub use config::{DetectorSettings, PipelineConfig};
pub use detect::{
    BackendRegistry, DetectorBackend, LazyDetector, NormalizedRect, RawDetection,
    ScriptedBackend, SyntheticBackend,
};
pub use frame::{Frame, Orientation, PixelFormat, SurfaceSize};
pub use geometry::{to_display, PixelRect};
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats, SyntheticSource};
pub use pipeline::{
    DetectionId, DetectionOutcome, DetectionPipeline, DetectionSet, DisplayDetection,
    SkipReason, DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use present::{ConsolePresenter, JsonPresenter, PresentationLoop, Presenter};
pub use publish::{
    channel, DetectionPublisher, DetectionSubscriber, OrderingPolicy, PublishStatus,
    SlotCloser,
};
pub use worker::{InferenceWorker, SubmitStatus, WorkerHandle, WorkerStats, SHUTDOWN_GRACE};
