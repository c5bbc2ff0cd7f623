use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frame::{Orientation, PixelFormat, SurfaceSize};
use crate::ingest::SourceConfig;
use crate::pipeline::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::publish::OrderingPolicy;

const DEFAULT_SOURCE_URI: &str = "stub://back_camera";
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "synthetic";
const DEFAULT_INPUT_SIZE: u32 = 416;
const DEFAULT_SURFACE_WIDTH: f32 = 390.0;
const DEFAULT_SURFACE_HEIGHT: f32 = 844.0;
const DEFAULT_QUEUE_DEPTH: usize = 1;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    surface: Option<SurfaceConfigFile>,
    confidence_threshold: Option<f32>,
    queue_depth: Option<usize>,
    ordering: Option<OrderingPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    format: Option<PixelFormat>,
    orientation: Option<Orientation>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SurfaceConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub detector: DetectorSettings,
    pub surface: SurfaceSize,
    pub confidence_threshold: f32,
    pub queue_depth: usize,
    pub ordering: OrderingPolicy,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            labels_path: None,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Infallible: every field falls back to a constant.
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    /// Load from `LIVE_DETECT_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), apply env overrides, validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            uri: source_file
                .uri
                .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            format: source_file.format.unwrap_or(PixelFormat::Rgb24),
            orientation: source_file.orientation.unwrap_or_default(),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file.model_path,
            labels_path: detector_file.labels_path,
            input_width: detector_file.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
            input_height: detector_file.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
        };

        let surface_file = file.surface.unwrap_or_default();
        let surface = SurfaceSize::new(
            surface_file.width.unwrap_or(DEFAULT_SURFACE_WIDTH),
            surface_file.height.unwrap_or(DEFAULT_SURFACE_HEIGHT),
        );

        Self {
            source,
            detector,
            surface,
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            queue_depth: file.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
            ordering: file.ordering.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("LIVE_DETECT_SOURCE_URI") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(backend) = std::env::var("LIVE_DETECT_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("LIVE_DETECT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("LIVE_DETECT_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.detector.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(threshold) = std::env::var("LIVE_DETECT_THRESHOLD") {
            self.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_THRESHOLD must be a number in [0, 1)"))?;
        }
        if let Ok(surface) = std::env::var("LIVE_DETECT_SURFACE") {
            self.surface = surface
                .parse()
                .map_err(|e| anyhow!("LIVE_DETECT_SURFACE: {}", e))?;
        }
        Ok(())
    }

    /// Check ranges. Called by `load`; call again after overriding fields by hand.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold must be in [0, 1), got {}",
                self.confidence_threshold
            ));
        }
        if self.surface.is_empty() || !self.surface.width.is_finite() || !self.surface.height.is_finite() {
            return Err(anyhow!("surface size must be positive, got {}", self.surface));
        }
        if self.queue_depth == 0 {
            return Err(anyhow!("queue depth must be at least 1"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!(
                "source resolution must be non-zero, got {}x{}",
                self.source.width,
                self.source.height
            ));
        }
        if self.detector.backend.trim().is_empty() {
            return Err(anyhow!("detector backend name must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
