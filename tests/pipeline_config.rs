use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use live_detect::{OrderingPolicy, PipelineConfig, PixelFormat, SurfaceSize};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVE_DETECT_CONFIG",
        "LIVE_DETECT_SOURCE_URI",
        "LIVE_DETECT_BACKEND",
        "LIVE_DETECT_MODEL_PATH",
        "LIVE_DETECT_LABELS_PATH",
        "LIVE_DETECT_THRESHOLD",
        "LIVE_DETECT_SURFACE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "uri": "stub://front_camera",
            "target_fps": 15,
            "width": 320,
            "height": 240,
            "format": "nv12"
        },
        "detector": {
            "backend": "tract",
            "model_path": "/models/yolo.onnx",
            "input_width": 320,
            "input_height": 320
        },
        "surface": { "width": 1170, "height": 2532 },
        "confidence_threshold": 0.45,
        "queue_depth": 2,
        "ordering": "latest_publish_wins"
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_BACKEND", "synthetic");
    std::env::set_var("LIVE_DETECT_SURFACE", "844x390");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.source.uri, "stub://front_camera");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
    assert_eq!(cfg.source.format, PixelFormat::Nv12);
    assert_eq!(cfg.detector.backend, "synthetic");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/yolo.onnx"))
    );
    assert_eq!(cfg.detector.input_width, 320);
    assert_eq!(cfg.surface, SurfaceSize::new(844.0, 390.0));
    assert_eq!(cfg.confidence_threshold, 0.45);
    assert_eq!(cfg.queue_depth, 2);
    assert_eq!(cfg.ordering, OrderingPolicy::LatestPublishWins);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        confidence_threshold = 0.5

        [source]
        uri = "stub://dock"

        [surface]
        width = 640.0
        height = 480.0
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = PipelineConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.source.uri, "stub://dock");
    assert_eq!(cfg.confidence_threshold, 0.5);
    assert_eq!(cfg.surface, SurfaceSize::new(640.0, 480.0));
    assert_eq!(cfg.detector.backend, "synthetic");

    clear_env();
}

#[test]
fn invalid_threshold_from_env_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_THRESHOLD", "1.5");
    assert!(PipelineConfig::load().is_err());

    std::env::set_var("LIVE_DETECT_THRESHOLD", "high");
    assert!(PipelineConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = PipelineConfig::load_from(Some(std::path::Path::new("/nonexistent/live.json")))
        .expect_err("missing file must fail");
    assert!(err.to_string().contains("failed to read config file"));
}
