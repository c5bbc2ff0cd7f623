//! live-detect - run the detection pipeline against a frame source
//!
//! This binary:
//! 1. Loads configuration (file from --config or LIVE_DETECT_CONFIG, env overrides, flags)
//! 2. Opens the frame source (failure here is fatal)
//! 3. Captures frames on a capture thread and offers them to the inference worker
//! 4. Renders every newly published detection set on the main thread

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use live_detect::{
    channel, open_source, BackendRegistry, ConsolePresenter, DetectionPipeline,
    DetectionSubscriber, FrameSource, InferenceWorker, JsonPresenter, PipelineConfig,
    PresentationLoop, Presenter, SubmitStatus, SurfaceSize, WorkerHandle, WorkerStats,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (.json or .toml).
    #[arg(long, env = "LIVE_DETECT_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many captured frames (0 runs until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    frames: u64,
    /// Detector backend name.
    #[arg(long)]
    backend: Option<String>,
    /// Presentation surface size, e.g. 390x844.
    #[arg(long)]
    surface: Option<SurfaceSize>,
    /// Confidence threshold; detections at or below it are dropped.
    #[arg(long)]
    threshold: Option<f32>,
    /// Print each detection set as a JSON line on stdout.
    #[arg(long)]
    json: bool,
    /// List detector backends in this build and exit.
    #[arg(long)]
    list_backends: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut cfg = PipelineConfig::load_from(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        cfg.detector.backend = backend;
    }
    if let Some(surface) = args.surface {
        cfg.surface = surface;
    }
    if let Some(threshold) = args.threshold {
        cfg.confidence_threshold = threshold;
    }
    cfg.validate()?;

    let registry = BackendRegistry::with_builtins(&cfg.detector);
    if args.list_backends {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut source = open_source(cfg.source.clone())?;
    source
        .connect()
        .with_context(|| format!("failed to start capture from {}", cfg.source.uri))?;

    let pipeline = DetectionPipeline::from_config(&cfg, &registry)?;
    let (publisher, subscriber) = channel(cfg.surface, cfg.ordering);
    let worker = InferenceWorker::spawn(pipeline, publisher, cfg.queue_depth)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    log::info!(
        "live-detect running: source={} backend={} threshold={} surface={}",
        cfg.source.uri,
        cfg.detector.backend,
        cfg.confidence_threshold,
        cfg.surface
    );

    let capture = thread::Builder::new()
        .name("capture".into())
        .spawn({
            let stop = stop.clone();
            let surface = cfg.surface;
            let limit = args.frames;
            move || capture_loop(source, worker, surface, limit, &stop)
        })
        .context("failed to spawn capture thread")?;

    if args.json {
        present(subscriber, JsonPresenter::new(std::io::stdout().lock()), &stop)?;
    } else {
        present(subscriber, ConsolePresenter::new(), &stop)?;
    }

    stop.store(true, Ordering::SeqCst);
    let stats = capture
        .join()
        .map_err(|_| anyhow::anyhow!("capture thread panicked"))?;
    log::info!(
        "done: submitted={} dropped={} processed={} skipped={} published={} stale={} discarded={}",
        stats.submitted,
        stats.dropped,
        stats.processed,
        stats.skipped,
        stats.published,
        stats.stale,
        stats.discarded
    );
    Ok(())
}

fn present<P: Presenter>(subscriber: DetectionSubscriber, presenter: P, stop: &AtomicBool) -> Result<()> {
    PresentationLoop::new(subscriber, presenter).run_until(stop)
}

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    worker: WorkerHandle,
    surface: SurfaceSize,
    limit: u64,
    stop: &AtomicBool,
) -> WorkerStats {
    let mut captured = 0u64;
    let mut last_health_log = Instant::now();

    while !stop.load(Ordering::SeqCst) && (limit == 0 || captured < limit) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("capture failed: {:#}", e);
                if !source.is_healthy() {
                    break;
                }
                continue;
            }
        };
        captured += 1;

        if worker.submit(frame, surface) == SubmitStatus::Closed {
            log::warn!("inference worker stopped; ending capture");
            break;
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            let worker_stats = worker.stats();
            log::info!(
                "source health={} frames={} uri={} dropped={} published={}",
                source.is_healthy(),
                stats.frames_captured,
                stats.uri,
                worker_stats.dropped,
                worker_stats.published
            );
            last_health_log = Instant::now();
        }
    }

    if stop.load(Ordering::SeqCst) {
        worker.shutdown()
    } else {
        worker.finish()
    }
}
