//! Worker → slot → presentation flow across threads.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use live_detect::{
    channel, DetectionPipeline, DetectionSet, DetectorBackend, Frame, InferenceWorker,
    LazyDetector, NormalizedRect, OrderingPolicy, Orientation, PixelFormat, PresentationLoop,
    Presenter, RawDetection, ScriptedBackend, SubmitStatus, SurfaceSize,
};

fn frame(sequence: u64) -> Frame {
    Frame::new(
        vec![0u8; 2 * 2 * 3],
        2,
        2,
        PixelFormat::Rgb24,
        Orientation::Up,
        sequence,
    )
}

fn surface() -> SurfaceSize {
    SurfaceSize::new(100.0, 100.0)
}

/// Blocks inside `detect` until the test releases it.
struct GatedBackend {
    entered: mpsc::Sender<()>,
    release: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl DetectorBackend for GatedBackend {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        let _ = self.entered.send(());
        let release = self.release.lock().expect("gate lock");
        let _ = release.recv_timeout(Duration::from_secs(5));
        Ok(vec![RawDetection::new("dog", 0.9, NormalizedRect::full())])
    }
}

struct CollectingPresenter {
    seen: Arc<Mutex<Vec<DetectionSet>>>,
}

impl Presenter for CollectingPresenter {
    fn render(&mut self, set: &DetectionSet) -> Result<()> {
        self.seen.lock().expect("presenter lock").push(set.clone());
        Ok(())
    }
}

#[test]
fn frames_flow_to_presentation() -> Result<()> {
    let pipeline = DetectionPipeline::new(LazyDetector::ready(ScriptedBackend::new(vec![
        RawDetection::new("cat", 0.8, NormalizedRect::new(0.0, 0.0, 0.5, 0.5)),
        RawDetection::new("noise", 0.2, NormalizedRect::full()),
    ])));
    let (publisher, subscriber) = channel(surface(), OrderingPolicy::default());
    let worker = InferenceWorker::spawn(pipeline, publisher, 4)?;

    assert_eq!(worker.submit(frame(1), surface()), SubmitStatus::Queued);
    let stats = worker.finish();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.published, 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut presentation = PresentationLoop::new(
        subscriber,
        CollectingPresenter { seen: seen.clone() },
    );
    assert!(presentation.pump(Duration::from_secs(1))?);

    let seen = seen.lock().expect("presenter lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].frame_sequence, 1);
    let labels: Vec<&str> = seen[0].iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["cat"]);
    assert_eq!(seen[0].detections[0].caption(), "cat 80%");
    Ok(())
}

#[test]
fn busy_worker_drops_frames_instead_of_blocking() -> Result<()> {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = GatedBackend {
        entered: entered_tx,
        release: Arc::new(Mutex::new(release_rx)),
    };
    let pipeline = DetectionPipeline::new(LazyDetector::ready(backend));
    let (publisher, subscriber) = channel(surface(), OrderingPolicy::default());
    let worker = InferenceWorker::spawn(pipeline, publisher, 1)?;

    // Frame 1 is taken by the worker and blocks in the detector.
    assert_eq!(worker.submit(frame(1), surface()), SubmitStatus::Queued);
    entered_rx.recv_timeout(Duration::from_secs(5))?;

    // Frame 2 fills the queue; frame 3 has nowhere to go.
    assert_eq!(worker.submit(frame(2), surface()), SubmitStatus::Queued);
    assert_eq!(worker.submit(frame(3), surface()), SubmitStatus::Dropped);

    release_tx.send(())?;
    release_tx.send(())?;
    let stats = worker.finish();

    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.processed, 2);
    assert_eq!(subscriber.snapshot().frame_sequence, 2);
    assert!(subscriber.is_closed());
    Ok(())
}

#[test]
fn result_in_flight_at_shutdown_is_discarded() -> Result<()> {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = GatedBackend {
        entered: entered_tx,
        release: Arc::new(Mutex::new(release_rx)),
    };
    let pipeline = DetectionPipeline::new(LazyDetector::ready(backend));
    let (publisher, subscriber) = channel(surface(), OrderingPolicy::default());
    let worker = InferenceWorker::spawn(pipeline, publisher, 1)?;

    worker.submit(frame(1), surface());
    entered_rx.recv_timeout(Duration::from_secs(5))?;

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = release_tx.send(());
    });
    let stats = worker.shutdown();
    releaser.join().expect("releaser thread");

    assert_eq!(stats.published, 0);
    assert_eq!(stats.discarded, 1);
    assert_eq!(subscriber.versioned().0, 0);
    assert!(subscriber.is_closed());
    Ok(())
}

#[test]
fn shutdown_does_not_wait_for_stuck_inference() -> Result<()> {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = GatedBackend {
        entered: entered_tx,
        release: Arc::new(Mutex::new(release_rx)),
    };
    let pipeline = DetectionPipeline::new(LazyDetector::ready(backend));
    let (publisher, subscriber) = channel(surface(), OrderingPolicy::default());
    let worker = InferenceWorker::spawn(pipeline, publisher, 1)?;

    worker.submit(frame(1), surface());
    entered_rx.recv_timeout(Duration::from_secs(5))?;

    let started = Instant::now();
    let stats = worker.shutdown();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(subscriber.is_closed());
    assert_eq!(stats.published, 0);

    // The detached worker finishes later and its result goes nowhere.
    release_tx.send(())?;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(subscriber.versioned().0, 0);
    Ok(())
}

#[test]
fn failures_publish_empty_sets() -> Result<()> {
    let backend = ScriptedBackend::new(vec![RawDetection::new(
        "dog",
        0.9,
        NormalizedRect::full(),
    )])
    .then_fail("driver error");
    let pipeline = DetectionPipeline::new(LazyDetector::ready(backend));
    let (publisher, subscriber) = channel(surface(), OrderingPolicy::default());
    let worker = InferenceWorker::spawn(pipeline, publisher, 4)?;

    worker.submit(frame(1), surface());
    let malformed = Frame::new(vec![1, 2, 3], 2, 2, PixelFormat::Rgb24, Orientation::Up, 2);
    worker.submit(malformed, surface());
    worker.submit(frame(3), surface());
    let stats = worker.finish();

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.published, 3);
    let latest = subscriber.snapshot();
    assert_eq!(latest.frame_sequence, 3);
    assert_eq!(latest.len(), 1);
    Ok(())
}
