//! Inference worker context.
//!
//! Frames are handed to a dedicated thread over a bounded channel. Submission never
//! blocks: when the queue is full the frame is dropped, the same way a camera drops
//! frames for a consumer that cannot keep up. The worker runs each frame through the
//! pipeline and publishes the resulting set to the latest-value slot.
//!
//! `shutdown` closes the slot immediately and waits at most `SHUTDOWN_GRACE` for the
//! thread. A detector stuck in inference is left to finish on its own; its result
//! finds the slot closed and is discarded.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::frame::{Frame, SurfaceSize};
use crate::pipeline::DetectionPipeline;
use crate::publish::{DetectionPublisher, PublishStatus, SlotCloser};

/// How long `shutdown` waits for the worker thread before detaching it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

struct Job {
    frame: Frame,
    surface: SurfaceSize,
}

/// Result of handing a frame to the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitStatus {
    Queued,
    /// The worker is busy; the frame was dropped.
    Dropped,
    /// The worker has stopped.
    Closed,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    published: AtomicU64,
    stale: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of worker counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub submitted: u64,
    /// Frames dropped because the queue was full.
    pub dropped: u64,
    pub processed: u64,
    /// Processed frames that produced no detections because of a failure.
    pub skipped: u64,
    pub published: u64,
    /// Results older than the set already shown.
    pub stale: u64,
    /// Results thrown away because the session was torn down.
    pub discarded: u64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

pub struct InferenceWorker;

impl InferenceWorker {
    /// Start the worker thread. `queue_depth` frames may wait while one is processed.
    pub fn spawn(
        pipeline: DetectionPipeline,
        publisher: DetectionPublisher,
        queue_depth: usize,
    ) -> Result<WorkerHandle> {
        let (tx, rx) = bounded(queue_depth.max(1));
        let counters = Arc::new(Counters::default());
        let cancelled = Arc::new(AtomicBool::new(false));
        let closer = publisher.closer();
        // Never sent on; disconnects when the thread exits.
        let (exited_tx, exited) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("inference-worker".into())
            .spawn({
                let counters = counters.clone();
                let cancelled = cancelled.clone();
                move || {
                    let _exited = exited_tx;
                    run(pipeline, publisher, rx, &counters, &cancelled)
                }
            })
            .context("failed to spawn inference worker")?;

        Ok(WorkerHandle {
            tx: Some(tx),
            thread: Some(thread),
            exited,
            closer,
            counters,
            cancelled,
        })
    }
}

fn run(
    mut pipeline: DetectionPipeline,
    publisher: DetectionPublisher,
    rx: Receiver<Job>,
    counters: &Counters,
    cancelled: &AtomicBool,
) {
    log::debug!(
        "inference worker started (detector={}, threshold={})",
        pipeline.detector_name(),
        pipeline.threshold()
    );

    for job in rx.iter() {
        if cancelled.load(Ordering::SeqCst) {
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let outcome = pipeline.process(job.frame, job.surface);
        counters.processed.fetch_add(1, Ordering::Relaxed);
        if outcome.skip_reason().is_some() {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
        }

        // The session may have been torn down while inference ran.
        if cancelled.load(Ordering::SeqCst) {
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let frame_sequence = outcome.frame_sequence();
        match publisher.publish(outcome.into_set()) {
            PublishStatus::Published { .. } => {
                counters.published.fetch_add(1, Ordering::Relaxed);
            }
            PublishStatus::Stale => {
                log::debug!("frame #{} result is stale, dropped", frame_sequence);
                counters.stale.fetch_add(1, Ordering::Relaxed);
            }
            PublishStatus::Closed => {
                counters.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    publisher.close();
    log::debug!("inference worker stopped");
}

/// Owner side of a running worker.
pub struct WorkerHandle {
    tx: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    exited: Receiver<()>,
    closer: SlotCloser,
    counters: Arc<Counters>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Offer a frame without blocking.
    pub fn submit(&self, frame: Frame, surface: SurfaceSize) -> SubmitStatus {
        let Some(tx) = self.tx.as_ref() else {
            return SubmitStatus::Closed;
        };
        match tx.try_send(Job { frame, surface }) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                SubmitStatus::Queued
            }
            Err(TrySendError::Full(job)) => {
                log::trace!("worker busy, frame #{} dropped", job.frame.sequence);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                SubmitStatus::Dropped
            }
            Err(TrySendError::Disconnected(_)) => SubmitStatus::Closed,
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// Process every queued frame, then stop and close the slot.
    pub fn finish(mut self) -> WorkerStats {
        self.stop(None);
        self.counters.snapshot()
    }

    /// Stop now. The slot is closed before this returns; queued frames and any
    /// in-flight result are discarded.
    ///
    /// Waits at most `SHUTDOWN_GRACE` for the thread. If inference is still running
    /// the thread is detached, and its result is counted as discarded once it lands.
    pub fn shutdown(mut self) -> WorkerStats {
        self.cancel();
        self.counters.snapshot()
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.closer.close();
        self.stop(Some(SHUTDOWN_GRACE));
    }

    fn stop(&mut self, grace: Option<Duration>) {
        self.tx.take();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if let Some(grace) = grace {
            if let Err(RecvTimeoutError::Timeout) = self.exited.recv_timeout(grace) {
                log::warn!(
                    "inference worker still busy after {:?}; detaching",
                    grace
                );
                return;
            }
        }
        if thread.join().is_err() {
            log::error!("inference worker panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
        }
    }
}
