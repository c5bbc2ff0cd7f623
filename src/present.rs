//! Presentation context.
//!
//! A `PresentationLoop` lives on the thread that owns the display surface. It pulls
//! new sets from the latest-value slot and hands them to a `Presenter`, so rendering
//! only ever happens on that one thread regardless of where inference ran.

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::pipeline::DetectionSet;
use crate::publish::DetectionSubscriber;

/// Renders detection overlays.
pub trait Presenter {
    /// Replace whatever is on screen with `set`.
    fn render(&mut self, set: &DetectionSet) -> Result<()>;
}

/// Logs one line per overlay: caption and box.
#[derive(Default)]
pub struct ConsolePresenter {
    rendered: u64,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for ConsolePresenter {
    fn render(&mut self, set: &DetectionSet) -> Result<()> {
        self.rendered += 1;
        if set.is_empty() {
            log::debug!("frame #{}: no overlays", set.frame_sequence);
            return Ok(());
        }
        for detection in set.iter() {
            let b = detection.bbox;
            log::info!(
                "frame #{} [{}] {} at ({:.0},{:.0}) {:.0}x{:.0}",
                set.frame_sequence,
                detection.id,
                detection.caption(),
                b.x,
                b.y,
                b.width,
                b.height
            );
        }
        Ok(())
    }
}

/// Writes each set as one line of JSON.
pub struct JsonPresenter<W: Write> {
    out: W,
}

impl<W: Write> JsonPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for JsonPresenter<W> {
    fn render(&mut self, set: &DetectionSet) -> Result<()> {
        serde_json::to_writer(&mut self.out, set).context("serialize detection set")?;
        self.out.write_all(b"\n").context("write detection set")?;
        Ok(())
    }
}

/// Drives a presenter from the latest-value slot.
pub struct PresentationLoop<P: Presenter> {
    subscriber: DetectionSubscriber,
    presenter: P,
    seen: u64,
}

impl<P: Presenter> PresentationLoop<P> {
    pub fn new(subscriber: DetectionSubscriber, presenter: P) -> Self {
        Self {
            subscriber,
            presenter,
            seen: 0,
        }
    }

    /// Render the newest set if one arrived within `timeout`. Returns true if rendered.
    ///
    /// Intermediate sets published while the presenter was busy are skipped.
    pub fn pump(&mut self, timeout: Duration) -> Result<bool> {
        let Some((version, set)) = self.subscriber.wait_newer(self.seen, timeout) else {
            return Ok(false);
        };
        self.seen = version;
        self.presenter.render(&set)?;
        Ok(true)
    }

    /// Render until `stop` is set or the slot closes.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::SeqCst) {
            if !self.pump(Duration::from_millis(100))? && self.subscriber.is_closed() {
                break;
            }
        }
        Ok(())
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }
}
