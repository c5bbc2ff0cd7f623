use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

#[derive(Clone, Debug)]
enum Step {
    Detections(Vec<RawDetection>),
    Fail(String),
}

/// Backend that replays canned results. Used by tests and integration harnesses.
///
/// Queued steps are consumed one per frame; once the queue is empty every frame gets
/// the fallback result.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    queue: VecDeque<Step>,
    fallback: Step,
    warm_up_failure: Option<String>,
    calls: u64,
}

impl ScriptedBackend {
    /// Always return `detections`.
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: Step::Detections(detections),
            warm_up_failure: None,
            calls: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Fail every inference with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fallback: Step::Fail(reason.into()),
            ..Self::empty()
        }
    }

    /// Queue a result for the next unscripted frame.
    pub fn then(mut self, detections: Vec<RawDetection>) -> Self {
        self.queue.push_back(Step::Detections(detections));
        self
    }

    /// Queue a failure for the next unscripted frame.
    pub fn then_fail(mut self, reason: impl Into<String>) -> Self {
        self.queue.push_back(Step::Fail(reason.into()));
        self
    }

    pub fn with_warm_up_failure(mut self, reason: impl Into<String>) -> Self {
        self.warm_up_failure = Some(reason.into());
        self
    }

    /// Number of `detect` calls served.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        let step = self
            .queue
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Detections(detections) => Ok(detections),
            Step::Fail(reason) => Err(anyhow!("inference failed: {}", reason)),
        }
    }

    fn warm_up(&mut self) -> Result<()> {
        match &self.warm_up_failure {
            Some(reason) => Err(anyhow!("warm-up failed: {}", reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::NormalizedRect;

    #[test]
    fn replays_queue_then_fallback() {
        let cat = RawDetection::new("cat", 0.9, NormalizedRect::full());
        let mut backend = ScriptedBackend::empty()
            .then(vec![cat.clone()])
            .then_fail("boom");

        assert_eq!(backend.detect(b"", 1, 1).unwrap(), vec![cat]);
        assert!(backend.detect(b"", 1, 1).is_err());
        assert!(backend.detect(b"", 1, 1).unwrap().is_empty());
        assert_eq!(backend.calls(), 3);
    }
}
