use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Deferred constructor for a backend, typically a model load from disk.
pub type DetectorLoader = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>> + Send>;

enum State {
    Pending(DetectorLoader),
    Loading,
    Ready(Box<dyn DetectorBackend>),
    Failed(String),
}

/// A detector whose model is loaded on first use.
///
/// A failed load is sticky: every later call reports the same failure without
/// touching the loader again, so a missing model disables detection rather than
/// being retried per frame.
pub struct LazyDetector {
    name: String,
    state: State,
}

impl LazyDetector {
    /// Wrap an already constructed backend.
    pub fn ready<B: DetectorBackend + 'static>(backend: B) -> Self {
        Self {
            name: backend.name().to_string(),
            state: State::Ready(Box::new(backend)),
        }
    }

    /// Defer construction until the first frame arrives.
    pub fn deferred(name: impl Into<String>, loader: DetectorLoader) -> Self {
        Self {
            name: name.into(),
            state: State::Pending(loader),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once a load has been attempted and failed.
    pub fn has_failed(&self) -> bool {
        matches!(self.state, State::Failed(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Get the backend, loading and warming it up on first call.
    pub fn backend(&mut self) -> Result<&mut dyn DetectorBackend> {
        if matches!(self.state, State::Pending(_)) {
            if let State::Pending(loader) = std::mem::replace(&mut self.state, State::Loading) {
                self.state = match load(loader) {
                    Ok(backend) => {
                        log::info!("detector '{}' loaded ({})", self.name, backend.name());
                        State::Ready(backend)
                    }
                    Err(e) => {
                        log::warn!(
                            "detector '{}' unavailable, detection disabled: {:#}",
                            self.name,
                            e
                        );
                        State::Failed(format!("{:#}", e))
                    }
                };
            }
        }
        self.current()
    }

    fn current(&mut self) -> Result<&mut dyn DetectorBackend> {
        match &mut self.state {
            State::Ready(backend) => Ok(&mut **backend),
            State::Failed(reason) => {
                Err(anyhow!("detector '{}' unavailable: {}", self.name, reason))
            }
            State::Pending(_) | State::Loading => {
                Err(anyhow!("detector '{}' is still loading", self.name))
            }
        }
    }
}

fn load(loader: DetectorLoader) -> Result<Box<dyn DetectorBackend>> {
    let mut backend = loader()?;
    backend.warm_up()?;
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn loads_once_on_first_use() -> Result<()> {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let mut detector = LazyDetector::deferred(
            "scripted",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(ScriptedBackend::empty()) as Box<dyn DetectorBackend>)
            }),
        );
        assert!(!detector.is_ready());

        detector.backend()?;
        detector.backend()?;
        assert!(detector.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn load_failure_is_sticky() {
        let mut detector = LazyDetector::deferred(
            "missing",
            Box::new(|| Err(anyhow!("model file not found"))),
        );

        let first = detector.backend().err().expect("load must fail");
        assert!(first.to_string().contains("model file not found"));
        assert!(detector.has_failed());

        let second = detector.backend().err().expect("failure must persist");
        assert!(second.to_string().contains("unavailable"));
    }

    #[test]
    fn warm_up_failure_counts_as_load_failure() {
        let mut detector = LazyDetector::deferred(
            "cold",
            Box::new(|| {
                Ok(Box::new(ScriptedBackend::empty().with_warm_up_failure("no device"))
                    as Box<dyn DetectorBackend>)
            }),
        );
        assert!(detector.backend().is_err());
        assert!(detector.has_failed());
    }
}
