use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::SyntheticBackend;
use super::lazy::LazyDetector;
use crate::config::DetectorSettings;

/// Constructor for a named backend. Called lazily, on the inference worker.
pub type BackendFactory = Arc<dyn Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// Registry of detector backends by name.
///
/// Backends are registered as factories so that model loading happens on first use
/// rather than at registration time.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    #[cfg_attr(not(feature = "backend-tract"), allow(unused_variables))]
    pub fn with_builtins(settings: &DetectorSettings) -> Self {
        let mut registry = Self::new();
        registry.register("synthetic", || {
            Ok(Box::new(SyntheticBackend::new()) as Box<dyn DetectorBackend>)
        });

        #[cfg(feature = "backend-tract")]
        {
            let settings = settings.clone();
            registry.register("tract", move || {
                let model_path = settings
                    .model_path
                    .clone()
                    .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
                let labels_path = settings
                    .labels_path
                    .clone()
                    .ok_or_else(|| anyhow!("tract backend requires a labels path"))?;
                let backend = super::backends::TractBackend::new(
                    model_path,
                    labels_path,
                    settings.input_width,
                    settings.input_height,
                )?;
                Ok(Box::new(backend) as Box<dyn DetectorBackend>)
            });
        }

        registry
    }

    /// Register a backend factory. The first registered backend becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deferred detector for a named backend.
    pub fn detector(&self, name: &str) -> Result<LazyDetector> {
        let factory = self
            .factories
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("backend '{}' not registered", name))?;
        Ok(LazyDetector::deferred(name, Box::new(move || factory())))
    }

    /// Deferred detector for the default backend.
    pub fn default_detector(&self) -> Result<LazyDetector> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no detector backends registered"))?;
        self.detector(name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
