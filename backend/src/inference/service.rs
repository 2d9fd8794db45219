use std::sync::{Arc, OnceLock};

use super::engine::InferenceEngine;

/// Holds the process-wide engine. The loader runs at most once, even when
/// several threads race on the first call.
#[derive(Default)]
pub struct ModelService {
    engine: OnceLock<Arc<InferenceEngine>>,
}

impl ModelService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_init<F>(&self, loader: F) -> Arc<InferenceEngine>
    where
        F: FnOnce() -> InferenceEngine,
    {
        self.engine
            .get_or_init(|| {
                log::info!("Initializing inference engine");
                Arc::new(loader())
            })
            .clone()
    }

    pub fn get(&self) -> Option<Arc<InferenceEngine>> {
        self.engine.get().cloned()
    }
}
