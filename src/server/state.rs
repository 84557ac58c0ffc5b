//! Shared application state

use crate::config::ServerConfig;
use crate::processor::SegmentationPipeline;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State handed to every handler
///
/// The pipeline sits behind a mutex: one upload is saved, processed and
/// written before the next one starts, so the fixed upload and output paths
/// never interleave.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Mutex<SegmentationPipeline>>,
    config: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(pipeline: SegmentationPipeline) -> Self {
        let config = Arc::new(pipeline.config().clone());
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            config,
        }
    }

    /// Server configuration
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared handle on the pipeline, for moving into blocking tasks
    #[must_use]
    pub fn pipeline(&self) -> Arc<Mutex<SegmentationPipeline>> {
        Arc::clone(&self.pipeline)
    }
}

/// Lock the pipeline, recovering from a panic in a previous request
///
/// The pipeline holds no partially updated state between calls, so a poisoned
/// lock is still usable.
pub fn lock_pipeline(pipeline: &Mutex<SegmentationPipeline>) -> MutexGuard<'_, SegmentationPipeline> {
    pipeline.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
