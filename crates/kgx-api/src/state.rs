//! Application state management

use kgx_core::config::AppConfig;
use kgx_core::Result;
use kgx_extractor::{Collaborators, ExtractionPipeline};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Extraction pipeline with its collaborator clients
    pub pipeline: Arc<ExtractionPipeline>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: ExtractionPipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    /// Create state with the clients named in `config`
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let pipeline = ExtractionPipeline::from_config(&config)?;
        Ok(Self::new(config, pipeline))
    }

    /// Create state around caller-provided collaborators
    pub fn with_collaborators(config: AppConfig, collaborators: Collaborators) -> Self {
        let pipeline = ExtractionPipeline::new(collaborators, &config.pipeline, &config.entities);
        Self::new(config, pipeline)
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
