use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ExtractionError, Result};
use crate::window::PlyWindow;

/// Upper bound on `plymax`, above the length of the longest possible game
/// under the fifty-move rule
pub const MAX_PLY_LIMIT: usize = 12_000;

/// Settings for one corpus run
///
/// `plymin`/`plymax` bound the ply window and so the time dimension of every
/// output tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First ply kept (inclusive)
    pub plymin: usize,
    /// Ply bound (exclusive)
    pub plymax: usize,
    /// Process games on the rayon pool instead of one by one
    pub parallel: bool,
    /// Worker count; defaults to the number of logical CPUs
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plymin: 10,
            plymax: 30,
            parallel: true,
            threads: None,
        }
    }
}

impl PipelineConfig {
    pub fn new(plymin: usize, plymax: usize) -> Self {
        Self {
            plymin,
            plymax,
            ..Self::default()
        }
    }

    /// Load from a JSON file; omitted fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.plymin >= self.plymax {
            return Err(ExtractionError::Configuration(format!(
                "plymin ({}) must be smaller than plymax ({})",
                self.plymin, self.plymax
            )));
        }
        if self.plymax > MAX_PLY_LIMIT {
            return Err(ExtractionError::Configuration(format!(
                "plymax ({}) exceeds the limit of {MAX_PLY_LIMIT} plies",
                self.plymax
            )));
        }
        if self.threads == Some(0) {
            return Err(ExtractionError::Configuration(
                "threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn window(&self) -> Result<PlyWindow> {
        PlyWindow::new(self.plymin, self.plymax)
    }

    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}
