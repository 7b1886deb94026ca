//! Run configuration.

use crate::core::RunMode;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Tunables for one publish run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Rows per processing batch handed to a batch handler.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Rows per page read from the import row store.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Worker pool parallelism.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Pool queue capacity as a multiple of `parallelism`.
    #[serde(default = "default_queue_factor")]
    pub queue_factor: usize,
    /// Maximum parent hops before a hierarchy is declared circular.
    #[serde(default = "default_max_hierarchy_depth")]
    pub max_hierarchy_depth: u32,
    /// Oldest remote system version the run accepts.
    #[serde(default)]
    pub min_remote_version: Option<String>,
    /// Whether the run only validates or also publishes.
    #[serde(default)]
    pub mode: RunMode,
}

fn default_batch_size() -> usize {
    100
}

fn default_page_size() -> usize {
    1000
}

fn default_parallelism() -> usize {
    3
}

fn default_queue_factor() -> usize {
    2
}

fn default_max_hierarchy_depth() -> u32 {
    10
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            parallelism: default_parallelism(),
            queue_factor: default_queue_factor(),
            max_hierarchy_depth: default_max_hierarchy_depth(),
            min_remote_version: None,
            mode: RunMode::default(),
        }
    }
}

impl PublishConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the processing batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the row store page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the pool parallelism.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets the hierarchy hop bound.
    #[must_use]
    pub fn with_max_hierarchy_depth(mut self, depth: u32) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    /// Sets the minimum accepted remote version.
    #[must_use]
    pub fn with_min_remote_version(mut self, version: impl Into<String>) -> Self {
        self.min_remote_version = Some(version.into());
        self
    }

    /// Sets the run mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the bounded pool queue capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        (self.parallelism * self.queue_factor).max(1)
    }

    /// Checks that every size is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("batch_size", self.batch_size),
            ("page_size", self.page_size),
            ("parallelism", self.parallelism),
            ("queue_factor", self.queue_factor),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.max_hierarchy_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_hierarchy_depth",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
