//! Migration configuration
//!
//! Loaded from TOML or built in code with the `with_*` helpers. Every field
//! has a default, so an empty file is a valid configuration.

use crate::error::MigrateError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Run options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Answer yes to every confirmation gate
    pub force: bool,
    /// Drop records with dangling references instead of nulling them
    pub skip_incomplete: bool,
    /// Publish eligible records after creation
    pub publish: bool,
    /// Publish eligible records even when their content did not change
    pub republish: bool,
    /// Validate only; create nothing
    pub validate_only: bool,
    /// Strip `_meta.deliveryKey` from bodies before creating them
    pub exclude_delivery_keys: bool,
    /// Max concurrent create/update calls within one level
    pub create_concurrency: usize,
    /// Publish queue limits
    pub publish_queue: PublishQueueConfig,
}

impl MigrationConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With force mode
    #[inline]
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// With skip-incomplete mode
    #[inline]
    #[must_use]
    pub fn with_skip_incomplete(mut self, skip: bool) -> Self {
        self.skip_incomplete = skip;
        self
    }

    /// With publishing enabled
    #[inline]
    #[must_use]
    pub fn with_publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    /// With republish of unchanged records
    #[inline]
    #[must_use]
    pub fn with_republish(mut self, republish: bool) -> Self {
        self.republish = republish;
        self
    }

    /// With validate-only mode
    #[inline]
    #[must_use]
    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    /// With delivery key exclusion
    #[inline]
    #[must_use]
    pub fn with_exclude_delivery_keys(mut self, exclude: bool) -> Self {
        self.exclude_delivery_keys = exclude;
        self
    }

    /// With publish queue limits
    #[inline]
    #[must_use]
    pub fn with_publish_queue(mut self, queue: PublishQueueConfig) -> Self {
        self.publish_queue = queue;
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `MigrateError::Config` on malformed TOML or invalid limits.
    pub fn from_toml_str(text: &str) -> Result<Self, MigrateError> {
        let config: Self =
            toml::from_str(text).map_err(|e| MigrateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `MigrateError::Config` if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, MigrateError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MigrateError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check limits
    ///
    /// # Errors
    /// `MigrateError::Config` if a limit is zero.
    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.create_concurrency == 0 {
            return Err(MigrateError::Config(
                "create_concurrency must be at least 1".to_string(),
            ));
        }
        self.publish_queue.validate()
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            force: false,
            skip_incomplete: false,
            publish: false,
            republish: false,
            validate_only: false,
            exclude_delivery_keys: false,
            create_concurrency: 8,
            publish_queue: PublishQueueConfig::default(),
        }
    }
}

/// Publish queue limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishQueueConfig {
    /// Max publish jobs in flight at once
    pub max_in_flight: usize,
    /// Delay before each status poll, in milliseconds
    pub poll_interval_ms: u64,
    /// Polls per job before it is recorded as failed
    pub max_poll_attempts: u32,
}

impl PublishQueueConfig {
    /// Poll delay as a duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check limits
    ///
    /// # Errors
    /// `MigrateError::Config` if a limit is zero.
    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.max_in_flight == 0 {
            return Err(MigrateError::Config(
                "publish_queue.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.max_poll_attempts == 0 {
            return Err(MigrateError::Config(
                "publish_queue.max_poll_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PublishQueueConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 35,
            poll_interval_ms: 1000,
            max_poll_attempts: 30,
        }
    }
}
