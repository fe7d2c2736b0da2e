//! Coordinator configuration
//!
//! This exposes [`CoordinatorConfig`] so applications can load settings from
//! `config/config.toml` or environment variables using
//! `CoordinatorConfig::load()`, or build one directly when names come from
//! elsewhere.

use crate::error::CoordinatorError;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Coordination settings: where the changelog and lock documents live, and
/// whether the target database edition can enforce unique indexes.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Collection holding one document per executed changeset
    #[serde(default = "default_changelog_collection")]
    pub changelog_collection: String,
    /// Collection holding the single process-lock document
    #[serde(default = "default_lock_collection")]
    pub lock_collection: String,
    /// Whether the target edition enforces unique indexes. Deployment-declared,
    /// never auto-detected, so behavior stays deterministic across environments.
    #[serde(default = "default_supports_unique_indexes")]
    pub supports_unique_indexes: bool,
}

fn default_changelog_collection() -> String {
    "dbchangelog".to_string()
}

fn default_lock_collection() -> String {
    "mongratelock".to_string()
}

fn default_supports_unique_indexes() -> bool {
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            changelog_collection: default_changelog_collection(),
            lock_collection: default_lock_collection(),
            supports_unique_indexes: default_supports_unique_indexes(),
        }
    }
}

impl CoordinatorConfig {
    /// Load the coordinator configuration from `config/config.toml`, falling
    /// back to environment variables (prefix `MONGRATE`, e.g.
    /// `MONGRATE__MIGRATION__LOCK_COLLECTION`).
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("MONGRATE").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new("config/config.toml").exists() {
                    eprintln!(
                        "Warning: failed to load config file, falling back to env. Error: {}",
                        err
                    );
                }
                // Retry using only environment variables as source
                Config::builder()
                    .add_source(Environment::with_prefix("MONGRATE").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        match settings.get::<CoordinatorConfig>("migration") {
            Ok(cfg) => Ok(cfg),
            // A missing `[migration]` section means "all defaults"
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Migration configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    /// Validate collection names before any lock or index operation runs.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Configuration` if either collection name is
    /// empty or the two names are identical.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.changelog_collection.trim().is_empty() {
            return Err(CoordinatorError::Configuration(
                "changelog collection name must not be empty".to_string(),
            ));
        }
        if self.lock_collection.trim().is_empty() {
            return Err(CoordinatorError::Configuration(
                "lock collection name must not be empty".to_string(),
            ));
        }
        if self.changelog_collection == self.lock_collection {
            return Err(CoordinatorError::Configuration(format!(
                "changelog and lock collections must differ, both are '{}'",
                self.changelog_collection
            )));
        }
        Ok(())
    }
}
