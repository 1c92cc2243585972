//! Configuration loading using Figment
//!
//! Sources in precedence order (later sources override earlier ones):
//! 1. Default values
//! 2. An optional config file (YAML, TOML or JSON, chosen by extension)
//! 3. Environment variables prefixed with `KANBAN_SYNC_`, with `__` separating
//!    nested keys (e.g. `KANBAN_SYNC_RETRY__MAX_ATTEMPTS=5`)

use crate::error::{Result, SyncError};
use crate::retry::RetryConfig;
use crate::ruler::RulerConfig;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "KANBAN_SYNC_";

/// Activity reporting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Emit an activity event for every committed mutation
    pub enabled: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Top-level configuration for the sync engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retry: RetryConfig,
    pub ruler: RulerConfig,
    pub activity: ActivityConfig,
}

impl SyncConfig {
    /// Load from defaults and the environment
    pub fn load() -> Result<Self> {
        Self::extract(Self::base())
    }

    /// Load from defaults, `path`, then the environment. A missing file is
    /// treated as empty.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let file = match extension.as_deref() {
            Some("yaml") | Some("yml") => Figment::from(Yaml::file(path)),
            Some("toml") => Figment::from(Toml::file(path)),
            Some("json") => Figment::from(Json::file(path)),
            _ => {
                return Err(SyncError::validation(format!(
                    "unsupported config file format: {}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), "loading sync config file");

        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(file)
            .merge(Self::env());
        Self::extract(figment)
    }

    fn base() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Self::env())
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        debug!(?config, "loaded sync config");
        Ok(config)
    }
}
