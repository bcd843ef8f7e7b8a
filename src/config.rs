//! convergent settings
//!
//! Engine modes, service backend and logging in one place. Loaded from TOML
//! at startup, falls back to defaults if no config file exists.

use anyhow::Context;
use convergent_core::EngineOptions;
use convergent_resources::{platform_manager, Scope, ServiceManager, WaitPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Validation, cascade and notify modes.
    pub engine: EngineOptions,
    /// Service backend selection and transition waits.
    pub service: ServiceSettings,
    /// Log filter and format.
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// `user` or `system` systemd instance.
    pub scope: Scope,
    /// Where unit files are written. Defaults to the scope's standard directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_dir: Option<PathBuf>,
    /// Max time to wait for a start or stop to settle.
    pub timeout_ms: u64,
    /// Poll interval while waiting.
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of the human format.
    pub json: bool,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ServiceSettings {
    fn default() -> Self {
        let wait = WaitPolicy::default();
        Self {
            scope: Scope::default(),
            unit_dir: None,
            timeout_ms: wait.timeout.as_millis() as u64,
            interval_ms: wait.interval.as_millis() as u64,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "convergent=info,convergent_core=info,convergent_resources=info".into(),
            json: false,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl Settings {
    /// `<config dir>/convergent/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("convergent").join("config.toml"))
    }

    /// Read settings from a TOML file. `Ok(None)` when the file does not exist.
    pub fn try_load(path: &Path) -> anyhow::Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(settings))
    }

    /// Load settings from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(settings)) => {
                tracing::info!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Write the current settings as TOML (for generating a default file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

impl ServiceSettings {
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            interval: Duration::from_millis(self.interval_ms.max(1)),
        }
    }

    /// Backend for this build target, configured from these settings.
    pub fn manager(&self) -> Arc<dyn ServiceManager> {
        platform_manager(self.scope, self.unit_dir.clone())
    }
}
