//! Process configuration structs, defaults and TOML persistence.
//!
//! This is the coordinator's own tuning (`coordinator.toml`), not the user
//! settings it manages; those live in the snapshot file handled by
//! [`snapshot`](super::snapshot).

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchConfig;

use super::AppPaths;

// ---------------------------------------------------------------------------
// DispatchSection
// ---------------------------------------------------------------------------

/// Ingress queue sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Capacity of the bounded ingress queue.  Producers wait when it is full.
    pub queue_capacity: usize,
    /// Maximum messages handled per dispatch tick.
    pub max_batch: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_batch: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// VisibilitySection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilitySection {
    /// Milliseconds the popup dialog stays up after a finished transcription.
    pub hide_delay_ms: u64,
}

impl Default for VisibilitySection {
    fn default() -> Self {
        Self { hide_delay_ms: 500 }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default `env_logger` filter.  `RUST_LOG` overrides it.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `coordinator.toml`.
///
/// Missing sections and fields take their defaults, so a file only needs to
/// name what it overrides:
///
/// ```toml
/// [visibility]
/// hide_delay_ms = 750
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatch: DispatchSection,
    pub visibility: VisibilitySection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load from the platform-appropriate `coordinator.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to the platform-appropriate `coordinator.toml`, creating parent
    /// directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().config_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The dispatcher tuning this config describes.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            queue_capacity: self.dispatch.queue_capacity,
            max_batch: self.dispatch.max_batch,
            hide_delay: Duration::from_millis(self.visibility.hide_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
