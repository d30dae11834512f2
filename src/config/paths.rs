//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir:
//!   Windows: %APPDATA%\voice-coordinator\
//!   macOS:   ~/Library/Application Support/voice-coordinator/
//!   Linux:   ~/.config/voice-coordinator/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for both TOML files.
    pub config_dir: PathBuf,
    /// Full path to `coordinator.toml` (process tuning).
    pub config_file: PathBuf,
    /// Full path to `settings.toml` (persisted user settings snapshot).
    pub settings_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-coordinator";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        Self::in_dir(config_dir)
    }

    /// Lay the files out under `config_dir` instead of the platform default.
    pub fn in_dir(config_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("coordinator.toml"),
            settings_file: config_dir.join("settings.toml"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
