//! Configuration and persistence.
//!
//! Provides `AppConfig` (process tuning, `coordinator.toml`), `AppPaths` for
//! cross-platform config locations, and the [`snapshot`] loader that hands
//! the persisted user settings (`settings.toml`) to the dispatcher.

pub mod paths;
pub mod settings;
pub mod snapshot;

pub use paths::AppPaths;
pub use settings::{AppConfig, DispatchSection, LoggingSection, VisibilitySection};
