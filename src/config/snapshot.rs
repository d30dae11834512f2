//! Persisted user settings (`settings.toml`).
//!
//! This is the persistence collaborator: it produces the snapshot the
//! dispatcher starts from and writes changes back.  Derived keys are never
//! written, since they are recomputed on every start.

use std::path::Path;

use anyhow::{Context, Result};

use crate::settings::{KeyRole, Schema, SettingsSnapshot};

/// Every non-derived key at its schema default.
pub fn default_snapshot(schema: &Schema) -> SettingsSnapshot {
    schema
        .specs()
        .filter(|spec| spec.role != KeyRole::Derived)
        .map(|spec| (spec.key, spec.default.clone()))
        .collect()
}

/// `snapshot` without its derived entries.
pub fn persistable(schema: &Schema, snapshot: &SettingsSnapshot) -> SettingsSnapshot {
    snapshot
        .iter()
        .filter(|(key, _)| schema.spec(key).map_or(false, |s| s.role != KeyRole::Derived))
        .map(|(key, value)| (key, value.clone()))
        .collect()
}

/// Load the snapshot at `path`.
///
/// On first run (no file yet) the default snapshot is written and returned.
/// A file that exists but does not parse is an error; the dispatcher
/// validates the entries themselves when it starts.
pub fn load_or_init(path: &Path, schema: &Schema) -> Result<SettingsSnapshot> {
    if !path.exists() {
        let snapshot = default_snapshot(schema);
        save(path, schema, &snapshot)?;
        log::info!("snapshot: wrote defaults to {}", path.display());
        return Ok(snapshot);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let snapshot: SettingsSnapshot =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    log::debug!("snapshot: loaded {} entries from {}", snapshot.len(), path.display());
    Ok(snapshot)
}

/// Write the non-derived entries of `snapshot` to `path`, creating parent
/// directories as needed.
pub fn save(path: &Path, schema: &Schema, snapshot: &SettingsSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(&persistable(schema, snapshot))?;
    std::fs::write(path, content)?;
    Ok(())
}
