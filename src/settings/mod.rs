//! Settings store module.
//!
//! * [`SettingValue`] / [`SettingKind`]: typed scalars.
//! * [`Schema`] / [`SettingSpec`]: the known keys, their kinds, defaults and
//!   roles (primary, derived, plain).
//! * [`SettingsStore`]: current values with validation and change detection.
//! * [`SettingsSnapshot`]: immutable view used as derivation input and as the
//!   persistence hand-off format.

pub mod schema;
pub mod store;
pub mod value;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use schema::{keys, KeyRole, Schema, SettingSpec, APPLET_MODES, POPUP_STYLES};
pub use store::{SettingChange, SettingsError, SettingsSnapshot, SettingsStore};
pub use value::{SettingKind, SettingValue};
