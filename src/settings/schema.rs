//! Static description of every setting key the coordinator knows about.
//!
//! The [`Schema`] is built once at startup and shared (`Arc<Schema>`) between
//! the dispatch task and every [`DispatcherHandle`](crate::dispatch::DispatcherHandle),
//! so callers get validation errors synchronously without a round trip
//! through the queue.
//!
//! | key                     | kind   | role    | default            |
//! |-------------------------|--------|---------|--------------------|
//! | `popup_style`           | string | Primary | `"applet"`         |
//! | `applet_autohide`       | bool   | Primary | `true`             |
//! | `show_recording_dialog` | bool   | Derived | `true`             |
//! | `show_progress_window`  | bool   | Derived | `false`            |
//! | `applet_mode`           | string | Derived | `"popup"`          |
//! | `record_hotkey`         | string | Plain   | `"ctrl+shift+space"` |
//! | `max_recording_secs`    | int    | Plain   | `60`               |

use super::value::{SettingKind, SettingValue};
use super::SettingsError;

/// Well-known setting keys.
pub mod keys {
    pub const POPUP_STYLE: &str = "popup_style";
    pub const APPLET_AUTOHIDE: &str = "applet_autohide";
    pub const SHOW_RECORDING_DIALOG: &str = "show_recording_dialog";
    pub const SHOW_PROGRESS_WINDOW: &str = "show_progress_window";
    pub const APPLET_MODE: &str = "applet_mode";
    pub const RECORD_HOTKEY: &str = "record_hotkey";
    pub const MAX_RECORDING_SECS: &str = "max_recording_secs";
}

// ---------------------------------------------------------------------------
// KeyRole
// ---------------------------------------------------------------------------

/// How a key participates in derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// User-facing source of truth; may trigger derivation.
    Primary,
    /// Computed by a derivation rule; never set from outside.
    Derived,
    /// Ordinary setting with no derivation involvement.
    Plain,
}

// ---------------------------------------------------------------------------
// SettingSpec
// ---------------------------------------------------------------------------

/// Declaration of a single key.
#[derive(Debug, Clone)]
pub struct SettingSpec {
    pub key: &'static str,
    pub kind: SettingKind,
    pub role: KeyRole,
    pub default: SettingValue,
    /// For enumerated strings: the only accepted values.
    pub allowed: Option<&'static [&'static str]>,
    /// Must be present in the initial snapshot supplied at startup.
    pub required: bool,
}

impl SettingSpec {
    /// Check `value` against this key's kind and allowed set.
    pub fn check(&self, value: &SettingValue) -> Result<(), SettingsError> {
        if value.kind() != self.kind {
            return Err(SettingsError::WrongType {
                key: self.key.to_string(),
                expected: self.kind,
                found: value.kind(),
            });
        }
        if let (Some(allowed), Some(s)) = (self.allowed, value.as_str()) {
            if !allowed.contains(&s) {
                return Err(SettingsError::InvalidValue {
                    key: self.key.to_string(),
                    value: s.to_string(),
                    allowed: allowed.join(", "),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

pub const POPUP_STYLES: &[&str] = &["none", "traditional", "applet"];
pub const APPLET_MODES: &[&str] = &["off", "popup", "persistent"];

/// The full set of known keys.
#[derive(Debug, Clone)]
pub struct Schema {
    specs: Vec<SettingSpec>,
}

impl Schema {
    /// Build a schema from explicit specs.  Later duplicates are ignored.
    pub fn new(specs: Vec<SettingSpec>) -> Self {
        let mut unique: Vec<SettingSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            if unique.iter().any(|s| s.key == spec.key) {
                log::warn!("settings: duplicate schema key {:?} ignored", spec.key);
                continue;
            }
            unique.push(spec);
        }
        Self { specs: unique }
    }

    /// The schema shipped with the application.
    pub fn standard() -> Self {
        Self::new(vec![
            SettingSpec {
                key: keys::POPUP_STYLE,
                kind: SettingKind::String,
                role: KeyRole::Primary,
                default: SettingValue::from("applet"),
                allowed: Some(POPUP_STYLES),
                required: true,
            },
            SettingSpec {
                key: keys::APPLET_AUTOHIDE,
                kind: SettingKind::Bool,
                role: KeyRole::Primary,
                default: SettingValue::Bool(true),
                allowed: None,
                required: true,
            },
            SettingSpec {
                key: keys::SHOW_RECORDING_DIALOG,
                kind: SettingKind::Bool,
                role: KeyRole::Derived,
                default: SettingValue::Bool(true),
                allowed: None,
                required: false,
            },
            SettingSpec {
                key: keys::SHOW_PROGRESS_WINDOW,
                kind: SettingKind::Bool,
                role: KeyRole::Derived,
                default: SettingValue::Bool(false),
                allowed: None,
                required: false,
            },
            SettingSpec {
                key: keys::APPLET_MODE,
                kind: SettingKind::String,
                role: KeyRole::Derived,
                default: SettingValue::from("popup"),
                allowed: Some(APPLET_MODES),
                required: false,
            },
            SettingSpec {
                key: keys::RECORD_HOTKEY,
                kind: SettingKind::String,
                role: KeyRole::Plain,
                default: SettingValue::from("ctrl+shift+space"),
                allowed: None,
                required: false,
            },
            SettingSpec {
                key: keys::MAX_RECORDING_SECS,
                kind: SettingKind::Int,
                role: KeyRole::Plain,
                default: SettingValue::Int(60),
                allowed: None,
                required: false,
            },
        ])
    }

    pub fn spec(&self, key: &str) -> Option<&SettingSpec> {
        self.specs.iter().find(|s| s.key == key)
    }

    pub fn specs(&self) -> impl Iterator<Item = &SettingSpec> {
        self.specs.iter()
    }

    /// Look up `key` or fail with [`SettingsError::UnknownKey`].
    pub fn require(&self, key: &str) -> Result<&SettingSpec, SettingsError> {
        self.spec(key)
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))
    }

    /// Validate `value` for `key` without regard to role.
    pub fn validate(&self, key: &str, value: &SettingValue) -> Result<&SettingSpec, SettingsError> {
        let spec = self.require(key)?;
        spec.check(value)?;
        Ok(spec)
    }

    /// Validate a write coming from outside the core: derived keys are
    /// read-only.
    pub fn validate_external(
        &self,
        key: &str,
        value: &SettingValue,
    ) -> Result<&SettingSpec, SettingsError> {
        let spec = self.validate(key, value)?;
        if spec.role == KeyRole::Derived {
            return Err(SettingsError::DerivedKey(key.to_string()));
        }
        Ok(spec)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_schema_marks_roles() {
        let schema = Schema::standard();
        assert_eq!(schema.spec(keys::POPUP_STYLE).unwrap().role, KeyRole::Primary);
        assert_eq!(schema.spec(keys::APPLET_MODE).unwrap().role, KeyRole::Derived);
        assert_eq!(
            schema.spec(keys::MAX_RECORDING_SECS).unwrap().role,
            KeyRole::Plain
        );
        let required: Vec<_> = schema.specs().filter(|s| s.required).map(|s| s.key).collect();
        assert_eq!(required, vec![keys::POPUP_STYLE, keys::APPLET_AUTOHIDE]);
    }

    #[test]
    fn defaults_match_their_declared_kind() {
        let schema = Schema::standard();
        for spec in schema.specs() {
            assert!(spec.check(&spec.default).is_ok(), "bad default for {}", spec.key);
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Schema::standard()
            .validate("theme", &SettingValue::from("dark"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::UnknownKey(k) if k == "theme"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = Schema::standard()
            .validate(keys::APPLET_AUTOHIDE, &SettingValue::from("yes"))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::WrongType {
                expected: SettingKind::Bool,
                found: SettingKind::String,
                ..
            }
        ));
    }

    #[test]
    fn popup_style_outside_enumeration_is_rejected() {
        let err = Schema::standard()
            .validate(keys::POPUP_STYLE, &SettingValue::from("floating"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
        assert!(err.to_string().contains("none, traditional, applet"));
    }

    #[test]
    fn external_writes_to_derived_keys_are_rejected() {
        let schema = Schema::standard();
        let err = schema
            .validate_external(keys::SHOW_PROGRESS_WINDOW, &SettingValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, SettingsError::DerivedKey(_)));
        assert!(schema
            .validate_external(keys::RECORD_HOTKEY, &SettingValue::from("f9"))
            .is_ok());
    }

    #[test]
    fn duplicate_keys_keep_first_declaration() {
        let schema = Schema::new(vec![
            SettingSpec {
                key: "a",
                kind: SettingKind::Int,
                role: KeyRole::Plain,
                default: SettingValue::Int(1),
                allowed: None,
                required: false,
            },
            SettingSpec {
                key: "a",
                kind: SettingKind::Bool,
                role: KeyRole::Plain,
                default: SettingValue::Bool(false),
                allowed: None,
                required: false,
            },
        ]);
        assert_eq!(schema.specs().count(), 1);
        assert_eq!(schema.spec("a").unwrap().kind, SettingKind::Int);
    }
}
