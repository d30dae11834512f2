//! The popup-style derivation table.
//!
//! | popup_style | applet_autohide | show_progress_window | show_recording_dialog | applet_mode |
//! |-------------|-----------------|----------------------|-----------------------|-------------|
//! | none        | -               | false                | false                 | off         |
//! | traditional | -               | true                 | false                 | off         |
//! | applet      | true            | false                | true                  | popup       |
//! | applet      | false           | false                | true                  | persistent  |

use std::fmt;
use std::str::FromStr;

use super::engine::{DerivationGap, DerivationRule};
use crate::settings::{keys, SettingValue, SettingsSnapshot};

// ---------------------------------------------------------------------------
// PopupStyle
// ---------------------------------------------------------------------------

/// User-facing choice of how recording feedback is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupStyle {
    None,
    Traditional,
    Applet,
}

impl PopupStyle {
    pub const ALL: [PopupStyle; 3] = [PopupStyle::None, PopupStyle::Traditional, PopupStyle::Applet];

    pub fn as_str(&self) -> &'static str {
        match self {
            PopupStyle::None => "none",
            PopupStyle::Traditional => "traditional",
            PopupStyle::Applet => "applet",
        }
    }
}

impl FromStr for PopupStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PopupStyle::None),
            "traditional" => Ok(PopupStyle::Traditional),
            "applet" => Ok(PopupStyle::Applet),
            other => Err(format!("unknown popup style {other:?}")),
        }
    }
}

impl fmt::Display for PopupStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AppletMode
// ---------------------------------------------------------------------------

/// Backend behaviour of the recording dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppletMode {
    /// The recording dialog is never shown automatically.
    Off,
    /// Shown while a recording cycle runs, hidden shortly after it ends.
    Popup,
    /// Shown at startup and left to the user.
    Persistent,
}

impl AppletMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppletMode::Off => "off",
            AppletMode::Popup => "popup",
            AppletMode::Persistent => "persistent",
        }
    }
}

impl FromStr for AppletMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(AppletMode::Off),
            "popup" => Ok(AppletMode::Popup),
            "persistent" => Ok(AppletMode::Persistent),
            other => Err(format!("unknown applet mode {other:?}")),
        }
    }
}

impl fmt::Display for AppletMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DerivedWindows
// ---------------------------------------------------------------------------

/// One row of the derived half of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedWindows {
    pub show_progress_window: bool,
    pub show_recording_dialog: bool,
    pub applet_mode: AppletMode,
}

impl DerivedWindows {
    /// Everything hidden, dialog off.  Used when the table has no row.
    pub const SAFE: DerivedWindows = DerivedWindows {
        show_progress_window: false,
        show_recording_dialog: false,
        applet_mode: AppletMode::Off,
    };

    fn entries(&self) -> Vec<(&'static str, SettingValue)> {
        vec![
            (
                keys::SHOW_PROGRESS_WINDOW,
                SettingValue::Bool(self.show_progress_window),
            ),
            (
                keys::SHOW_RECORDING_DIALOG,
                SettingValue::Bool(self.show_recording_dialog),
            ),
            (keys::APPLET_MODE, SettingValue::from(self.applet_mode.as_str())),
        ]
    }
}

/// Look up the derived row for a primary combination.
///
/// ```
/// use voice_coordinator::derive::{derive_windows, AppletMode, PopupStyle};
///
/// let row = derive_windows(PopupStyle::Applet, false);
/// assert!(row.show_recording_dialog);
/// assert_eq!(row.applet_mode, AppletMode::Persistent);
/// ```
pub fn derive_windows(style: PopupStyle, autohide: bool) -> DerivedWindows {
    match (style, autohide) {
        (PopupStyle::None, _) => DerivedWindows::SAFE,
        (PopupStyle::Traditional, _) => DerivedWindows {
            show_progress_window: true,
            show_recording_dialog: false,
            applet_mode: AppletMode::Off,
        },
        (PopupStyle::Applet, true) => DerivedWindows {
            show_progress_window: false,
            show_recording_dialog: true,
            applet_mode: AppletMode::Popup,
        },
        (PopupStyle::Applet, false) => DerivedWindows {
            show_progress_window: false,
            show_recording_dialog: true,
            applet_mode: AppletMode::Persistent,
        },
    }
}

// ---------------------------------------------------------------------------
// PopupStyleRule
// ---------------------------------------------------------------------------

/// [`DerivationRule`] wrapping [`derive_windows`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PopupStyleRule;

const INPUTS: &[&str] = &[keys::POPUP_STYLE, keys::APPLET_AUTOHIDE];
const OUTPUTS: &[&str] = &[
    keys::SHOW_PROGRESS_WINDOW,
    keys::SHOW_RECORDING_DIALOG,
    keys::APPLET_MODE,
];

impl DerivationRule for PopupStyleRule {
    fn name(&self) -> &'static str {
        "popup_style"
    }

    fn inputs(&self) -> &'static [&'static str] {
        INPUTS
    }

    fn outputs(&self) -> &'static [&'static str] {
        OUTPUTS
    }

    fn derive(
        &self,
        snapshot: &SettingsSnapshot,
    ) -> Result<Vec<(&'static str, SettingValue)>, DerivationGap> {
        let gap = || DerivationGap {
            rule: self.name(),
            inputs: format!(
                "popup_style={}, applet_autohide={}",
                describe(snapshot.get(keys::POPUP_STYLE)),
                describe(snapshot.get(keys::APPLET_AUTOHIDE)),
            ),
        };

        let style: PopupStyle = snapshot
            .get(keys::POPUP_STYLE)
            .and_then(SettingValue::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(gap)?;

        // The autohide flag only matters for the applet rows.
        let autohide = match style {
            PopupStyle::Applet => snapshot
                .get(keys::APPLET_AUTOHIDE)
                .and_then(SettingValue::as_bool)
                .ok_or_else(gap)?,
            _ => false,
        };

        Ok(derive_windows(style, autohide).entries())
    }

    fn fallback(&self) -> Vec<(&'static str, SettingValue)> {
        DerivedWindows::SAFE.entries()
    }
}

fn describe(value: Option<&SettingValue>) -> String {
    value.map_or_else(|| "<missing>".to_string(), ToString::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
