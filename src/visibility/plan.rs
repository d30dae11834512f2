//! Pure visibility planning.
//!
//! Every function here is a pure mapping from lifecycle and derived-setting
//! inputs to [`VisibilityIntent`]s.  Debouncing (turning a delayed hide into
//! a cancellable timer) is layered on top by
//! [`VisibilityCoordinator`](super::VisibilityCoordinator).
//!
//! | `applet_mode` | recording dialog                                  | progress window |
//! |---------------|---------------------------------------------------|-----------------|
//! | `off`         | never shown                                       | follows Recording/Transcribing when `show_progress_window` |
//! | `persistent`  | shown at startup, never hidden automatically      | -               |
//! | `popup`       | shown on Recording, hidden 500 ms after Transcribing → Idle | -     |

use std::time::Duration;

use crate::derive::AppletMode;
use crate::lifecycle::LifecycleState;
use crate::settings::{keys, SettingsStore};

use super::intent::{VisibilityIntent, VisibilityTarget};

const DIALOG: VisibilityTarget = VisibilityTarget::RecordingDialog;
const PROGRESS: VisibilityTarget = VisibilityTarget::ProgressWindow;

// ---------------------------------------------------------------------------
// VisibilityInputs
// ---------------------------------------------------------------------------

/// The derived settings visibility depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityInputs {
    pub applet_mode: AppletMode,
    pub show_recording_dialog: bool,
    pub show_progress_window: bool,
}

impl VisibilityInputs {
    /// Read the inputs from the current store contents.
    pub fn from_store(store: &SettingsStore) -> Self {
        let applet_mode = store
            .get(keys::APPLET_MODE)
            .ok()
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(AppletMode::Off);
        Self {
            applet_mode,
            show_recording_dialog: store.get_bool(keys::SHOW_RECORDING_DIALOG).unwrap_or(false),
            show_progress_window: store.get_bool(keys::SHOW_PROGRESS_WINDOW).unwrap_or(false),
        }
    }

    /// The effective dialog mode: `Off` whenever the dialog is disabled.
    fn dialog_mode(&self) -> AppletMode {
        if self.show_recording_dialog {
            self.applet_mode
        } else {
            AppletMode::Off
        }
    }

    /// Whether the dialog should currently be on screen in `state`.
    fn dialog_expected(&self, state: LifecycleState) -> bool {
        match self.dialog_mode() {
            AppletMode::Off => false,
            AppletMode::Persistent => true,
            AppletMode::Popup => state != LifecycleState::Idle,
        }
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Intents for process startup.
pub fn plan_startup(inputs: &VisibilityInputs) -> Vec<VisibilityIntent> {
    if inputs.dialog_mode() == AppletMode::Persistent {
        vec![VisibilityIntent::show(DIALOG)]
    } else {
        Vec::new()
    }
}

/// Intents for a lifecycle transition `from → to`.
pub fn plan_transition(
    from: LifecycleState,
    to: LifecycleState,
    inputs: &VisibilityInputs,
    hide_delay: Duration,
) -> Vec<VisibilityIntent> {
    let mut intents = Vec::new();

    if inputs.show_progress_window {
        if to.is_busy() && !from.is_busy() {
            intents.push(VisibilityIntent::show(PROGRESS));
        } else if from.is_busy() && !to.is_busy() {
            intents.push(VisibilityIntent::hide(PROGRESS));
        }
    }

    if inputs.dialog_mode() == AppletMode::Popup {
        match (from, to) {
            (_, LifecycleState::Recording) => intents.push(VisibilityIntent::show(DIALOG)),
            (LifecycleState::Transcribing, LifecycleState::Idle) => {
                intents.push(VisibilityIntent::hide_after(DIALOG, hide_delay))
            }
            // The user dismissed the error; nothing left to look at.
            (LifecycleState::Error, LifecycleState::Idle) => {
                intents.push(VisibilityIntent::hide(DIALOG))
            }
            _ => {}
        }
    }

    hides_first(intents)
}

/// Intents for a change of derived settings while in `state`.
///
/// Dropping to `off` always force-hides the dialog, even if it may already
/// be hidden.  When the style swaps windows, the outgoing window's hide is
/// planned before the incoming window's show.
pub fn plan_settings(
    before: &VisibilityInputs,
    after: &VisibilityInputs,
    state: LifecycleState,
) -> Vec<VisibilityIntent> {
    let mut intents = Vec::new();

    if before.dialog_mode() != after.dialog_mode() {
        if after.dialog_mode() == AppletMode::Off {
            intents.push(VisibilityIntent::hide(DIALOG));
        } else {
            match (before.dialog_expected(state), after.dialog_expected(state)) {
                (false, true) => intents.push(VisibilityIntent::show(DIALOG)),
                (true, false) => intents.push(VisibilityIntent::hide(DIALOG)),
                _ => {}
            }
        }
    }

    if state.is_busy() && before.show_progress_window != after.show_progress_window {
        intents.push(if after.show_progress_window {
            VisibilityIntent::show(PROGRESS)
        } else {
            VisibilityIntent::hide(PROGRESS)
        });
    }

    hides_first(intents)
}

/// Stable partition: every hide, then every show.
fn hides_first(mut intents: Vec<VisibilityIntent>) -> Vec<VisibilityIntent> {
    intents.sort_by_key(VisibilityIntent::is_show);
    intents
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
