//! Window show/hide intents emitted by the coordinator.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Auxiliary windows the coordinator decides about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityTarget {
    RecordingDialog,
    ProgressWindow,
}

impl VisibilityTarget {
    pub const ALL: [VisibilityTarget; 2] =
        [VisibilityTarget::RecordingDialog, VisibilityTarget::ProgressWindow];
}

impl fmt::Display for VisibilityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisibilityTarget::RecordingDialog => f.write_str("recording dialog"),
            VisibilityTarget::ProgressWindow => f.write_str("progress window"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityAction {
    Show,
    Hide,
}

/// An instruction for the UI collaborator.
///
/// `deadline` is set on debounced hides: the quiet period that had to pass
/// before the hide was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityIntent {
    pub target: VisibilityTarget,
    pub action: VisibilityAction,
    pub deadline: Option<Duration>,
}

impl VisibilityIntent {
    pub fn show(target: VisibilityTarget) -> Self {
        Self {
            target,
            action: VisibilityAction::Show,
            deadline: None,
        }
    }

    pub fn hide(target: VisibilityTarget) -> Self {
        Self {
            target,
            action: VisibilityAction::Hide,
            deadline: None,
        }
    }

    /// A hide that should only happen once `delay` has passed quietly.
    pub fn hide_after(target: VisibilityTarget, delay: Duration) -> Self {
        Self {
            target,
            action: VisibilityAction::Hide,
            deadline: Some(delay),
        }
    }

    pub fn is_show(&self) -> bool {
        self.action == VisibilityAction::Show
    }
}

impl fmt::Display for VisibilityIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            VisibilityAction::Show => "show",
            VisibilityAction::Hide => "hide",
        };
        match self.deadline {
            Some(d) => write!(f, "{action} {} after {}ms", self.target, d.as_millis()),
            None => write!(f, "{action} {}", self.target),
        }
    }
}
