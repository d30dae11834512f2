//! Dispatcher topics and event payloads.

use std::fmt;

use crate::lifecycle::Trigger;
use crate::settings::{SettingValue, SettingsSnapshot};
use crate::visibility::VisibilityTarget;

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Every topic that flows through the dispatcher, inbound and outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    // Inbound from collaborators.
    RecordingStarted,
    RecordingStopped,
    CaptureFailed,
    TranscriptionCompleted,
    TranscriptionFailed,
    ToggleRequested,
    DismissRequested,
    SnapshotLoaded,
    SettingsSet,

    // Re-injected by the dispatcher's own timers.
    HideDeadline,

    // Outbound to subscribers.
    SettingsChanged,
    StateChanged,
    Visibility(VisibilityTarget),
    AudioCommand,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::RecordingStarted => "audio.recording_started",
            Topic::RecordingStopped => "audio.recording_stopped",
            Topic::CaptureFailed => "audio.capture_failed",
            Topic::TranscriptionCompleted => "transcription.completed",
            Topic::TranscriptionFailed => "transcription.failed",
            Topic::ToggleRequested => "ui.toggle_requested",
            Topic::DismissRequested => "ui.dismiss_requested",
            Topic::SnapshotLoaded => "settings.persisted_snapshot_loaded",
            Topic::SettingsSet => "settings.set",
            Topic::HideDeadline => "visibility.hide_deadline",
            Topic::SettingsChanged => "settings.changed",
            Topic::StateChanged => "state.changed",
            Topic::Visibility(VisibilityTarget::RecordingDialog) => "visibility.recording_dialog",
            Topic::Visibility(VisibilityTarget::ProgressWindow) => "visibility.progress_window",
            Topic::AudioCommand => "audio.command",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Payload of an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    RecordingStarted,
    RecordingStopped,
    CaptureFailed { reason: String },
    TranscriptionCompleted { text: String },
    TranscriptionFailed { reason: String },
    ToggleRequested,
    DismissRequested,
    /// The persistence collaborator's initial snapshot.  Startup only.
    SnapshotLoaded(SettingsSnapshot),
    /// A validated write request for a primary or plain key.
    SettingsSet { key: String, value: SettingValue },
    /// A debounce timer elapsed.
    HideDeadline { target: VisibilityTarget, cycle: u64 },
}

impl EventKind {
    pub fn topic(&self) -> Topic {
        match self {
            EventKind::RecordingStarted => Topic::RecordingStarted,
            EventKind::RecordingStopped => Topic::RecordingStopped,
            EventKind::CaptureFailed { .. } => Topic::CaptureFailed,
            EventKind::TranscriptionCompleted { .. } => Topic::TranscriptionCompleted,
            EventKind::TranscriptionFailed { .. } => Topic::TranscriptionFailed,
            EventKind::ToggleRequested => Topic::ToggleRequested,
            EventKind::DismissRequested => Topic::DismissRequested,
            EventKind::SnapshotLoaded(_) => Topic::SnapshotLoaded,
            EventKind::SettingsSet { .. } => Topic::SettingsSet,
            EventKind::HideDeadline { .. } => Topic::HideDeadline,
        }
    }

    /// The lifecycle edge this event requests, if it requests one directly.
    pub fn trigger(&self) -> Option<Trigger> {
        match self {
            EventKind::RecordingStarted => Some(Trigger::StartRecording),
            EventKind::RecordingStopped => Some(Trigger::StopRecording),
            EventKind::CaptureFailed { .. } => Some(Trigger::CaptureFailed),
            EventKind::TranscriptionCompleted { .. } => Some(Trigger::TranscriptionDone),
            EventKind::TranscriptionFailed { .. } => Some(Trigger::TranscriptionFailed),
            EventKind::DismissRequested => Some(Trigger::Acknowledge),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An inbound event stamped with its dispatch sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: Topic,
    pub payload: EventKind,
    pub sequence: u64,
}

impl Event {
    pub fn new(sequence: u64, payload: EventKind) -> Self {
        Self {
            topic: payload.topic(),
            payload,
            sequence,
        }
    }
}
