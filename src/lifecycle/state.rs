//! Application lifecycle states and the triggers that move between them.

use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// States of the recording/transcription lifecycle.
///
/// ```text
/// Idle         ──start recording──────▶ Recording
/// Recording    ──stop recording───────▶ Transcribing
/// Transcribing ──transcription done───▶ Idle
/// Transcribing ──transcription failed─▶ Error
/// Recording    ──capture failure──────▶ Error
/// Error        ──acknowledged─────────▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Waiting for the user to start a recording.
    Idle,

    /// The audio collaborator is capturing.
    Recording,

    /// Capture has ended; the transcription collaborator is working.
    Transcribing,

    /// Capture or transcription failed.  Stays here until acknowledged.
    Error,
}

impl LifecycleState {
    /// Returns `true` while a recording cycle is in flight.
    ///
    /// ```
    /// use voice_coordinator::lifecycle::LifecycleState;
    ///
    /// assert!(!LifecycleState::Idle.is_busy());
    /// assert!(LifecycleState::Recording.is_busy());
    /// assert!(LifecycleState::Transcribing.is_busy());
    /// assert!(!LifecycleState::Error.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, LifecycleState::Recording | LifecycleState::Transcribing)
    }

    /// A short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "Idle",
            LifecycleState::Recording => "Recording",
            LifecycleState::Transcribing => "Transcribing",
            LifecycleState::Error => "Error",
        }
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Idle
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// A request to move along one lifecycle edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    StartRecording,
    StopRecording,
    TranscriptionDone,
    TranscriptionFailed,
    CaptureFailed,
    Acknowledge,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::StartRecording => "start recording",
            Trigger::StopRecording => "stop recording",
            Trigger::TranscriptionDone => "transcription done",
            Trigger::TranscriptionFailed => "transcription failed",
            Trigger::CaptureFailed => "capture failure",
            Trigger::Acknowledge => "acknowledged",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// RecordingCommand
// ---------------------------------------------------------------------------

/// What the user asked the audio collaborator to do via a toggle.
///
/// The lifecycle only moves once audio confirms with
/// `audio.recording_started` / `audio.recording_stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingCommand {
    Start,
    Stop,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
