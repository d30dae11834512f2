//! The lifecycle state machine.
//!
//! Transitions are only allowed along the fixed edge set in [`target`].
//! Anything else is refused with [`InvalidTransition`] and the current state
//! is left as it was.

use thiserror::Error;

use super::state::{LifecycleState, RecordingCommand, Trigger};

/// A lifecycle edge that is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {trigger} is not allowed from {from}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub trigger: Trigger,
}

/// A completed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub trigger: Trigger,
}

/// The allowed edge set.  `None` means `trigger` is not valid from `from`.
pub fn target(from: LifecycleState, trigger: Trigger) -> Option<LifecycleState> {
    use LifecycleState::*;
    use Trigger::*;

    match (from, trigger) {
        (Idle, StartRecording) => Some(Recording),
        (Recording, StopRecording) => Some(Transcribing),
        (Recording, CaptureFailed) => Some(Error),
        (Transcribing, TranscriptionDone) => Some(Idle),
        (Transcribing, TranscriptionFailed) => Some(Error),
        (Error, Acknowledge) => Some(Idle),
        _ => None,
    }
}

/// Holds the single current [`LifecycleState`].
#[derive(Debug, Default)]
pub struct StateMachine {
    current: LifecycleState,
}

impl StateMachine {
    /// A machine in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> LifecycleState {
        self.current
    }

    /// Move along the edge named by `trigger`.
    pub fn apply(&mut self, trigger: Trigger) -> Result<Transition, InvalidTransition> {
        let from = self.current;
        let to = target(from, trigger).ok_or(InvalidTransition { from, trigger })?;
        self.current = to;
        log::debug!("lifecycle: {from} --({trigger})--> {to}");
        Ok(Transition { from, to, trigger })
    }

    /// Interpret a toggle request in the current state.
    ///
    /// Returns `None` while transcribing or in error: the request is dropped
    /// rather than queued, and it is not an error.
    pub fn toggle_command(&self) -> Option<RecordingCommand> {
        match self.current {
            LifecycleState::Idle => Some(RecordingCommand::Start),
            LifecycleState::Recording => Some(RecordingCommand::Stop),
            LifecycleState::Transcribing | LifecycleState::Error => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
