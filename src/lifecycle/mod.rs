//! Application lifecycle: `Idle → Recording → Transcribing → Idle`, with an
//! `Error` detour that is left by acknowledgement.

pub mod machine;
pub mod state;

pub use machine::{target, InvalidTransition, StateMachine, Transition};
pub use state::{LifecycleState, RecordingCommand, Trigger};
