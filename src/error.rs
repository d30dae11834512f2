//! Crate-level error type.
//!
//! Each component defines its own error next to the code that raises it
//! ([`SettingsError`], [`InvalidTransition`], [`DerivationGap`],
//! [`RegistrationError`]).  [`CoordinatorError`] gathers them for callers of
//! the dispatcher, and adds the conditions that only exist at that level:
//! startup failure and a closed queue.

use thiserror::Error;

use crate::derive::{DerivationGap, RegistrationError};
use crate::lifecycle::InvalidTransition;
use crate::settings::SettingsError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// Unknown key, wrong type, value outside its enumeration, or a write to
    /// a derived key.  The setting is unchanged.
    #[error(transparent)]
    Validation(#[from] SettingsError),

    /// Lifecycle edge not permitted.  The state is unchanged.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// A derivation rule fell back to its safe outputs.
    #[error(transparent)]
    DerivationGap(#[from] DerivationGap),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// The initial snapshot was missing or malformed.  Fatal.
    #[error("startup failed: {0}")]
    Startup(#[source] SettingsError),

    /// A request arrived before the initial snapshot was loaded.
    #[error("coordinator has not received its initial settings snapshot")]
    NotStarted,

    /// A second initial snapshot was supplied.
    #[error("initial settings snapshot was already loaded")]
    AlreadyStarted,

    /// The dispatcher has stopped and no longer accepts events.
    #[error("dispatcher is closed")]
    Closed,
}

impl CoordinatorError {
    /// `true` for errors that stop the dispatch loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoordinatorError::Startup(_))
    }
}

/// A specialized `Result` for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
