//! Settings derivation.
//!
//! [`DerivationEngine`] holds a set of [`DerivationRule`]s and recomputes
//! derived settings whenever one of their input keys changes.  The only rule
//! shipped is [`PopupStyleRule`], which maps `popup_style` and
//! `applet_autohide` onto the window-related backend keys.

pub mod engine;
pub mod popup;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use engine::{Derivation, DerivationEngine, DerivationGap, DerivationRule, RegistrationError};
pub use popup::{derive_windows, AppletMode, DerivedWindows, PopupStyle, PopupStyleRule};
