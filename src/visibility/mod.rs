//! Window visibility decisions.
//!
//! * [`plan`]: pure functions from lifecycle state and derived settings to
//!   [`VisibilityIntent`]s.
//! * [`VisibilityCoordinator`]: adds debounced hides with cancellable
//!   cycle ids on top of the planners.

pub mod coordinator;
pub mod intent;
pub mod plan;

pub use coordinator::{Directive, ScheduledHide, VisibilityCoordinator, DEFAULT_HIDE_DELAY};
pub use intent::{VisibilityAction, VisibilityIntent, VisibilityTarget};
pub use plan::{plan_settings, plan_startup, plan_transition, VisibilityInputs};
