//! Debounced visibility coordination.
//!
//! [`VisibilityCoordinator`] wraps the pure planners in
//! [`plan`](super::plan) and adds one piece of state: the debounce cycle of
//! each target's pending hide.
//!
//! A delayed hide becomes a [`Directive::Schedule`] carrying a fresh cycle
//! id.  The dispatcher arms a timer which later re-injects the cycle id; the
//! coordinator only honours it via [`fire`](VisibilityCoordinator::fire) if
//! it is still the latest cycle for that target.  Any newer intent for the
//! same target cancels the pending cycle first, so a Show that arrives before
//! the deadline means no Hide is ever emitted for that cycle.

use std::collections::HashMap;
use std::time::Duration;

use crate::lifecycle::LifecycleState;

use super::intent::{VisibilityAction, VisibilityIntent, VisibilityTarget};
use super::plan::{plan_settings, plan_startup, plan_transition, VisibilityInputs};

/// Delay before the popup dialog hides after a finished transcription.
pub const DEFAULT_HIDE_DELAY: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Directive
// ---------------------------------------------------------------------------

/// A pending debounced hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledHide {
    pub target: VisibilityTarget,
    pub cycle: u64,
    pub delay: Duration,
}

/// What the dispatcher must do after a visibility recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Publish this intent now.
    Emit(VisibilityIntent),
    /// Arm a timer that re-injects the cycle after its delay.
    Schedule(ScheduledHide),
    /// Disarm the timer for a superseded cycle.
    Cancel(ScheduledHide),
}

// ---------------------------------------------------------------------------
// VisibilityCoordinator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct VisibilityCoordinator {
    hide_delay: Duration,
    next_cycle: u64,
    pending: HashMap<VisibilityTarget, ScheduledHide>,
}

impl VisibilityCoordinator {
    pub fn new(hide_delay: Duration) -> Self {
        Self {
            hide_delay,
            next_cycle: 0,
            pending: HashMap::new(),
        }
    }

    pub fn hide_delay(&self) -> Duration {
        self.hide_delay
    }

    /// The cycle id of `target`'s pending hide, if any.
    pub fn pending(&self, target: VisibilityTarget) -> Option<u64> {
        self.pending.get(&target).map(|h| h.cycle)
    }

    pub fn on_startup(&mut self, inputs: &VisibilityInputs) -> Vec<Directive> {
        self.resolve(plan_startup(inputs))
    }

    pub fn on_transition(
        &mut self,
        from: LifecycleState,
        to: LifecycleState,
        inputs: &VisibilityInputs,
    ) -> Vec<Directive> {
        self.resolve(plan_transition(from, to, inputs, self.hide_delay))
    }

    pub fn on_settings(
        &mut self,
        before: &VisibilityInputs,
        after: &VisibilityInputs,
        state: LifecycleState,
    ) -> Vec<Directive> {
        self.resolve(plan_settings(before, after, state))
    }

    /// A timer for `cycle` elapsed.  Returns the hide intent only when the
    /// cycle is still the latest one for `target`.
    pub fn fire(&mut self, target: VisibilityTarget, cycle: u64) -> Option<VisibilityIntent> {
        if self.pending(target) != Some(cycle) {
            log::debug!("visibility: dropping stale hide for {target} (cycle {cycle})");
            return None;
        }
        let hide = self.pending.remove(&target)?;
        Some(VisibilityIntent::hide_after(target, hide.delay))
    }

    fn resolve(&mut self, intents: Vec<VisibilityIntent>) -> Vec<Directive> {
        let mut directives = Vec::with_capacity(intents.len());

        for intent in intents {
            if let Some(prev) = self.pending.remove(&intent.target) {
                log::debug!(
                    "visibility: cancelling pending hide for {} (cycle {})",
                    prev.target,
                    prev.cycle
                );
                directives.push(Directive::Cancel(prev));
            }

            match (intent.action, intent.deadline) {
                (VisibilityAction::Hide, Some(delay)) => {
                    self.next_cycle += 1;
                    let hide = ScheduledHide {
                        target: intent.target,
                        cycle: self.next_cycle,
                        delay,
                    };
                    self.pending.insert(intent.target, hide);
                    directives.push(Directive::Schedule(hide));
                }
                _ => directives.push(Directive::Emit(intent)),
            }
        }

        directives
    }
}

impl Default for VisibilityCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_HIDE_DELAY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
