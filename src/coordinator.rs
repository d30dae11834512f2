//! The settle unit: one input in, one fully settled [`Outcome`] out.
//!
//! [`Coordinator`] owns the settings store, the derivation engine, the
//! lifecycle state machine and the visibility coordinator.  It performs no
//! I/O and never blocks; the dispatcher feeds it events one at a time (or a
//! run of settings writes at once) and publishes whatever the returned
//! [`Outcome`] contains.
//!
//! ```text
//! settings write ─▶ store.set ─▶ engine.settle ─▶ visibility.on_settings
//! lifecycle event ─▶ machine.apply ─────────────▶ visibility.on_transition
//! toggle request ─▶ machine.toggle_command ─────▶ RecordingCommand
//! hide deadline  ─▶ visibility.fire
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::derive::{Derivation, DerivationEngine};
use crate::dispatch::{Event, EventKind};
use crate::error::{CoordinatorError, Result};
use crate::lifecycle::{LifecycleState, RecordingCommand, StateMachine, Transition, Trigger};
use crate::settings::{Schema, SettingChange, SettingValue, SettingsSnapshot, SettingsStore};
use crate::visibility::{Directive, VisibilityCoordinator, VisibilityInputs, VisibilityIntent};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Everything one settle produced, in publication order.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Primary/plain changes first, then the derived changes they caused.
    pub changes: Vec<SettingChange>,
    pub transition: Option<Transition>,
    pub directives: Vec<Directive>,
    pub commands: Vec<RecordingCommand>,
    /// Non-fatal rejections, already logged.
    pub rejected: Vec<CoordinatorError>,
}

impl Outcome {
    /// Intents to publish immediately.
    pub fn intents(&self) -> impl Iterator<Item = &VisibilityIntent> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Emit(intent) => Some(intent),
            _ => None,
        })
    }

    fn absorb(&mut self, derivation: Derivation) {
        self.changes.extend(derivation.changes);
        self.rejected
            .extend(derivation.gaps.into_iter().map(CoordinatorError::from));
    }

    fn reject(&mut self, err: impl Into<CoordinatorError>) {
        let err = err.into();
        log::warn!("coordinator: {err}");
        self.rejected.push(err);
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Coordinator {
    store: SettingsStore,
    engine: DerivationEngine,
    machine: StateMachine,
    visibility: VisibilityCoordinator,
}

impl Coordinator {
    /// Build the core from the initial snapshot.
    ///
    /// Fails with [`CoordinatorError::Startup`] if the snapshot is missing a
    /// required key or holds an invalid entry.  On success the derived keys
    /// are settled and the startup visibility intents are returned.
    pub fn start(
        schema: Arc<Schema>,
        engine: DerivationEngine,
        snapshot: &SettingsSnapshot,
        hide_delay: Duration,
    ) -> Result<(Self, Outcome)> {
        let mut store =
            SettingsStore::from_snapshot(schema, snapshot).map_err(CoordinatorError::Startup)?;

        let mut outcome = Outcome::default();
        outcome.absorb(engine.settle_all(&mut store));

        let mut visibility = VisibilityCoordinator::new(hide_delay);
        outcome.directives = visibility.on_startup(&VisibilityInputs::from_store(&store));

        log::info!(
            "coordinator: started with {} derived change(s)",
            outcome.changes.len()
        );

        let coordinator = Self {
            store,
            engine,
            machine: StateMachine::new(),
            visibility,
        };
        Ok((coordinator, outcome))
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn state(&self) -> LifecycleState {
        self.machine.current()
    }

    pub fn visibility(&self) -> &VisibilityCoordinator {
        &self.visibility
    }

    /// Apply a run of writes and settle once.
    ///
    /// Derivation runs after every write has landed, so subscribers only see
    /// the derived values for the final primary combination.
    pub fn apply_settings<I>(&mut self, writes: I) -> Outcome
    where
        I: IntoIterator<Item = (String, SettingValue)>,
    {
        let before = VisibilityInputs::from_store(&self.store);
        let mut outcome = Outcome::default();
        let mut touched = BTreeSet::new();

        for (key, value) in writes {
            match self.store.set(&key, value) {
                Ok(Some(change)) => {
                    touched.insert(change.key.clone());
                    outcome.changes.push(change);
                }
                Ok(None) => {}
                Err(e) => outcome.reject(e),
            }
        }

        if touched.iter().any(|k| self.engine.is_trigger(k)) {
            outcome.absorb(self.engine.settle(&mut self.store, &touched));
        }

        let after = VisibilityInputs::from_store(&self.store);
        outcome.directives = self
            .visibility
            .on_settings(&before, &after, self.machine.current());
        outcome
    }

    /// Settle a single event.
    pub fn handle(&mut self, event: &Event) -> Outcome {
        match &event.payload {
            EventKind::SettingsSet { key, value } => {
                self.apply_settings([(key.clone(), value.clone())])
            }
            EventKind::ToggleRequested => self.toggle(),
            EventKind::SnapshotLoaded(_) => {
                let mut outcome = Outcome::default();
                outcome.reject(CoordinatorError::AlreadyStarted);
                outcome
            }
            EventKind::HideDeadline { target, cycle } => {
                let mut outcome = Outcome::default();
                if let Some(intent) = self.visibility.fire(*target, *cycle) {
                    outcome.directives.push(Directive::Emit(intent));
                }
                outcome
            }
            kind => {
                match kind {
                    EventKind::CaptureFailed { reason } => {
                        log::warn!("coordinator: capture failed: {reason}")
                    }
                    EventKind::TranscriptionFailed { reason } => {
                        log::warn!("coordinator: transcription failed: {reason}")
                    }
                    EventKind::TranscriptionCompleted { text } => {
                        log::debug!("coordinator: transcription completed ({} chars)", text.len())
                    }
                    _ => {}
                }
                match kind.trigger() {
                    Some(trigger) => self.transition(trigger),
                    None => Outcome::default(),
                }
            }
        }
    }

    fn transition(&mut self, trigger: Trigger) -> Outcome {
        let mut outcome = Outcome::default();
        match self.machine.apply(trigger) {
            Ok(t) => {
                let inputs = VisibilityInputs::from_store(&self.store);
                outcome.directives = self.visibility.on_transition(t.from, t.to, &inputs);
                outcome.transition = Some(t);
            }
            Err(e) => outcome.reject(e),
        }
        outcome
    }

    fn toggle(&mut self) -> Outcome {
        let mut outcome = Outcome::default();
        match self.machine.toggle_command() {
            Some(command) => outcome.commands.push(command),
            None => log::debug!(
                "coordinator: ignoring toggle while {}",
                self.machine.current()
            ),
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{keys, SettingsError};
    use crate::visibility::{VisibilityTarget, DEFAULT_HIDE_DELAY};

    const DIALOG: VisibilityTarget = VisibilityTarget::RecordingDialog;
    const PROGRESS: VisibilityTarget = VisibilityTarget::ProgressWindow;

    fn start(style: &str, autohide: bool) -> (Coordinator, Outcome) {
        let schema = Arc::new(Schema::standard());
        let engine = DerivationEngine::standard(&schema).unwrap();
        let snapshot = SettingsSnapshot::new()
            .with(keys::POPUP_STYLE, style)
            .with(keys::APPLET_AUTOHIDE, autohide);
        Coordinator::start(schema, engine, &snapshot, DEFAULT_HIDE_DELAY).unwrap()
    }

    fn send(c: &mut Coordinator, kind: EventKind) -> Outcome {
        c.handle(&Event::new(0, kind))
    }

    fn set(key: &str, value: impl Into<SettingValue>) -> (String, SettingValue) {
        (key.to_string(), value.into())
    }

    fn derived(outcome: &Outcome) -> Vec<&SettingChange> {
        outcome
            .changes
            .iter()
            .filter(|c| {
                [
                    keys::SHOW_PROGRESS_WINDOW,
                    keys::SHOW_RECORDING_DIALOG,
                    keys::APPLET_MODE,
                ]
                .contains(&c.key.as_str())
            })
            .collect()
    }

    fn tuple(c: &Coordinator) -> (bool, bool, String) {
        let s = c.store();
        (
            s.get_bool(keys::SHOW_PROGRESS_WINDOW).unwrap(),
            s.get_bool(keys::SHOW_RECORDING_DIALOG).unwrap(),
            s.get(keys::APPLET_MODE).unwrap().as_str().unwrap().to_string(),
        )
    }

    // ---- startup -----------------------------------------------------------

    #[test]
    fn startup_settles_derived_keys() {
        let (c, outcome) = start("traditional", true);
        assert_eq!(derived(&outcome).len(), 3);
        assert_eq!(tuple(&c), (true, false, "off".to_string()));
        assert_eq!(c.state(), LifecycleState::Idle);
    }

    #[test]
    fn persistent_startup_shows_dialog() {
        let (_, outcome) = start("applet", false);
        let intents: Vec<_> = outcome.intents().copied().collect();
        assert_eq!(intents, vec![VisibilityIntent::show(DIALOG)]);
    }

    #[test]
    fn malformed_snapshot_is_a_startup_failure() {
        let schema = Arc::new(Schema::standard());
        let engine = DerivationEngine::standard(&schema).unwrap();
        let snapshot = SettingsSnapshot::new().with(keys::POPUP_STYLE, "applet");
        let err = Coordinator::start(schema, engine, &snapshot, DEFAULT_HIDE_DELAY).unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::Startup(SettingsError::MissingKey(keys::APPLET_AUTOHIDE.into()))
        );
        assert!(err.is_fatal());
    }

    // ---- settings ----------------------------------------------------------

    #[test]
    fn applet_without_autohide_settles_to_persistent() {
        let (mut c, _) = start("traditional", true);
        let outcome = c.apply_settings([
            set(keys::POPUP_STYLE, "applet"),
            set(keys::APPLET_AUTOHIDE, false),
        ]);
        assert_eq!(tuple(&c), (false, true, "persistent".to_string()));
        assert_eq!(derived(&outcome).len(), 3);
        assert_eq!(outcome.changes.len(), 5);
    }

    #[test]
    fn only_differing_derived_values_are_reported() {
        let (mut c, _) = start("applet", true);
        let outcome = c.apply_settings([
            set(keys::POPUP_STYLE, "applet"),
            set(keys::APPLET_AUTOHIDE, false),
        ]);
        assert_eq!(tuple(&c), (false, true, "persistent".to_string()));
        let derived = derived(&outcome);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].key, keys::APPLET_MODE);
    }

    #[test]
    fn rapid_style_changes_settle_once_at_final_row() {
        let (mut c, _) = start("none", true);
        let outcome = c.apply_settings([
            set(keys::POPUP_STYLE, "traditional"),
            set(keys::POPUP_STYLE, "applet"),
        ]);
        // The traditional row would have shown the progress window.
        assert!(outcome
            .changes
            .iter()
            .all(|ch| !(ch.key == keys::SHOW_PROGRESS_WINDOW && ch.new == SettingValue::Bool(true))));
        assert_eq!(tuple(&c), (false, true, "popup".to_string()));
        assert_eq!(derived(&outcome).len(), 2);
    }

    #[test]
    fn rerunning_with_unchanged_snapshot_emits_nothing() {
        let (mut c, _) = start("applet", true);
        let outcome = c.apply_settings([set(keys::POPUP_STYLE, "applet")]);
        assert!(outcome.changes.is_empty());
        assert!(outcome.directives.is_empty());
    }

    #[test]
    fn invalid_write_is_rejected_and_rest_applies() {
        let (mut c, _) = start("applet", true);
        let outcome = c.apply_settings([
            set(keys::POPUP_STYLE, "bubble"),
            set(keys::APPLET_MODE, "off"),
            set(keys::MAX_RECORDING_SECS, 30_i64),
        ]);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(tuple(&c), (false, true, "popup".to_string()));
    }

    #[test]
    fn no_reachable_settings_show_both_windows() {
        let (mut c, _) = start("none", true);
        for style in ["none", "traditional", "applet"] {
            for autohide in [true, false] {
                c.apply_settings([
                    set(keys::POPUP_STYLE, style),
                    set(keys::APPLET_AUTOHIDE, autohide),
                ]);
                let (progress, dialog, _) = tuple(&c);
                assert!(!(progress && dialog), "{style}/{autohide}");
            }
        }
    }

    #[test]
    fn switching_to_none_while_idle_force_hides_dialog() {
        let (mut c, _) = start("applet", false);
        let outcome = c.apply_settings([set(keys::POPUP_STYLE, "none")]);
        let intents: Vec<_> = outcome.intents().copied().collect();
        assert_eq!(intents, vec![VisibilityIntent::hide(DIALOG)]);
    }

    // ---- lifecycle ---------------------------------------------------------

    #[test]
    fn popup_cycle_shows_then_hides_after_delay() {
        let (mut c, _) = start("applet", true);

        let out = send(&mut c, EventKind::RecordingStarted);
        assert_eq!(out.transition.unwrap().to, LifecycleState::Recording);
        assert_eq!(
            out.intents().copied().collect::<Vec<_>>(),
            vec![VisibilityIntent::show(DIALOG)]
        );

        let out = send(&mut c, EventKind::RecordingStopped);
        assert_eq!(out.transition.unwrap().to, LifecycleState::Transcribing);
        assert!(out.directives.is_empty());

        let out = send(
            &mut c,
            EventKind::TranscriptionCompleted { text: "hello".into() },
        );
        assert_eq!(out.transition.unwrap().to, LifecycleState::Idle);
        let hide = match out.directives.as_slice() {
            [Directive::Schedule(h)] => *h,
            other => panic!("expected schedule, got {other:?}"),
        };
        assert_eq!(hide.delay, Duration::from_millis(500));

        let out = send(
            &mut c,
            EventKind::HideDeadline {
                target: DIALOG,
                cycle: hide.cycle,
            },
        );
        assert_eq!(
            out.intents().copied().collect::<Vec<_>>(),
            vec![VisibilityIntent::hide_after(DIALOG, hide.delay)]
        );
    }

    #[test]
    fn new_recording_before_deadline_suppresses_hide() {
        let (mut c, _) = start("applet", true);
        send(&mut c, EventKind::RecordingStarted);
        send(&mut c, EventKind::RecordingStopped);
        let out = send(&mut c, EventKind::TranscriptionCompleted { text: String::new() });
        let hide = match out.directives.as_slice() {
            [Directive::Schedule(h)] => *h,
            other => panic!("expected schedule, got {other:?}"),
        };

        let out = send(&mut c, EventKind::RecordingStarted);
        assert_eq!(out.directives[0], Directive::Cancel(hide));

        let out = send(
            &mut c,
            EventKind::HideDeadline {
                target: DIALOG,
                cycle: hide.cycle,
            },
        );
        assert!(out.directives.is_empty());
    }

    #[test]
    fn traditional_cycle_drives_progress_window() {
        let (mut c, _) = start("traditional", true);
        let out = send(&mut c, EventKind::RecordingStarted);
        assert_eq!(
            out.intents().copied().collect::<Vec<_>>(),
            vec![VisibilityIntent::show(PROGRESS)]
        );
        send(&mut c, EventKind::RecordingStopped);
        let out = send(&mut c, EventKind::TranscriptionFailed { reason: "model".into() });
        assert_eq!(c.state(), LifecycleState::Error);
        assert_eq!(
            out.intents().copied().collect::<Vec<_>>(),
            vec![VisibilityIntent::hide(PROGRESS)]
        );
        send(&mut c, EventKind::DismissRequested);
        assert_eq!(c.state(), LifecycleState::Idle);
    }

    #[test]
    fn toggle_while_transcribing_is_a_silent_no_op() {
        let (mut c, _) = start("applet", true);
        send(&mut c, EventKind::RecordingStarted);
        send(&mut c, EventKind::RecordingStopped);

        let out = send(&mut c, EventKind::ToggleRequested);
        assert_eq!(c.state(), LifecycleState::Transcribing);
        assert!(out.transition.is_none());
        assert!(out.commands.is_empty());
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn toggle_requests_start_and_stop_commands() {
        let (mut c, _) = start("applet", true);
        let out = send(&mut c, EventKind::ToggleRequested);
        assert_eq!(out.commands, vec![RecordingCommand::Start]);
        // The lifecycle waits for audio to confirm.
        assert_eq!(c.state(), LifecycleState::Idle);

        send(&mut c, EventKind::RecordingStarted);
        let out = send(&mut c, EventKind::ToggleRequested);
        assert_eq!(out.commands, vec![RecordingCommand::Stop]);
    }

    #[test]
    fn invalid_transition_is_reported_and_state_kept() {
        let (mut c, _) = start("applet", true);
        let out = send(&mut c, EventKind::RecordingStopped);
        assert_eq!(c.state(), LifecycleState::Idle);
        assert!(matches!(
            out.rejected.as_slice(),
            [CoordinatorError::InvalidTransition(_)]
        ));
    }

    #[test]
    fn second_snapshot_is_rejected() {
        let (mut c, _) = start("applet", true);
        let out = send(&mut c, EventKind::SnapshotLoaded(SettingsSnapshot::new()));
        assert_eq!(out.rejected, vec![CoordinatorError::AlreadyStarted]);
    }
}
