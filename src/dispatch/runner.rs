//! The dispatch loop and its handle.
//!
//! [`Dispatcher`] owns the [`Coordinator`] and is the only task that mutates
//! it.  Producers talk to it through a cloneable [`DispatcherHandle`] that
//! wraps the bounded ingress queue.
//!
//! # Loop
//!
//! ```text
//! ingress (mpsc, FIFO)
//!   └─▶ tick = first message + whatever is already queued (≤ max_batch)
//!         ├─ run of settings.set   → Coordinator::apply_settings (one settle)
//!         ├─ other event           → Coordinator::handle
//!         ├─ get / snapshot        → reply on oneshot
//!         └─ subscribe             → Bus::add
//!   └─▶ Outcome → Bus (settings, state, visibility, commands)
//!              → timers (Schedule arms, Cancel aborts)
//! ```
//!
//! Debounce timers are plain tokio tasks.  They hold only a weak sender, so
//! a pending hide never keeps the dispatcher alive on its own.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::coordinator::{Coordinator, Outcome};
use crate::derive::DerivationEngine;
use crate::error::{CoordinatorError, Result};
use crate::lifecycle::{LifecycleState, RecordingCommand, Transition};
use crate::settings::{Schema, SettingChange, SettingValue, SettingsSnapshot};
use crate::visibility::{Directive, ScheduledHide, VisibilityIntent, VisibilityTarget, DEFAULT_HIDE_DELAY};

use super::bus::{Bus, Subscriber, Subscription};
use super::event::{Event, EventKind};

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Tuning for the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Capacity of the bounded ingress queue.
    pub queue_capacity: usize,
    /// Upper bound on messages handled per tick.
    pub max_batch: usize,
    /// Popup dialog hide delay after a finished transcription.
    pub hide_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_batch: 64,
            hide_delay: DEFAULT_HIDE_DELAY,
        }
    }
}

// ---------------------------------------------------------------------------
// Ingress
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum Ingress {
    Event(EventKind),
    Get {
        key: String,
        reply: oneshot::Sender<Result<SettingValue>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<SettingsSnapshot>>,
    },
    Subscribe(Subscriber),
    Shutdown,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Single-threaded event loop around the [`Coordinator`].
///
/// ```rust,no_run
/// use voice_coordinator::dispatch::{DispatchConfig, Dispatcher, EventKind};
/// use voice_coordinator::settings::SettingsSnapshot;
///
/// # async fn example() -> voice_coordinator::Result<()> {
/// let (dispatcher, handle) = Dispatcher::new(DispatchConfig::default())?;
/// let task = tokio::spawn(dispatcher.run());
///
/// let snapshot = SettingsSnapshot::new()
///     .with("popup_style", "applet")
///     .with("applet_autohide", true);
/// handle.publish(EventKind::SnapshotLoaded(snapshot)).await?;
/// handle.publish(EventKind::RecordingStarted).await?;
///
/// handle.shutdown().await?;
/// task.await.ok();
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher {
    config: DispatchConfig,
    schema: Arc<Schema>,
    /// Consumed when the initial snapshot arrives.
    engine: Option<DerivationEngine>,
    core: Option<Coordinator>,
    rx: mpsc::Receiver<Ingress>,
    weak_tx: mpsc::WeakSender<Ingress>,
    bus: Bus,
    timers: HashMap<(VisibilityTarget, u64), JoinHandle<()>>,
    state_tx: watch::Sender<LifecycleState>,
}

impl Dispatcher {
    /// A dispatcher over the standard schema and derivation rules.
    pub fn new(config: DispatchConfig) -> Result<(Self, DispatcherHandle)> {
        let schema = Arc::new(Schema::standard());
        let engine = DerivationEngine::standard(&schema)?;
        Ok(Self::with_engine(config, schema, engine))
    }

    /// A dispatcher with a caller-built schema and engine.
    pub fn with_engine(
        config: DispatchConfig,
        schema: Arc<Schema>,
        engine: DerivationEngine,
    ) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);

        let dispatcher = Self {
            weak_tx: tx.downgrade(),
            config,
            schema: Arc::clone(&schema),
            engine: Some(engine),
            core: None,
            rx,
            bus: Bus::new(),
            timers: HashMap::new(),
            state_tx,
        };
        let handle = DispatcherHandle {
            tx,
            schema,
            state_rx,
            snapshot_queued: Arc::new(AtomicBool::new(false)),
        };
        (dispatcher, handle)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until [`DispatcherHandle::shutdown`] is called or every handle is
    /// dropped.
    ///
    /// Returns `Err(CoordinatorError::Startup)` if the initial snapshot is
    /// malformed; nothing else stops the loop early.
    pub async fn run(mut self) -> Result<()> {
        log::info!("dispatch: running (max_batch = {})", self.config.max_batch);
        let max_batch = self.config.max_batch.max(1);

        while let Some(first) = self.rx.recv().await {
            let mut batch = Vec::with_capacity(max_batch);
            batch.push(first);
            while batch.len() < max_batch {
                match self.rx.try_recv() {
                    Ok(msg) => batch.push(msg),
                    Err(_) => break,
                }
            }

            if !self.tick(batch)? {
                break;
            }
        }

        for (_, task) in self.timers.drain() {
            task.abort();
        }
        log::info!("dispatch: stopped");
        Ok(())
    }

    /// Handle one batch.  Returns `false` on shutdown.
    fn tick(&mut self, batch: Vec<Ingress>) -> Result<bool> {
        let mut sets: Vec<(String, SettingValue)> = Vec::new();

        for msg in batch {
            match msg {
                Ingress::Event(EventKind::SettingsSet { key, value }) if self.core.is_some() => {
                    sets.push((key, value));
                }
                other => {
                    self.flush_sets(&mut sets);
                    match other {
                        Ingress::Event(kind) => self.handle_event(kind)?,
                        Ingress::Get { key, reply } => {
                            let _ = reply.send(self.get(&key));
                        }
                        Ingress::Snapshot { reply } => {
                            let _ = reply.send(self.snapshot());
                        }
                        Ingress::Subscribe(subscriber) => self.bus.add(subscriber),
                        Ingress::Shutdown => {
                            log::info!("dispatch: shutdown requested");
                            return Ok(false);
                        }
                    }
                }
            }
        }

        self.flush_sets(&mut sets);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Message handlers
    // -----------------------------------------------------------------------

    fn flush_sets(&mut self, sets: &mut Vec<(String, SettingValue)>) {
        if sets.is_empty() {
            return;
        }
        let Some(core) = self.core.as_mut() else {
            return;
        };
        log::debug!("dispatch: applying {} settings write(s)", sets.len());
        let outcome = core.apply_settings(sets.drain(..));
        self.publish(outcome);
    }

    fn handle_event(&mut self, kind: EventKind) -> Result<()> {
        let event = Event::new(self.bus.next_sequence(), kind);
        log::debug!("dispatch: #{} {}", event.sequence, event.topic);

        if let EventKind::HideDeadline { target, cycle } = event.payload {
            self.timers.remove(&(target, cycle));
        }

        match self.core.as_mut() {
            Some(core) => {
                let outcome = core.handle(&event);
                self.publish(outcome);
                Ok(())
            }
            None => match event.payload {
                EventKind::SnapshotLoaded(snapshot) => self.start(&snapshot),
                _ => {
                    log::warn!(
                        "dispatch: dropping {}: {}",
                        event.topic,
                        CoordinatorError::NotStarted
                    );
                    Ok(())
                }
            },
        }
    }

    fn start(&mut self, snapshot: &SettingsSnapshot) -> Result<()> {
        let engine = self.engine.take().ok_or(CoordinatorError::AlreadyStarted)?;
        let (core, outcome) = Coordinator::start(
            Arc::clone(&self.schema),
            engine,
            snapshot,
            self.config.hide_delay,
        )
        .map_err(|e| {
            log::error!("dispatch: {e}");
            e
        })?;

        log::info!("dispatch: settings snapshot loaded ({} entries)", snapshot.len());
        self.core = Some(core);
        self.publish(outcome);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<SettingValue> {
        let core = self.core.as_ref().ok_or(CoordinatorError::NotStarted)?;
        Ok(core.store().get(key)?)
    }

    fn snapshot(&self) -> Result<SettingsSnapshot> {
        let core = self.core.as_ref().ok_or(CoordinatorError::NotStarted)?;
        Ok(core.store().snapshot())
    }

    // -----------------------------------------------------------------------
    // Publication and timers
    // -----------------------------------------------------------------------

    fn publish(&mut self, outcome: Outcome) {
        for change in &outcome.changes {
            self.bus.publish_setting(change);
        }

        if let Some(transition) = outcome.transition {
            self.state_tx.send_replace(transition.to);
            self.bus.publish_state(transition);
        }

        for directive in outcome.directives {
            match directive {
                Directive::Emit(intent) => {
                    log::debug!("dispatch: {intent}");
                    self.bus.publish_intent(intent);
                }
                Directive::Schedule(hide) => self.arm(hide),
                Directive::Cancel(hide) => self.disarm(hide),
            }
        }

        for command in outcome.commands {
            log::debug!("dispatch: audio command {command:?}");
            self.bus.publish_command(command);
        }
    }

    fn arm(&mut self, hide: ScheduledHide) {
        let weak = self.weak_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(hide.delay).await;
            if let Some(tx) = weak.upgrade() {
                let deadline = EventKind::HideDeadline {
                    target: hide.target,
                    cycle: hide.cycle,
                };
                let _ = tx.send(Ingress::Event(deadline)).await;
            }
        });
        log::debug!(
            "dispatch: armed {:?} hide for {} (cycle {})",
            hide.delay,
            hide.target,
            hide.cycle
        );
        self.timers.insert((hide.target, hide.cycle), task);
    }

    fn disarm(&mut self, hide: ScheduledHide) {
        if let Some(task) = self.timers.remove(&(hide.target, hide.cycle)) {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// DispatcherHandle
// ---------------------------------------------------------------------------

/// Cloneable front door to a running [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Ingress>,
    schema: Arc<Schema>,
    state_rx: watch::Receiver<LifecycleState>,
    /// Set once any clone has enqueued the initial snapshot.  Anything
    /// enqueued after that point is processed after startup.
    snapshot_queued: Arc<AtomicBool>,
}

impl DispatcherHandle {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Enqueue an inbound event.
    ///
    /// Fails with [`CoordinatorError::NotStarted`] for anything but
    /// `SnapshotLoaded` until the snapshot has been enqueued.
    pub async fn publish(&self, kind: EventKind) -> Result<()> {
        let is_snapshot = self.admit(&kind)?;
        self.send(Ingress::Event(kind)).await?;
        self.mark_snapshot(is_snapshot);
        Ok(())
    }

    /// Enqueue from a plain OS thread (hotkey hooks, audio callbacks).
    ///
    /// Panics if called from inside an async context, like
    /// `mpsc::Sender::blocking_send`.
    pub fn blocking_publish(&self, kind: EventKind) -> Result<()> {
        let is_snapshot = self.admit(&kind)?;
        self.tx
            .blocking_send(Ingress::Event(kind))
            .map_err(|_| CoordinatorError::Closed)?;
        self.mark_snapshot(is_snapshot);
        Ok(())
    }

    /// Validate and enqueue a write to a primary or plain key.
    pub async fn set(&self, key: &str, value: impl Into<SettingValue>) -> Result<()> {
        let value = value.into();
        self.schema.validate_external(key, &value)?;
        self.publish(EventKind::SettingsSet {
            key: key.to_string(),
            value,
        })
        .await
    }

    /// Current value of `key`, after every previously enqueued write.
    pub async fn get(&self, key: &str) -> Result<SettingValue> {
        let (reply, rx) = oneshot::channel();
        self.send(Ingress::Get {
            key: key.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::Closed)?
    }

    pub async fn snapshot(&self) -> Result<SettingsSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Ingress::Snapshot { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::Closed)?
    }

    /// The lifecycle state as of the last settled transition.
    pub fn current_state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Changes to any of `keys`.  Unknown keys are rejected.
    pub async fn subscribe_settings(&self, keys: &[&str]) -> Result<Subscription<SettingChange>> {
        let mut wanted = BTreeSet::new();
        for key in keys {
            self.schema.require(key)?;
            wanted.insert(key.to_string());
        }
        self.subscribe_settings_filtered(Some(wanted)).await
    }

    pub async fn subscribe_all_settings(&self) -> Result<Subscription<SettingChange>> {
        self.subscribe_settings_filtered(None).await
    }

    pub async fn subscribe_state(&self) -> Result<Subscription<Transition>> {
        let (tx, sub) = Subscription::channel();
        self.send(Ingress::Subscribe(Subscriber::State(tx))).await?;
        Ok(sub)
    }

    pub async fn subscribe_visibility(
        &self,
        target: VisibilityTarget,
    ) -> Result<Subscription<VisibilityIntent>> {
        let (tx, sub) = Subscription::channel();
        self.send(Ingress::Subscribe(Subscriber::Visibility { target, tx }))
            .await?;
        Ok(sub)
    }

    /// `audio.command`: what the user asked the audio collaborator to do.
    pub async fn subscribe_commands(&self) -> Result<Subscription<RecordingCommand>> {
        let (tx, sub) = Subscription::channel();
        self.send(Ingress::Subscribe(Subscriber::Commands(tx))).await?;
        Ok(sub)
    }

    /// Ask the loop to stop after the messages already queued ahead of this
    /// one.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Ingress::Shutdown).await
    }

    async fn subscribe_settings_filtered(
        &self,
        keys: Option<BTreeSet<String>>,
    ) -> Result<Subscription<SettingChange>> {
        let (tx, sub) = Subscription::channel();
        self.send(Ingress::Subscribe(Subscriber::Settings { keys, tx }))
            .await?;
        Ok(sub)
    }

    /// Returns whether `kind` is the snapshot.
    fn admit(&self, kind: &EventKind) -> Result<bool> {
        let is_snapshot = matches!(kind, EventKind::SnapshotLoaded(_));
        if !is_snapshot && !self.snapshot_queued.load(Ordering::Acquire) {
            log::warn!("dispatch: rejecting {}: {}", kind.topic(), CoordinatorError::NotStarted);
            return Err(CoordinatorError::NotStarted);
        }
        Ok(is_snapshot)
    }

    fn mark_snapshot(&self, is_snapshot: bool) {
        if is_snapshot {
            self.snapshot_queued.store(true, Ordering::Release);
        }
    }

    async fn send(&self, msg: Ingress) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| CoordinatorError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::settings::{keys, SettingsError};
    use tokio::time::Instant;

    const DIALOG: VisibilityTarget = VisibilityTarget::RecordingDialog;
    const PROGRESS: VisibilityTarget = VisibilityTarget::ProgressWindow;

    fn snapshot(style: &str, autohide: bool) -> SettingsSnapshot {
        SettingsSnapshot::new()
            .with(keys::POPUP_STYLE, style)
            .with(keys::APPLET_AUTOHIDE, autohide)
    }

    fn spawn() -> (JoinHandle<Result<()>>, DispatcherHandle) {
        let (dispatcher, handle) = Dispatcher::new(DispatchConfig::default()).unwrap();
        (tokio::spawn(dispatcher.run()), handle)
    }

    async fn started(style: &str, autohide: bool) -> (JoinHandle<Result<()>>, DispatcherHandle) {
        let (task, handle) = spawn();
        handle
            .publish(EventKind::SnapshotLoaded(snapshot(style, autohide)))
            .await
            .unwrap();
        (task, handle)
    }

    async fn cycle(handle: &DispatcherHandle) {
        for kind in [
            EventKind::RecordingStarted,
            EventKind::RecordingStopped,
            EventKind::TranscriptionCompleted { text: "ok".into() },
        ] {
            handle.publish(kind).await.unwrap();
        }
    }

    // ---- startup -----------------------------------------------------------

    #[tokio::test]
    async fn malformed_snapshot_stops_the_loop() {
        let (task, handle) = spawn();
        let bad = SettingsSnapshot::new().with(keys::POPUP_STYLE, "applet");
        handle.publish(EventKind::SnapshotLoaded(bad)).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::Startup(SettingsError::MissingKey(keys::APPLET_AUTOHIDE.into()))
        );
        assert_eq!(
            handle.publish(EventKind::RecordingStarted).await,
            Err(CoordinatorError::Closed)
        );
    }

    #[tokio::test]
    async fn requests_before_snapshot_are_rejected() {
        let (task, handle) = spawn();
        assert_eq!(
            handle.get(keys::POPUP_STYLE).await,
            Err(CoordinatorError::NotStarted)
        );

        assert_eq!(
            handle.publish(EventKind::RecordingStarted).await,
            Err(CoordinatorError::NotStarted)
        );
        assert_eq!(
            handle.set(keys::POPUP_STYLE, "none").await,
            Err(CoordinatorError::NotStarted)
        );
        // Validation still comes first.
        assert!(matches!(
            handle.set(keys::APPLET_MODE, "off").await,
            Err(CoordinatorError::Validation(_))
        ));

        handle
            .publish(EventKind::SnapshotLoaded(snapshot("applet", true)))
            .await
            .unwrap();
        assert_eq!(
            handle.get(keys::POPUP_STYLE).await,
            Ok(SettingValue::from("applet"))
        );
        // The early requests were rejected rather than replayed.
        assert_eq!(handle.current_state(), LifecycleState::Idle);

        // Any clone may send the snapshot; every clone is admitted after it.
        let other = handle.clone();
        other.set(keys::POPUP_STYLE, "none").await.unwrap();
        assert_eq!(handle.get(keys::POPUP_STYLE).await, Ok(SettingValue::from("none")));

        handle.shutdown().await.unwrap();
        assert_eq!(task.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn second_snapshot_is_ignored() {
        let (_task, handle) = started("traditional", true).await;
        handle
            .publish(EventKind::SnapshotLoaded(snapshot("applet", false)))
            .await
            .unwrap();
        assert_eq!(
            handle.get(keys::POPUP_STYLE).await,
            Ok(SettingValue::from("traditional"))
        );
    }

    #[tokio::test]
    async fn persistent_startup_shows_dialog() {
        let (_task, handle) = spawn();
        let mut dialog = handle.subscribe_visibility(DIALOG).await.unwrap();
        handle
            .publish(EventKind::SnapshotLoaded(snapshot("applet", false)))
            .await
            .unwrap();
        let got = dialog.recv().await.unwrap();
        assert_eq!(got.payload, VisibilityIntent::show(DIALOG));
    }

    // ---- settings ----------------------------------------------------------

    #[tokio::test]
    async fn set_rejects_invalid_writes_up_front() {
        let (_task, handle) = started("applet", true).await;
        assert_eq!(
            handle.set(keys::APPLET_MODE, "off").await,
            Err(CoordinatorError::Validation(SettingsError::DerivedKey(
                keys::APPLET_MODE.into()
            )))
        );
        assert!(matches!(
            handle.set(keys::POPUP_STYLE, true).await,
            Err(CoordinatorError::Validation(SettingsError::WrongType { .. }))
        ));
        assert!(matches!(
            handle.subscribe_settings(&["theme"]).await,
            Err(CoordinatorError::Validation(SettingsError::UnknownKey(_)))
        ));
    }

    #[tokio::test]
    async fn get_reads_its_own_writes() {
        let (_task, handle) = started("applet", true).await;
        handle.set(keys::APPLET_AUTOHIDE, false).await.unwrap();
        assert_eq!(
            handle.get(keys::APPLET_MODE).await,
            Ok(SettingValue::from("persistent"))
        );
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.get(keys::SHOW_RECORDING_DIALOG), Some(&SettingValue::Bool(true)));
    }

    #[tokio::test]
    async fn rapid_style_changes_settle_once() {
        let (_task, handle) = spawn();
        let mut changes = handle.subscribe_all_settings().await.unwrap();
        handle
            .publish(EventKind::SnapshotLoaded(snapshot("none", true)))
            .await
            .unwrap();
        handle.set(keys::POPUP_STYLE, "traditional").await.unwrap();
        handle.set(keys::POPUP_STYLE, "applet").await.unwrap();
        // Round trip so the batch has been processed.
        handle.get(keys::POPUP_STYLE).await.unwrap();

        let mut seen = Vec::new();
        while let Some(env) = changes.try_recv() {
            seen.push(env.payload);
        }
        assert!(
            seen.iter().all(|c| c.key != keys::SHOW_PROGRESS_WINDOW),
            "transient traditional row leaked: {seen:?}"
        );
        let last = seen.iter().rev().find(|c| c.key == keys::APPLET_MODE).unwrap();
        assert_eq!(last.new, SettingValue::from("popup"));
    }

    #[tokio::test]
    async fn replayed_change_stream_never_enables_both_windows() {
        let rows = [
            ("none", true),
            ("traditional", true),
            ("applet", true),
            ("applet", false),
        ];
        for (from_style, from_autohide) in rows {
            for (to_style, to_autohide) in rows {
                let (_task, handle) = started(from_style, from_autohide).await;
                let mut changes = handle.subscribe_all_settings().await.unwrap();
                let mut mirror = handle.snapshot().await.unwrap();

                handle.set(keys::POPUP_STYLE, to_style).await.unwrap();
                handle.set(keys::APPLET_AUTOHIDE, to_autohide).await.unwrap();
                handle.get(keys::POPUP_STYLE).await.unwrap();

                while let Some(env) = changes.try_recv() {
                    let SettingChange { key, new, .. } = env.payload;
                    mirror = mirror.with(&key, new);
                    let on = |k: &str| mirror.get(k) == Some(&SettingValue::Bool(true));
                    assert!(
                        !(on(keys::SHOW_PROGRESS_WINDOW) && on(keys::SHOW_RECORDING_DIALOG)),
                        "{from_style}/{from_autohide} -> {to_style}/{to_autohide}: \
                         both enabled at seq {}",
                        env.sequence
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn filtered_settings_subscription() {
        let (_task, handle) = started("applet", true).await;
        let mut mode = handle.subscribe_settings(&[keys::APPLET_MODE]).await.unwrap();
        handle.set(keys::RECORD_HOTKEY, "f9").await.unwrap();
        handle.set(keys::POPUP_STYLE, "none").await.unwrap();

        let got = mode.recv().await.unwrap();
        assert_eq!(got.payload.key, keys::APPLET_MODE);
        assert_eq!(got.payload.new, SettingValue::from("off"));
        handle.get(keys::POPUP_STYLE).await.unwrap();
        assert!(mode.try_recv().is_none());
    }

    // ---- lifecycle ---------------------------------------------------------

    #[tokio::test]
    async fn state_changes_arrive_in_order() {
        let (_task, handle) = started("traditional", true).await;
        let mut states = handle.subscribe_state().await.unwrap();
        cycle(&handle).await;

        let mut last_seq = 0;
        let mut path = Vec::new();
        for _ in 0..3 {
            let env = states.recv().await.unwrap();
            assert!(env.sequence > last_seq);
            last_seq = env.sequence;
            path.push(env.payload.to);
        }
        assert_eq!(
            path,
            vec![
                LifecycleState::Recording,
                LifecycleState::Transcribing,
                LifecycleState::Idle
            ]
        );
        assert_eq!(handle.current_state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn toggle_publishes_a_command_without_moving_state() {
        let (_task, handle) = started("applet", true).await;
        let mut commands = handle.subscribe_commands().await.unwrap();
        handle.publish(EventKind::ToggleRequested).await.unwrap();

        let got = commands.recv().await.unwrap();
        assert_eq!(got.payload, RecordingCommand::Start);
        assert_eq!(got.topic.as_str(), "audio.command");
        assert_eq!(handle.current_state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn style_switch_mid_recording_hides_before_showing() {
        let (_task, handle) = started("traditional", true).await;
        let mut dialog = handle.subscribe_visibility(DIALOG).await.unwrap();
        let mut progress = handle.subscribe_visibility(PROGRESS).await.unwrap();
        handle.publish(EventKind::RecordingStarted).await.unwrap();
        handle.set(keys::POPUP_STYLE, "applet").await.unwrap();
        // Settle the first switch on its own before switching back.
        handle.get(keys::POPUP_STYLE).await.unwrap();
        handle.set(keys::POPUP_STYLE, "traditional").await.unwrap();
        handle.get(keys::POPUP_STYLE).await.unwrap();

        let mut merged = Vec::new();
        while let Some(env) = dialog.try_recv() {
            merged.push(env);
        }
        while let Some(env) = progress.try_recv() {
            merged.push(env);
        }
        merged.sort_by_key(|env| env.sequence);
        assert_eq!(merged.len(), 5, "{merged:?}");

        let mut on_screen = HashSet::new();
        for env in &merged {
            let target = env.payload.target;
            if env.payload.is_show() {
                on_screen.insert(target);
            } else {
                on_screen.remove(&target);
            }
            assert!(on_screen.len() <= 1, "both windows shown at seq {}", env.sequence);
        }
        assert_eq!(on_screen.into_iter().collect::<Vec<_>>(), vec![PROGRESS]);
    }

    #[test]
    fn blocking_publish_from_an_os_thread() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (dispatcher, handle) = Dispatcher::new(DispatchConfig::default()).unwrap();
        let task = rt.spawn(dispatcher.run());

        let producer = handle.clone();
        std::thread::spawn(move || {
            producer
                .blocking_publish(EventKind::SnapshotLoaded(snapshot("applet", true)))
                .unwrap();
            producer.blocking_publish(EventKind::RecordingStarted).unwrap();
        })
        .join()
        .unwrap();

        rt.block_on(async {
            handle.get(keys::POPUP_STYLE).await.unwrap();
            assert_eq!(handle.current_state(), LifecycleState::Recording);
            handle.shutdown().await.unwrap();
            task.await.unwrap().unwrap();
        });
    }

    // ---- debounce ----------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn popup_hides_after_delay() {
        let (_task, handle) = started("applet", true).await;
        let mut dialog = handle.subscribe_visibility(DIALOG).await.unwrap();
        cycle(&handle).await;

        let shown = dialog.recv().await.unwrap();
        assert_eq!(shown.payload, VisibilityIntent::show(DIALOG));

        let t0 = Instant::now();
        let hidden = dialog.recv().await.unwrap();
        assert!(!hidden.payload.is_show());
        assert!(t0.elapsed() >= Duration::from_millis(500));
        assert!(hidden.sequence > shown.sequence);
    }

    #[tokio::test(start_paused = true)]
    async fn show_before_deadline_cancels_hide() {
        let (_task, handle) = started("applet", true).await;
        let mut dialog = handle.subscribe_visibility(DIALOG).await.unwrap();
        cycle(&handle).await;
        handle.publish(EventKind::RecordingStarted).await.unwrap();

        assert!(dialog.recv().await.unwrap().payload.is_show());
        assert!(dialog.recv().await.unwrap().payload.is_show());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(dialog.try_recv().is_none());
        assert_eq!(handle.current_state(), LifecycleState::Recording);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_hide_delay_is_honoured() {
        let config = DispatchConfig {
            hide_delay: Duration::from_millis(1500),
            ..DispatchConfig::default()
        };
        let (dispatcher, handle) = Dispatcher::new(config).unwrap();
        tokio::spawn(dispatcher.run());
        handle
            .publish(EventKind::SnapshotLoaded(snapshot("applet", true)))
            .await
            .unwrap();
        let mut dialog = handle.subscribe_visibility(DIALOG).await.unwrap();
        cycle(&handle).await;

        dialog.recv().await.unwrap();
        let t0 = Instant::now();
        dialog.recv().await.unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(1500));
    }
}
