//! Application entry point: a JSON-lines bridge around the dispatcher.
//!
//! The audio, transcription and UI collaborators talk to this process over
//! stdio.  Each stdin line is one inbound event; each stdout line is one
//! outbound publication.  Logs go to stderr.
//!
//! ```text
//! stdin  {"topic":"audio.recording_started"}
//!        {"topic":"settings.set","key":"popup_style","value":"traditional"}
//! stdout {"topic":"state.changed","sequence":4,"from":"idle","to":"recording",...}
//!        {"topic":"visibility.recording_dialog","sequence":5,"action":"show",...}
//! ```
//!
//! # Startup sequence
//!
//! 1. Load [`AppConfig`] from disk (returns default on first run).
//! 2. Initialise logging at the configured level.
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Load `settings.toml`, writing defaults on first run.
//! 5. Subscribe the stdout printer to every outbound topic.
//! 6. Spawn the dispatcher and publish the loaded snapshot.
//! 7. Forward stdin until EOF, then shut the dispatcher down.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use voice_coordinator::{
    config::{snapshot, AppConfig, AppPaths},
    dispatch::{Dispatcher, DispatcherHandle, Envelope, EventKind, Subscription},
    lifecycle::{RecordingCommand, Transition},
    settings::{KeyRole, Schema, SettingChange, SettingValue},
    visibility::{VisibilityIntent, VisibilityTarget},
};

// ---------------------------------------------------------------------------
// Inbound protocol
// ---------------------------------------------------------------------------

/// One stdin line.
#[derive(Debug, Deserialize)]
#[serde(tag = "topic")]
enum Inbound {
    #[serde(rename = "audio.recording_started")]
    RecordingStarted,
    #[serde(rename = "audio.recording_stopped")]
    RecordingStopped,
    #[serde(rename = "audio.capture_failed")]
    CaptureFailed {
        #[serde(default)]
        reason: String,
    },
    #[serde(rename = "transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "transcription.failed")]
    TranscriptionFailed {
        #[serde(default)]
        reason: String,
    },
    #[serde(rename = "ui.toggle_requested")]
    ToggleRequested,
    #[serde(rename = "ui.dismiss_requested")]
    DismissRequested,
    #[serde(rename = "settings.set")]
    SettingsSet { key: String, value: SettingValue },
    #[serde(rename = "settings.get")]
    SettingsGet { key: String },
    #[serde(rename = "state.current")]
    StateCurrent,
}

async fn forward(handle: &DispatcherHandle, line: &str) {
    let inbound: Inbound = match serde_json::from_str(line) {
        Ok(inbound) => inbound,
        Err(e) => {
            log::warn!("bridge: ignoring malformed line ({e}): {line}");
            return;
        }
    };

    let result = match inbound {
        Inbound::RecordingStarted => handle.publish(EventKind::RecordingStarted).await,
        Inbound::RecordingStopped => handle.publish(EventKind::RecordingStopped).await,
        Inbound::CaptureFailed { reason } => {
            handle.publish(EventKind::CaptureFailed { reason }).await
        }
        Inbound::TranscriptionCompleted { text } => {
            handle
                .publish(EventKind::TranscriptionCompleted { text })
                .await
        }
        Inbound::TranscriptionFailed { reason } => {
            handle
                .publish(EventKind::TranscriptionFailed { reason })
                .await
        }
        Inbound::ToggleRequested => handle.publish(EventKind::ToggleRequested).await,
        Inbound::DismissRequested => handle.publish(EventKind::DismissRequested).await,
        Inbound::SettingsSet { key, value } => handle.set(&key, value).await,
        Inbound::SettingsGet { key } => match handle.get(&key).await {
            Ok(value) => {
                emit(&json!({ "topic": "settings.value", "key": key, "value": value }));
                Ok(())
            }
            Err(e) => Err(e),
        },
        Inbound::StateCurrent => {
            emit(&json!({ "topic": "state.current", "state": handle.current_state() }));
            Ok(())
        }
    };

    if let Err(e) = result {
        log::warn!("bridge: {e}");
        emit(&json!({ "topic": "error", "message": e.to_string() }));
    }
}

// ---------------------------------------------------------------------------
// Outbound protocol
// ---------------------------------------------------------------------------

fn emit(line: &Value) -> bool {
    writeln!(std::io::stdout(), "{line}").is_ok()
}

fn setting_line(env: &Envelope<SettingChange>) -> Value {
    json!({
        "topic": env.topic.as_str(),
        "sequence": env.sequence,
        "key": env.payload.key,
        "old": env.payload.old,
        "new": env.payload.new,
    })
}

fn state_line(env: &Envelope<Transition>) -> Value {
    json!({
        "topic": env.topic.as_str(),
        "sequence": env.sequence,
        "from": env.payload.from,
        "to": env.payload.to,
        "trigger": env.payload.trigger.to_string(),
    })
}

fn intent_line(env: &Envelope<VisibilityIntent>) -> Value {
    json!({
        "topic": env.topic.as_str(),
        "sequence": env.sequence,
        "action": env.payload.action,
        "delay_ms": env.payload.deadline.map(|d| d.as_millis() as u64),
    })
}

fn command_line(env: &Envelope<RecordingCommand>) -> Value {
    json!({
        "topic": env.topic.as_str(),
        "sequence": env.sequence,
        "command": env.payload,
    })
}

struct Outbound {
    settings: Subscription<SettingChange>,
    states: Subscription<Transition>,
    dialog: Subscription<VisibilityIntent>,
    progress: Subscription<VisibilityIntent>,
    commands: Subscription<RecordingCommand>,
}

impl Outbound {
    async fn subscribe(handle: &DispatcherHandle) -> voice_coordinator::Result<Self> {
        Ok(Self {
            settings: handle.subscribe_all_settings().await?,
            states: handle.subscribe_state().await?,
            dialog: handle
                .subscribe_visibility(VisibilityTarget::RecordingDialog)
                .await?,
            progress: handle
                .subscribe_visibility(VisibilityTarget::ProgressWindow)
                .await?,
            commands: handle.subscribe_commands().await?,
        })
    }
}

/// Print every publication until the dispatcher stops, mirroring user
/// settings changes to `settings.toml`.
async fn print_outbound(
    mut out: Outbound,
    handle: DispatcherHandle,
    schema: Arc<Schema>,
    settings_file: PathBuf,
) {
    loop {
        let line = tokio::select! {
            Some(env) = out.settings.recv() => {
                let persisted = schema
                    .spec(&env.payload.key)
                    .map_or(false, |s| s.role != KeyRole::Derived);
                if persisted {
                    mirror(&handle, &schema, &settings_file).await;
                }
                setting_line(&env)
            }
            Some(env) = out.states.recv() => state_line(&env),
            Some(env) = out.dialog.recv() => intent_line(&env),
            Some(env) = out.progress.recv() => intent_line(&env),
            Some(env) = out.commands.recv() => command_line(&env),
            else => break,
        };
        if !emit(&line) {
            log::warn!("bridge: stdout closed");
            break;
        }
    }
}

async fn mirror(handle: &DispatcherHandle, schema: &Arc<Schema>, path: &Path) {
    let current = match handle.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            log::debug!("bridge: not mirroring settings: {e}");
            return;
        }
    };
    let schema = Arc::clone(schema);
    let path = path.to_path_buf();
    let saved = tokio::task::spawn_blocking(move || snapshot::save(&path, &schema, &current)).await;
    match saved {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("bridge: failed to save settings: {e:#}"),
        Err(e) => log::warn!("bridge: settings writer panicked: {e}"),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

async fn run(config: AppConfig, paths: AppPaths) -> Result<()> {
    let (dispatcher, handle) = Dispatcher::new(config.dispatch_config())?;
    let schema = Arc::clone(handle.schema());
    let initial = snapshot::load_or_init(&paths.settings_file, &schema)?;

    // Subscribe first so startup intents are printed too.
    let outbound = Outbound::subscribe(&handle).await?;
    let mut dispatch_task = tokio::spawn(dispatcher.run());
    let printer = tokio::spawn(print_outbound(
        outbound,
        handle.clone(),
        Arc::clone(&schema),
        paths.settings_file.clone(),
    ));

    handle.publish(EventKind::SnapshotLoaded(initial)).await?;
    log::info!("bridge: reading events from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let finished = loop {
        tokio::select! {
            joined = &mut dispatch_task => break joined,
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => forward(&handle, &line).await,
                None => {
                    log::info!("bridge: stdin closed, shutting down");
                    let _ = handle.shutdown().await;
                    break (&mut dispatch_task).await;
                }
            },
        }
    };

    finished??;
    drop(handle);
    printer.await?;
    Ok(())
}

fn main() -> Result<()> {
    // 1. Configuration
    let paths = AppPaths::new();
    let loaded = AppConfig::load_from(&paths.config_file);
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // 2. Logging (stderr; stdout carries the protocol)
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
    log::info!("voice-coordinator starting up");
    if let Err(e) = &loaded {
        log::warn!("Failed to load config ({e}); using defaults");
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let result = rt.block_on(run(config, paths));

    // A pending stdin read would otherwise hold the runtime open.
    rt.shutdown_timeout(Duration::from_millis(100));
    result
}
