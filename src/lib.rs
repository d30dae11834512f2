//! Coordination core for a push-to-talk dictation app.
//!
//! The crate keeps three things consistent with each other: the user's
//! settings (including the keys derived from them), the recording lifecycle,
//! and which windows should be on screen.  Every input goes through one
//! ordered queue ([`dispatch::Dispatcher`]), so no subscriber can observe a
//! combination of state that never existed.
//!
//! * [`settings`]: typed key/value store with a fixed schema.
//! * [`derive`]: rules that recompute derived keys (`popup_style` table).
//! * [`lifecycle`]: `Idle / Recording / Transcribing / Error` state machine.
//! * [`visibility`]: show/hide intents with a debounced popup hide.
//! * [`coordinator`]: the synchronous settle unit tying the above together.
//! * [`dispatch`]: the async queue, subscriber fan-out and debounce timers.
//! * [`config`]: `coordinator.toml`, paths and the persisted settings file.

pub mod config;
pub mod coordinator;
pub mod derive;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod settings;
pub mod visibility;

pub use error::{CoordinatorError, Result};
