//! Event dispatch: the single ordered queue every input goes through.
//!
//! * [`event`]: topics and inbound payloads.
//! * [`bus`]: outbound fan-out with per-subscriber channels.
//! * [`runner`]: the [`Dispatcher`] loop and its [`DispatcherHandle`].
//!
//! # Architecture
//!
//! ```text
//! audio / transcription / UI / persistence
//!        │  DispatcherHandle::publish, set, get
//!        ▼
//! ingress mpsc (bounded, FIFO)
//!        │
//!        ▼
//! Dispatcher::run()  ← async tokio task, sole owner of the Coordinator
//!        │
//!        ├─ settings.changed        → Subscription<SettingChange>
//!        ├─ state.changed           → Subscription<Transition>
//!        ├─ visibility.<target>     → Subscription<VisibilityIntent>
//!        └─ audio.command           → Subscription<RecordingCommand>
//! ```

pub mod bus;
pub mod event;
pub mod runner;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use bus::{Envelope, Subscription};
pub use event::{Event, EventKind, Topic};
pub use runner::{DispatchConfig, Dispatcher, DispatcherHandle};
