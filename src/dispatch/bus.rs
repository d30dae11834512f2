//! Outbound fan-out to subscribers.
//!
//! Each subscriber owns an unbounded `tokio::sync::mpsc` receiver wrapped in
//! a [`Subscription`].  The [`Bus`] lives on the dispatch task, stamps every
//! publication with the next sequence number and drops senders whose
//! receiver has gone away.

use std::collections::BTreeSet;

use tokio::sync::mpsc;

use crate::lifecycle::{RecordingCommand, Transition};
use crate::settings::SettingChange;
use crate::visibility::{VisibilityIntent, VisibilityTarget};

use super::event::Topic;

// ---------------------------------------------------------------------------
// Envelope / Subscription
// ---------------------------------------------------------------------------

/// One delivered publication.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub sequence: u64,
    pub topic: Topic,
    pub payload: T,
}

/// Receiving end of a subscription.  Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Envelope<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<Envelope<T>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next envelope.  `None` once the dispatcher has stopped
    /// and everything buffered has been read.
    pub async fn recv(&mut self) -> Option<Envelope<T>> {
        self.rx.recv().await
    }

    /// Take an already delivered envelope without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope<T>> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// A registration request carried through the ingress queue.
#[derive(Debug)]
pub(crate) enum Subscriber {
    /// `keys = None` means every key.
    Settings {
        keys: Option<BTreeSet<String>>,
        tx: mpsc::UnboundedSender<Envelope<SettingChange>>,
    },
    State(mpsc::UnboundedSender<Envelope<Transition>>),
    Visibility {
        target: VisibilityTarget,
        tx: mpsc::UnboundedSender<Envelope<VisibilityIntent>>,
    },
    Commands(mpsc::UnboundedSender<Envelope<RecordingCommand>>),
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

type Sink<T> = mpsc::UnboundedSender<Envelope<T>>;

#[derive(Debug, Default)]
pub(crate) struct Bus {
    sequence: u64,
    settings: Vec<(Option<BTreeSet<String>>, Sink<SettingChange>)>,
    state: Vec<Sink<Transition>>,
    visibility: Vec<(VisibilityTarget, Sink<VisibilityIntent>)>,
    commands: Vec<Sink<RecordingCommand>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next sequence number.  Shared by inbound events and
    /// outbound publications so the whole stream is totally ordered.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn add(&mut self, subscriber: Subscriber) {
        match subscriber {
            Subscriber::Settings { keys, tx } => self.settings.push((keys, tx)),
            Subscriber::State(tx) => self.state.push(tx),
            Subscriber::Visibility { target, tx } => self.visibility.push((target, tx)),
            Subscriber::Commands(tx) => self.commands.push(tx),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.settings.len() + self.state.len() + self.visibility.len() + self.commands.len()
    }

    pub fn publish_setting(&mut self, change: &SettingChange) {
        let sequence = self.next_sequence();
        self.settings.retain(|(keys, tx)| {
            let wanted = keys.as_ref().map_or(true, |k| k.contains(&change.key));
            !wanted || deliver(tx, sequence, Topic::SettingsChanged, change.clone())
        });
    }

    pub fn publish_state(&mut self, transition: Transition) {
        let sequence = self.next_sequence();
        self.state
            .retain(|tx| deliver(tx, sequence, Topic::StateChanged, transition));
    }

    pub fn publish_intent(&mut self, intent: VisibilityIntent) {
        let sequence = self.next_sequence();
        let topic = Topic::Visibility(intent.target);
        self.visibility.retain(|(target, tx)| {
            *target != intent.target || deliver(tx, sequence, topic, intent)
        });
    }

    pub fn publish_command(&mut self, command: RecordingCommand) {
        let sequence = self.next_sequence();
        self.commands
            .retain(|tx| deliver(tx, sequence, Topic::AudioCommand, command));
    }
}

/// Send one envelope.  Returns `false` when the subscriber is gone.
fn deliver<T>(tx: &Sink<T>, sequence: u64, topic: Topic, payload: T) -> bool {
    let ok = tx
        .send(Envelope {
            sequence,
            topic,
            payload,
        })
        .is_ok();
    if !ok {
        log::debug!("dispatch: pruning closed {topic} subscriber");
    }
    ok
}
