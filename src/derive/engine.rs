//! Derivation engine: recomputes derived settings from primary settings.
//!
//! Rules are registered once, before the store exists, and validated against
//! the [`Schema`]:
//!
//! * a rule may only read primary or plain keys (never a derived key, which
//!   would let derivation trigger itself),
//! * a rule may only write derived keys,
//! * each derived key is owned by exactly one rule.
//!
//! The engine borrows the store mutably for the duration of a settle, so two
//! derivation passes can never interleave.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::settings::{KeyRole, Schema, SettingChange, SettingValue, SettingsSnapshot, SettingsStore};

use super::popup::PopupStyleRule;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A rule had no row for the current primary combination.
///
/// Non-fatal: the engine applies the rule's fallback and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("derivation rule {rule:?} has no row for {inputs}")]
pub struct DerivationGap {
    pub rule: &'static str,
    pub inputs: String,
}

/// A rule could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("rule {rule:?} references unknown key {key:?}")]
    UnknownKey { rule: &'static str, key: &'static str },

    #[error("rule {rule:?} reads derived key {key:?}")]
    ReadsDerivedKey { rule: &'static str, key: &'static str },

    #[error("rule {rule:?} writes non-derived key {key:?}")]
    WritesNonDerivedKey { rule: &'static str, key: &'static str },

    #[error("rule {rule:?} writes {key:?}, already owned by {owner:?}")]
    DuplicateOutput {
        rule: &'static str,
        key: &'static str,
        owner: &'static str,
    },
}

// ---------------------------------------------------------------------------
// DerivationRule
// ---------------------------------------------------------------------------

/// A total mapping from a tuple of input keys to a tuple of derived keys.
pub trait DerivationRule: Send {
    fn name(&self) -> &'static str;

    /// Keys this rule reads.  A change to any of them triggers the rule.
    fn inputs(&self) -> &'static [&'static str];

    /// Keys this rule writes.
    fn outputs(&self) -> &'static [&'static str];

    /// Compute every output from `snapshot`.
    fn derive(
        &self,
        snapshot: &SettingsSnapshot,
    ) -> Result<Vec<(&'static str, SettingValue)>, DerivationGap>;

    /// Outputs to apply when [`derive`](Self::derive) reports a gap.
    fn fallback(&self) -> Vec<(&'static str, SettingValue)>;
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Result of one settle pass.
#[derive(Debug, Default)]
pub struct Derivation {
    /// Derived values that actually changed.
    pub changes: Vec<SettingChange>,
    /// Rules that fell back to their safe outputs.
    pub gaps: Vec<DerivationGap>,
}

// ---------------------------------------------------------------------------
// DerivationEngine
// ---------------------------------------------------------------------------

/// Registry of [`DerivationRule`]s.
#[derive(Default)]
pub struct DerivationEngine {
    rules: Vec<Box<dyn DerivationRule>>,
}

impl std::fmt::Debug for DerivationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivationEngine")
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl DerivationEngine {
    /// An engine with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with the shipped [`PopupStyleRule`] registered.
    pub fn standard(schema: &Schema) -> Result<Self, RegistrationError> {
        let mut engine = Self::new();
        engine.register(schema, Box::new(PopupStyleRule))?;
        Ok(engine)
    }

    /// Add a rule.  Existing rules are unaffected.
    pub fn register(
        &mut self,
        schema: &Schema,
        rule: Box<dyn DerivationRule>,
    ) -> Result<(), RegistrationError> {
        let name = rule.name();

        for &key in rule.inputs() {
            let spec = schema
                .spec(key)
                .ok_or(RegistrationError::UnknownKey { rule: name, key })?;
            if spec.role == KeyRole::Derived {
                return Err(RegistrationError::ReadsDerivedKey { rule: name, key });
            }
        }

        for &key in rule.outputs() {
            let spec = schema
                .spec(key)
                .ok_or(RegistrationError::UnknownKey { rule: name, key })?;
            if spec.role != KeyRole::Derived {
                return Err(RegistrationError::WritesNonDerivedKey { rule: name, key });
            }
            if let Some(owner) = self.rules.iter().find(|r| r.outputs().contains(&key)) {
                return Err(RegistrationError::DuplicateOutput {
                    rule: name,
                    key,
                    owner: owner.name(),
                });
            }
        }

        log::debug!("derive: registered rule {name:?}");
        self.rules.push(rule);
        Ok(())
    }

    /// `true` when a change to `key` would trigger at least one rule.
    pub fn is_trigger(&self, key: &str) -> bool {
        self.rules.iter().any(|r| r.inputs().contains(&key))
    }

    /// Run the rules whose inputs intersect `touched`.
    pub fn settle(&self, store: &mut SettingsStore, touched: &BTreeSet<String>) -> Derivation {
        self.run(store, |rule| {
            rule.inputs().iter().any(|k| touched.contains(*k))
        })
    }

    /// Run every rule.  Used once at startup.
    pub fn settle_all(&self, store: &mut SettingsStore) -> Derivation {
        self.run(store, |_| true)
    }

    fn run<F>(&self, store: &mut SettingsStore, selected: F) -> Derivation
    where
        F: Fn(&dyn DerivationRule) -> bool,
    {
        let mut result = Derivation::default();

        for rule in &self.rules {
            if !selected(&**rule) {
                continue;
            }

            // Each rule sees the store as left by the previous one.
            let snapshot = store.snapshot();
            let outputs = match rule.derive(&snapshot) {
                Ok(outputs) => outputs,
                Err(gap) => {
                    log::warn!("derive: {gap}; applying fallback");
                    result.gaps.push(gap);
                    rule.fallback()
                }
            };

            let mut changes = Vec::new();
            for (key, value) in outputs {
                match store.write_derived(key, value) {
                    Ok(Some(change)) => changes.push(change),
                    Ok(None) => {}
                    Err(e) => log::error!("derive: rule {:?} produced {e}", rule.name()),
                }
            }
            // Flags switching off go out before flags switching on, so a
            // subscriber replaying the stream never holds two exclusive
            // flags at once.
            changes.sort_by_key(|c| c.new == SettingValue::Bool(true));
            result.changes.extend(changes);
        }

        if !result.changes.is_empty() {
            log::debug!("derive: settled with {} change(s)", result.changes.len());
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
