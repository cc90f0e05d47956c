//! Per-endpoint secret slots, one per lifecycle phase.

use crate::core::TemporarySecret;

/// Live phase of a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Period before the current one; still accepts late incoming streams.
    Old,
    /// Period used for outgoing streams.
    Current,
    /// Period after the current one; accepts streams from peers whose
    /// clocks run ahead.
    New,
}

impl Phase {
    /// All phases, oldest first.
    pub const ALL: [Phase; 3] = [Phase::Old, Phase::Current, Phase::New];

    fn index(self) -> usize {
        match self {
            Phase::Old => 0,
            Phase::Current => 1,
            Phase::New => 2,
        }
    }

    /// The period this phase holds when `current` is the current period.
    pub fn target_period(self, current: u64) -> Option<u64> {
        match self {
            Phase::Old => current.checked_sub(1),
            Phase::Current => Some(current),
            Phase::New => current.checked_add(1),
        }
    }
}

/// At most one secret per phase for a single endpoint.
#[derive(Debug, Clone, Default)]
pub struct SecretSlots {
    slots: [Option<TemporarySecret>; 3],
}

impl SecretSlots {
    /// Create empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Secret held in `phase`.
    pub fn get(&self, phase: Phase) -> Option<&TemporarySecret> {
        self.slots[phase.index()].as_ref()
    }

    /// Put a secret in `phase`, returning the one it replaces.
    pub fn set(&mut self, phase: Phase, secret: TemporarySecret) -> Option<TemporarySecret> {
        self.slots[phase.index()].replace(secret)
    }

    /// Phases with no secret.
    pub fn missing(&self) -> impl Iterator<Item = Phase> + '_ {
        Phase::ALL.into_iter().filter(|p| self.get(*p).is_none())
    }

    /// Held secrets, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TemporarySecret> {
        self.slots.iter().flatten()
    }

    /// Move the held secrets out, oldest first.
    pub fn into_secrets(self) -> impl Iterator<Item = TemporarySecret> {
        self.slots.into_iter().flatten()
    }

    /// Period held in each phase.
    pub fn periods(&self) -> [Option<u64>; 3] {
        Phase::ALL.map(|p| self.get(p).map(|s| s.period))
    }

    /// Check if every phase is filled.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Check if no phase is filled.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
