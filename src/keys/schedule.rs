//! Lifecycle arithmetic for temporary secrets.
//!
//! With epoch `E` and rotation period `R`, the secret of period `p` is
//!
//! ```text
//! created      at E + R * (p - 2)
//! activated    at created   + R     (becomes current)
//! deactivated  at activated + R     (becomes old)
//! destroyed    at deactivated + R   (dead)
//! ```
//!
//! so at any instant after the epoch exactly three consecutive periods are
//! live. Times are computed in `i128` because early periods start before
//! the epoch.

use std::time::Duration;

use super::slots::Phase;

/// Rotation period (ms) of a transport.
pub fn rotation_period(max_latency: u64, max_clock_difference: Duration) -> u64 {
    max_latency.saturating_add(max_clock_difference.as_millis() as u64)
}

/// The period whose secret is current at `now`.
///
/// Returns `None` before the epoch, when no full set of secrets can be live.
pub fn current_period(epoch: u64, rotation: u64, now: u64) -> Option<u64> {
    if now < epoch || rotation == 0 {
        return None;
    }
    Some((now - epoch) / rotation + 1)
}

/// Where a secret is in its lifecycle at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The creation time lies in the future.
    NotYetCreated,
    /// The secret is held in the given phase.
    Live(Phase),
    /// The destruction time has passed.
    Dead,
}

/// Creation, activation, deactivation and destruction times of one secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretSchedule {
    /// Creation time (ms, may be negative).
    pub creation: i128,
    /// Activation time.
    pub activation: i128,
    /// Deactivation time.
    pub deactivation: i128,
    /// Destruction time.
    pub destruction: i128,
}

impl SecretSchedule {
    /// Compute the schedule of period `period`.
    pub fn new(epoch: u64, rotation: u64, period: u64) -> Self {
        let rotation = i128::from(rotation);
        let creation = i128::from(epoch) + rotation * (i128::from(period) - 2);
        let activation = creation + rotation;
        let deactivation = activation + rotation;
        let destruction = deactivation + rotation;
        Self {
            creation,
            activation,
            deactivation,
            destruction,
        }
    }

    /// Classify the secret at `now`.
    pub fn lifecycle(&self, now: u64) -> Lifecycle {
        let now = i128::from(now);
        if now >= self.destruction {
            Lifecycle::Dead
        } else if now >= self.deactivation {
            Lifecycle::Live(Phase::Old)
        } else if now >= self.activation {
            Lifecycle::Live(Phase::Current)
        } else if now >= self.creation {
            Lifecycle::Live(Phase::New)
        } else {
            Lifecycle::NotYetCreated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPOCH: u64 = 1_000_000_000;
    // 30 s latency plus one hour.
    const ROTATION: u64 = 3_630_000;

    #[test]
    fn test_rotation_period() {
        assert_eq!(rotation_period(30_000, Duration::from_secs(3600)), ROTATION);
    }

    #[test]
    fn test_schedule_spacing() {
        let s = SecretSchedule::new(EPOCH, ROTATION, 0);
        assert_eq!(s.creation, i128::from(EPOCH) - 2 * i128::from(ROTATION));
        assert_eq!(s.activation - s.creation, i128::from(ROTATION));
        assert_eq!(s.deactivation - s.activation, i128::from(ROTATION));
        assert_eq!(s.destruction - s.deactivation, i128::from(ROTATION));
    }

    #[test]
    fn test_phases_just_after_epoch() {
        let now = EPOCH + 1;
        assert_eq!(current_period(EPOCH, ROTATION, now), Some(1));

        let phase = |p| SecretSchedule::new(EPOCH, ROTATION, p).lifecycle(now);
        assert_eq!(phase(0), Lifecycle::Live(Phase::Old));
        assert_eq!(phase(1), Lifecycle::Live(Phase::Current));
        assert_eq!(phase(2), Lifecycle::Live(Phase::New));
        assert_eq!(phase(3), Lifecycle::NotYetCreated);
    }

    #[test]
    fn test_phases_after_one_rotation() {
        let now = EPOCH + ROTATION + 1;
        assert_eq!(current_period(EPOCH, ROTATION, now), Some(2));

        let phase = |p| SecretSchedule::new(EPOCH, ROTATION, p).lifecycle(now);
        assert_eq!(phase(0), Lifecycle::Dead);
        assert_eq!(phase(1), Lifecycle::Live(Phase::Old));
        assert_eq!(phase(2), Lifecycle::Live(Phase::Current));
        assert_eq!(phase(3), Lifecycle::Live(Phase::New));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let s = SecretSchedule::new(EPOCH, ROTATION, 5);
        let at = |t: i128| s.lifecycle(t as u64);
        assert_eq!(at(s.creation - 1), Lifecycle::NotYetCreated);
        assert_eq!(at(s.creation), Lifecycle::Live(Phase::New));
        assert_eq!(at(s.activation), Lifecycle::Live(Phase::Current));
        assert_eq!(at(s.deactivation), Lifecycle::Live(Phase::Old));
        assert_eq!(at(s.destruction), Lifecycle::Dead);
    }

    #[test]
    fn test_current_period_matches_schedule() {
        for offset in [0, 1, ROTATION - 1, ROTATION, 7 * ROTATION + 12_345] {
            let now = EPOCH + offset;
            let p = current_period(EPOCH, ROTATION, now).unwrap();
            let lifecycle = SecretSchedule::new(EPOCH, ROTATION, p).lifecycle(now);
            assert_eq!(lifecycle, Lifecycle::Live(Phase::Current));
        }
    }

    #[test]
    fn test_no_period_before_epoch() {
        assert_eq!(current_period(EPOCH, ROTATION, EPOCH - 1), None);
        assert_eq!(current_period(EPOCH, 0, EPOCH), None);
    }
}
