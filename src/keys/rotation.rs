//! Pure rotation planning.
//!
//! [`plan`] takes every known secret and the time and decides, without
//! touching any collaborator, which secrets are held in which phase, which
//! are dead, and which must be derived to fill the gaps. The key manager
//! then persists and applies the plan.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use super::schedule::{Lifecycle, SecretSchedule, current_period, rotation_period};
use super::slots::SecretSlots;
use crate::core::{EndpointKey, KeyManagerError, SecretId, TemporarySecret, TransportId};
use crate::crypto::derive_secret_at;

/// Outcome of classifying a set of secrets at one instant.
#[derive(Debug, Default)]
pub struct RotationPlan {
    /// Live secrets per endpoint, including the created ones.
    pub endpoints: HashMap<EndpointKey, SecretSlots>,
    /// Secrets derived to fill missing phases.
    pub created: Vec<TemporarySecret>,
    /// Secrets past their destruction time.
    pub dead: Vec<TemporarySecret>,
    /// Secrets whose transport is no longer known.
    pub obsolete: Vec<TemporarySecret>,
}

impl RotationPlan {
    /// Check if applying the plan would change anything persisted.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.dead.is_empty() && self.obsolete.is_empty()
    }

    /// Ids of the dead and obsolete secrets.
    pub fn retired_ids(&self) -> Vec<SecretId> {
        self.dead.iter().chain(&self.obsolete).map(TemporarySecret::id).collect()
    }

    /// What applying the plan retires and creates.
    pub fn summary(&self) -> RotationSummary {
        let mut retired = self.retired_ids();
        let mut created: Vec<SecretId> = self.created.iter().map(TemporarySecret::id).collect();
        retired.sort();
        created.sort();
        RotationSummary { retired, created }
    }
}

/// Secrets retired and created by one rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationSummary {
    /// Dead or obsolete secrets removed from the store and the recognizer.
    pub retired: Vec<SecretId>,
    /// Secrets derived and added.
    pub created: Vec<SecretId>,
}

impl RotationSummary {
    /// Check if the rotation changed nothing.
    pub fn is_empty(&self) -> bool {
        self.retired.is_empty() && self.created.is_empty()
    }
}

/// Classify `secrets` at `now` and derive replacements for missing phases.
///
/// A secret whose creation time is still in the future means the clock moved
/// backwards; the whole plan is rejected with
/// [`KeyManagerError::ClockMovedBackwards`].
pub fn plan(
    now: u64,
    secrets: Vec<TemporarySecret>,
    latencies: &HashMap<TransportId, u64>,
    max_clock_difference: Duration,
) -> Result<RotationPlan, KeyManagerError> {
    let mut plan = RotationPlan::default();
    let mut dead_by_endpoint: HashMap<EndpointKey, Vec<usize>> = HashMap::new();

    for secret in secrets {
        let Some(&max_latency) = latencies.get(&secret.endpoint.transport_id) else {
            debug!(secret = %secret.id(), "discarding secret of unknown transport");
            plan.obsolete.push(secret);
            continue;
        };

        let rotation = rotation_period(max_latency, max_clock_difference);
        let schedule = SecretSchedule::new(secret.endpoint.epoch, rotation, secret.period);
        match schedule.lifecycle(now) {
            Lifecycle::Live(phase) => {
                plan.endpoints
                    .entry(secret.endpoint_key())
                    .or_default()
                    .set(phase, secret);
            }
            Lifecycle::Dead => {
                dead_by_endpoint
                    .entry(secret.endpoint_key())
                    .or_default()
                    .push(plan.dead.len());
                plan.dead.push(secret);
            }
            Lifecycle::NotYetCreated => {
                return Err(KeyManagerError::ClockMovedBackwards {
                    contact_id: secret.endpoint.contact_id,
                    transport_id: secret.endpoint.transport_id.clone(),
                    period: secret.period,
                    now,
                    creation: schedule.creation,
                });
            }
        }
    }

    let mut keys: Vec<EndpointKey> = plan.endpoints.keys().cloned().collect();
    for key in dead_by_endpoint.keys() {
        if !plan.endpoints.contains_key(key) {
            keys.push(key.clone());
        }
    }

    for key in keys {
        let dead: Vec<&TemporarySecret> = dead_by_endpoint
            .get(&key)
            .map(|indices| indices.iter().map(|&i| &plan.dead[i]).collect())
            .unwrap_or_default();
        let slots = plan.endpoints.entry(key.clone()).or_default();
        if slots.is_full() {
            continue;
        }
        let Some(&max_latency) = latencies.get(&key.transport_id) else {
            continue;
        };
        let rotation = rotation_period(max_latency, max_clock_difference);

        let created = fill_missing(now, rotation, slots, &dead);
        plan.created.extend(created);
        if slots.is_empty() {
            plan.endpoints.remove(&key);
        }
    }

    Ok(plan)
}

/// Derive the secrets for every missing phase of one endpoint.
///
/// Each target period is derived forward from the held or dead secret with
/// the largest period below it. A phase with no such source stays empty.
fn fill_missing(
    now: u64,
    rotation: u64,
    slots: &mut SecretSlots,
    dead: &[&TemporarySecret],
) -> Vec<TemporarySecret> {
    let Some(endpoint) = slots
        .iter()
        .next()
        .or_else(|| dead.first().copied())
        .map(|s| s.endpoint.clone())
    else {
        return Vec::new();
    };
    let Some(current) = current_period(endpoint.epoch, rotation, now) else {
        return Vec::new();
    };

    let mut created: Vec<TemporarySecret> = Vec::new();
    let missing: Vec<_> = slots.missing().collect();
    for phase in missing {
        let Some(target) = phase.target_period(current) else {
            continue;
        };
        let source = slots
            .iter()
            .chain(dead.iter().copied())
            .chain(created.iter())
            .filter(|s| s.period < target)
            .max_by_key(|s| s.period);
        let Some(source) = source else {
            warn!(
                contact = %endpoint.contact_id,
                transport = %endpoint.transport_id,
                period = target,
                "no earlier secret to derive from"
            );
            continue;
        };

        let secret = derive_secret_at(&source.secret, source.period, target);
        let derived = TemporarySecret::new(endpoint.clone(), target, secret);
        debug!(secret = %derived.id(), from = source.period, "derived secret");
        created.push(derived);
    }

    for secret in &created {
        let schedule = SecretSchedule::new(endpoint.epoch, rotation, secret.period);
        if let Lifecycle::Live(phase) = schedule.lifecycle(now) {
            slots.set(phase, secret.clone());
        }
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContactId, Endpoint};
    use crate::crypto::{SECRET_KEY_SIZE, SecretKey, derive_next_secret};
    use crate::keys::slots::Phase;

    const EPOCH: u64 = 1_000_000_000;
    const LATENCY: u64 = 30_000;
    const ROTATION: u64 = 3_630_000;
    const MCD: Duration = Duration::from_secs(3600);

    fn endpoint() -> Endpoint {
        Endpoint::new(ContactId(1), TransportId::new("tcp"), EPOCH, true)
    }

    fn latencies() -> HashMap<TransportId, u64> {
        HashMap::from([(TransportId::new("tcp"), LATENCY)])
    }

    fn chain(up_to: u64) -> Vec<SecretKey> {
        let initial = SecretKey::from_bytes([0x42; SECRET_KEY_SIZE]);
        let mut out = vec![derive_next_secret(&initial, 0)];
        for p in 1..=up_to {
            let next = derive_next_secret(&out[p as usize - 1], p);
            out.push(next);
        }
        out
    }

    fn secret(chain: &[SecretKey], period: u64) -> TemporarySecret {
        TemporarySecret::new(endpoint(), period, chain[period as usize].clone())
    }

    fn key() -> EndpointKey {
        endpoint().key()
    }

    #[test]
    fn test_full_set_is_noop() {
        let c = chain(3);
        let secrets = vec![secret(&c, 0), secret(&c, 1), secret(&c, 2)];
        let plan = plan(EPOCH + 1, secrets, &latencies(), MCD).unwrap();

        assert!(plan.is_noop());
        assert_eq!(plan.endpoints[&key()].periods(), [Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_one_rotation_retires_old_and_derives_new() {
        let c = chain(3);
        let secrets = vec![secret(&c, 0), secret(&c, 1), secret(&c, 2)];
        let plan = plan(EPOCH + ROTATION + 1, secrets, &latencies(), MCD).unwrap();

        assert_eq!(plan.dead.len(), 1);
        assert_eq!(plan.dead[0].period, 0);
        assert_eq!(plan.created.len(), 1);
        assert_eq!(plan.created[0].period, 3);
        assert_eq!(plan.created[0].secret.as_bytes(), c[3].as_bytes());
        assert_eq!(plan.endpoints[&key()].periods(), [Some(1), Some(2), Some(3)]);

        let summary = plan.summary();
        assert_eq!(summary.retired, vec![secret(&c, 0).id()]);
        assert_eq!(summary.created, vec![secret(&c, 3).id()]);
    }

    #[test]
    fn test_missed_ticks_derive_from_newest_dead() {
        let c = chain(12);
        let secrets = vec![secret(&c, 0), secret(&c, 1), secret(&c, 2)];
        let now = EPOCH + 10 * ROTATION + 1;
        let plan = plan(now, secrets, &latencies(), MCD).unwrap();

        assert_eq!(plan.dead.len(), 3);
        let mut created: Vec<u64> = plan.created.iter().map(|s| s.period).collect();
        created.sort_unstable();
        assert_eq!(created, vec![10, 11, 12]);
        for s in &plan.created {
            assert_eq!(s.secret.as_bytes(), c[s.period as usize].as_bytes());
        }
        assert_eq!(plan.endpoints[&key()].periods(), [Some(10), Some(11), Some(12)]);
    }

    #[test]
    fn test_clock_regression_rejected() {
        let c = chain(3);
        let secrets = vec![secret(&c, 3)];
        let err = plan(EPOCH, secrets, &latencies(), MCD).unwrap_err();
        match err {
            KeyManagerError::ClockMovedBackwards {
                contact_id, period, ..
            } => {
                assert_eq!(contact_id, ContactId(1));
                assert_eq!(period, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_transport_is_obsolete() {
        let c = chain(2);
        let plan = plan(EPOCH + 1, vec![secret(&c, 1)], &HashMap::new(), MCD).unwrap();
        assert_eq!(plan.obsolete.len(), 1);
        assert!(plan.endpoints.is_empty());
        assert!(plan.created.is_empty());
    }

    #[test]
    fn test_missing_new_phase_derived_from_current() {
        let c = chain(3);
        let secrets = vec![secret(&c, 0), secret(&c, 1)];
        let plan = plan(EPOCH + 1, secrets, &latencies(), MCD).unwrap();

        assert_eq!(plan.created.len(), 1);
        assert_eq!(plan.created[0].period, 2);
        assert_eq!(plan.created[0].secret.as_bytes(), c[2].as_bytes());
        assert!(plan.dead.is_empty());
        assert_eq!(
            plan.endpoints[&key()].get(Phase::New).map(|s| s.period),
            Some(2)
        );
    }

    #[test]
    fn test_old_phase_cannot_be_derived_backwards() {
        let c = chain(3);
        let secrets = vec![secret(&c, 1), secret(&c, 2)];
        let plan = plan(EPOCH + 1, secrets, &latencies(), MCD).unwrap();

        assert!(plan.created.is_empty());
        assert_eq!(plan.endpoints[&key()].periods(), [None, Some(1), Some(2)]);
    }
}
