//! The key manager.
//!
//! Owns the old/current/new secrets of every endpoint, rotates them on a
//! timer, hands out stream contexts, and keeps the tag recognizer in sync.
//!
//! # Locking
//!
//! Mutating operations (`start`, `stop`, `endpoint_added`, rotation, event
//! handling) take the writer guard for their whole duration, so they never
//! interleave. The state guard is only held to snapshot or apply; store and
//! recognizer calls happen outside it. `get_stream_context` takes no writer
//! guard: it snapshots the current secret and relies on the store's atomic
//! counter, so it never blocks behind a rotation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::config::KeyManagerConfig;
use super::rotation::{self, RotationPlan, RotationSummary};
use super::schedule::{current_period, rotation_period};
use super::slots::{Phase, SecretSlots};
use crate::core::{
    Clock, ContactId, Endpoint, EndpointKey, Event, EventBus, EventListener, KeyManagerError,
    ListenerId, SecretId, SecretStore, StoreError, StreamContext, TagRecognizer, TaskHandle,
    TemporarySecret, Timer, TransportId,
};
use crate::crypto::{SecretKey, derive_next_secret, derive_secret_at};

/// Derives, rotates and hands out temporary secrets.
///
/// Cloning is cheap; clones share one manager.
#[derive(Clone)]
pub struct KeyManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: KeyManagerConfig,
    store: Arc<dyn SecretStore>,
    recognizer: Arc<dyn TagRecognizer>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    writer: Mutex<()>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    running: bool,
    latencies: HashMap<TransportId, u64>,
    endpoints: HashMap<EndpointKey, SecretSlots>,
    listener: Option<ListenerId>,
    task: Option<TaskHandle>,
    /// Held secrets the recognizer refused, retried on every rotation.
    unregistered: HashSet<SecretId>,
}

impl KeyManager {
    /// Create a stopped key manager.
    pub fn new(
        config: KeyManagerConfig,
        store: Arc<dyn SecretStore>,
        recognizer: Arc<dyn TagRecognizer>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        timer: Arc<dyn Timer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                recognizer,
                events,
                clock,
                timer,
                writer: Mutex::new(()),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Load persisted secrets, bring them up to date, and start rotating.
    ///
    /// Dead secrets are purged and missing phases derived before any secret
    /// is registered with the recognizer. Fails without side effects if the
    /// store cannot be read or written, or if the clock is earlier than a
    /// stored secret's creation time.
    pub fn start(&self) -> Result<(), KeyManagerError> {
        let inner = &self.inner;
        let _writer = inner.writer.lock();
        if inner.state.lock().running {
            return Err(KeyManagerError::AlreadyRunning);
        }

        let secrets = inner
            .store
            .secrets()
            .inspect_err(|e| warn!(error = %e, "failed to load secrets"))?;
        let latencies = inner
            .store
            .transport_latencies()
            .inspect_err(|e| warn!(error = %e, "failed to load transport latencies"))?;

        let now = inner.clock.now_millis();
        let plan = rotation::plan(now, secrets, &latencies, inner.config.max_clock_difference)?;
        inner
            .persist(&plan)
            .inspect_err(|e| warn!(error = %e, "failed to persist secrets on start"))?;
        let summary = plan.summary();

        let live: Vec<&TemporarySecret> =
            plan.endpoints.values().flat_map(SecretSlots::iter).collect();
        for secret in &live {
            if let Err(e) = inner.recognizer.add_secret(secret) {
                inner.recognizer.remove_all();
                return Err(e.into());
            }
        }

        let listener = inner.events.add_listener(Arc::new(EventHandler {
            inner: Arc::downgrade(inner),
        }));
        let interval = inner
            .config
            .rotation_check_interval
            .max(Duration::from_millis(1));
        let weak = Arc::downgrade(inner);
        let task = inner.timer.schedule_at_fixed_rate(
            interval,
            interval,
            Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.tick();
                }
            }),
        );

        let endpoints = plan.endpoints.len();
        let mut state = inner.state.lock();
        state.running = true;
        state.latencies = latencies;
        state.endpoints = plan.endpoints;
        state.listener = Some(listener);
        state.task = Some(task);
        drop(state);

        info!(
            endpoints,
            created = summary.created.len(),
            retired = summary.retired.len(),
            "key manager started"
        );
        Ok(())
    }

    /// Stop rotating and forget every secret. Calling it again does nothing.
    pub fn stop(&self) {
        let inner = &self.inner;
        let _writer = inner.writer.lock();
        let (listener, task) = {
            let mut state = inner.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.endpoints.clear();
            state.latencies.clear();
            state.unregistered.clear();
            (state.listener.take(), state.task.take())
        };

        if let Some(id) = listener {
            inner.events.remove_listener(id);
        }
        if let Some(task) = task {
            inner.timer.cancel(task);
        }
        inner.recognizer.remove_all();
        info!("key manager stopped");
    }

    /// Derive and store the secrets of a new endpoint.
    ///
    /// `initial_secret` is the handshake output; the chain starts at
    /// `secret(0) = KDF(initial_secret, 0)` and is walked forward to the
    /// period before the current one. Replaces any earlier registration of
    /// the same (contact, transport) pair.
    pub fn endpoint_added(
        &self,
        endpoint: Endpoint,
        max_latency: u64,
        initial_secret: &SecretKey,
    ) -> Result<(), KeyManagerError> {
        let inner = &self.inner;
        let _writer = inner.writer.lock();

        let now = inner.clock.now_millis();
        let rotation = rotation_period(max_latency, inner.config.max_clock_difference);
        let Some(current) = current_period(endpoint.epoch, rotation, now) else {
            // Before the epoch, period 2 (new when period 1 is current) is not
            // yet created.
            return Err(KeyManagerError::ClockMovedBackwards {
                contact_id: endpoint.contact_id,
                transport_id: endpoint.transport_id.clone(),
                period: 2,
                now,
                creation: i128::from(endpoint.epoch),
            });
        };

        let old_secret = derive_secret_at(&derive_next_secret(initial_secret, 0), 0, current - 1);
        let current_secret = derive_next_secret(&old_secret, current);
        let new_secret = derive_next_secret(&current_secret, current + 1);

        let secrets = vec![
            TemporarySecret::new(endpoint.clone(), current - 1, old_secret),
            TemporarySecret::new(endpoint.clone(), current, current_secret),
            TemporarySecret::new(endpoint.clone(), current + 1, new_secret),
        ];

        let key = endpoint.key();
        let stale: Vec<SecretId> = inner
            .state
            .lock()
            .endpoints
            .get(&key)
            .map(|held| {
                held.iter()
                    .map(TemporarySecret::id)
                    .filter(|id| !secrets.iter().any(|s| s.id() == *id))
                    .collect()
            })
            .unwrap_or_default();
        if !stale.is_empty() {
            warn!(
                contact = %endpoint.contact_id,
                transport = %endpoint.transport_id,
                "replacing secrets of an existing endpoint"
            );
        }

        inner
            .store
            .add_secrets(&secrets)
            .inspect_err(|e| warn!(error = %e, "failed to store endpoint secrets"))?;
        if !stale.is_empty() {
            inner
                .store
                .remove_secrets(&stale)
                .inspect_err(|e| warn!(error = %e, "failed to remove replaced secrets"))?;
        }

        // Re-adding a known secret keeps its stored counter and window.
        let ids: Vec<SecretId> = secrets.iter().map(TemporarySecret::id).collect();
        let stored: HashMap<SecretId, TemporarySecret> = inner
            .store
            .secrets()
            .inspect_err(|e| warn!(error = %e, "failed to reload endpoint secrets"))?
            .into_iter()
            .filter(|s| ids.contains(&s.id()))
            .map(|s| (s.id(), s))
            .collect();
        let secrets: Vec<TemporarySecret> = secrets
            .into_iter()
            .map(|s| stored.get(&s.id()).cloned().unwrap_or(s))
            .collect();

        let mut slots = SecretSlots::new();
        for (phase, secret) in [Phase::Old, Phase::Current, Phase::New].into_iter().zip(&secrets) {
            slots.set(phase, secret.clone());
        }

        {
            let mut state = inner.state.lock();
            state
                .latencies
                .insert(endpoint.transport_id.clone(), max_latency);
            state.endpoints.insert(key, slots);
        }

        for id in &stale {
            inner.recognizer.remove_secret(id);
        }
        inner.register(&secrets);

        info!(
            contact = %endpoint.contact_id,
            transport = %endpoint.transport_id,
            period = current,
            "endpoint added"
        );
        Ok(())
    }

    /// Reserve the next outgoing stream of an endpoint.
    ///
    /// Returns `Ok(None)` if the endpoint has no current secret. The stream
    /// number is durably reserved by the store before the context is
    /// returned, so it is never handed out twice.
    pub fn get_stream_context(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<Option<StreamContext>, KeyManagerError> {
        let inner = &self.inner;
        let key = EndpointKey::new(contact_id, transport_id.clone());
        let current = inner
            .state
            .lock()
            .endpoints
            .get(&key)
            .and_then(|slots| slots.get(Phase::Current))
            .map(|s| (s.period, s.secret.clone(), s.endpoint.alice));
        let Some((period, secret, alice)) = current else {
            debug!(contact = %contact_id, transport = %transport_id, "no current secret");
            return Ok(None);
        };

        let reserved = inner
            .store
            .increment_stream_counter(contact_id, transport_id, period)
            .inspect_err(|e| warn!(error = %e, "failed to reserve stream number"))?;
        let Some(stream_number) = reserved else {
            debug!(
                contact = %contact_id,
                transport = %transport_id,
                period,
                "current secret no longer stored"
            );
            return Ok(None);
        };

        debug!(
            contact = %contact_id,
            transport = %transport_id,
            period,
            stream = stream_number,
            "stream context issued"
        );
        Ok(Some(StreamContext::new(
            contact_id,
            transport_id.clone(),
            secret,
            stream_number,
            alice,
        )))
    }

    /// Run one rotation check now.
    ///
    /// The timer calls this every `rotation_check_interval`. On error the
    /// held secrets are left as they were.
    pub fn rotate(&self) -> Result<RotationSummary, KeyManagerError> {
        self.inner.rotate()
    }

    /// Check if the manager has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Number of endpoints holding at least one secret.
    pub fn endpoint_count(&self) -> usize {
        self.inner.state.lock().endpoints.len()
    }

    /// Periods held as old, current and new for an endpoint.
    pub fn periods(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Option<[Option<u64>; 3]> {
        let key = EndpointKey::new(contact_id, transport_id.clone());
        self.inner
            .state
            .lock()
            .endpoints
            .get(&key)
            .map(SecretSlots::periods)
    }

    /// Maximum latency (ms) recorded for a transport.
    pub fn max_latency(&self, transport_id: &TransportId) -> Option<u64> {
        self.inner.state.lock().latencies.get(transport_id).copied()
    }

    /// The configuration in use.
    pub fn config(&self) -> &KeyManagerConfig {
        &self.inner.config
    }
}

impl Inner {
    fn persist(&self, plan: &RotationPlan) -> Result<(), StoreError> {
        if !plan.created.is_empty() {
            self.store.add_secrets(&plan.created)?;
        }
        let retired = plan.retired_ids();
        if !retired.is_empty() {
            self.store.remove_secrets(&retired)?;
        }
        Ok(())
    }

    /// Register secrets with the recognizer. A secret it refuses is kept
    /// and retried by the next rotation.
    fn register(&self, secrets: &[TemporarySecret]) {
        let mut registered = Vec::new();
        let mut failed = Vec::new();
        for secret in secrets {
            match self.recognizer.add_secret(secret) {
                Ok(()) => registered.push(secret.id()),
                Err(e) => {
                    warn!(secret = %secret.id(), error = %e, "failed to register secret");
                    failed.push(secret.id());
                }
            }
        }

        let mut state = self.state.lock();
        for id in &registered {
            state.unregistered.remove(id);
        }
        state.unregistered.extend(failed);
    }

    fn rotate(&self) -> Result<RotationSummary, KeyManagerError> {
        let _writer = self.writer.lock();
        let (secrets, latencies) = {
            let state = self.state.lock();
            let secrets: Vec<TemporarySecret> = state
                .endpoints
                .values()
                .flat_map(|slots| slots.iter().cloned())
                .collect();
            (secrets, state.latencies.clone())
        };

        let now = self.clock.now_millis();
        let plan = rotation::plan(now, secrets, &latencies, self.config.max_clock_difference)?;
        let summary = plan.summary();

        for id in &summary.retired {
            self.recognizer.remove_secret(id);
        }
        self.persist(&plan)
            .inspect_err(|e| warn!(error = %e, "rotation aborted"))?;

        let RotationPlan {
            endpoints, created, ..
        } = plan;
        let mut pending: Vec<TemporarySecret> = {
            let mut state = self.state.lock();
            state.endpoints = endpoints;
            let pending: Vec<TemporarySecret> = state
                .endpoints
                .values()
                .flat_map(SecretSlots::iter)
                .filter(|s| state.unregistered.contains(&s.id()))
                .cloned()
                .collect();
            state.unregistered = pending.iter().map(TemporarySecret::id).collect();
            pending
        };
        pending.extend(created);
        self.register(&pending);

        if !summary.is_empty() {
            info!(
                retired = summary.retired.len(),
                created = summary.created.len(),
                "secrets rotated"
            );
        }
        Ok(summary)
    }

    fn tick(&self) {
        if !self.state.lock().running {
            return;
        }
        match self.rotate() {
            Ok(_) => {}
            Err(e @ KeyManagerError::ClockMovedBackwards { .. }) => {
                error!(error = %e, "rotation check failed");
            }
            Err(e) => warn!(error = %e, "rotation check failed"),
        }
    }

    fn handle_event(&self, event: &Event) {
        let _writer = self.writer.lock();
        match event {
            Event::ContactRemoved { contact_id } => {
                if let Err(e) = self.store.remove_contact_secrets(*contact_id) {
                    warn!(contact = %contact_id, error = %e, "failed to remove contact secrets");
                }
                self.state
                    .lock()
                    .endpoints
                    .retain(|key, _| key.contact_id != *contact_id);
                self.recognizer.remove_contact(*contact_id);
                info!(contact = %contact_id, "contact removed");
            }
            Event::TransportAdded {
                transport_id,
                max_latency,
            } => {
                self.state
                    .lock()
                    .latencies
                    .insert(transport_id.clone(), *max_latency);
                debug!(transport = %transport_id, max_latency, "transport added");
            }
            Event::TransportRemoved { transport_id } => {
                if let Err(e) = self.store.remove_transport_secrets(transport_id) {
                    warn!(transport = %transport_id, error = %e, "failed to remove transport secrets");
                }
                {
                    let mut state = self.state.lock();
                    state.latencies.remove(transport_id);
                    state
                        .endpoints
                        .retain(|key, _| &key.transport_id != transport_id);
                }
                self.recognizer.remove_transport(transport_id);
                info!(transport = %transport_id, "transport removed");
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(id) = state.listener.take() {
            self.events.remove_listener(id);
        }
        if let Some(task) = state.task.take() {
            self.timer.cancel(task);
        }
    }
}

/// Defers events onto the timer so publishers never run rotation logic.
struct EventHandler {
    inner: Weak<Inner>,
}

impl EventListener for EventHandler {
    fn event_occurred(&self, event: &Event) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let weak = self.inner.clone();
        let event = event.clone();
        inner.timer.schedule(
            Duration::ZERO,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_event(&event);
                }
            }),
        );
    }
}
