//! Interfaces to the collaborators around the secure transport layer.
//!
//! Persistence, event delivery, wall-clock time and scheduling all live
//! outside this crate. The key manager and tag index only see them through
//! the traits below, which keeps rotation logic deterministic under test.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::{CryptoError, RecognitionError, StoreError};
use super::types::{ContactId, Event, SecretId, StreamContext, TemporarySecret, TransportId};
use crate::crypto::ReorderingWindow;

/// Durable storage for temporary secrets and their counters.
///
/// # Requirements
///
/// - `increment_stream_counter` MUST be atomic: two concurrent calls for the
///   same secret never return the same value.
/// - A successful call MUST be durable before it returns.
/// - Operations submitted from different threads may be serialized in any
///   order, but each one is applied completely or not at all.
pub trait SecretStore: Send + Sync {
    /// Load every stored secret.
    fn secrets(&self) -> Result<Vec<TemporarySecret>, StoreError>;

    /// Store new secrets.
    ///
    /// A secret whose id is already stored with identical key bytes MUST NOT
    /// lower the stored outgoing stream counter or replace the stored
    /// reordering window. A stored row with different key bytes is replaced.
    fn add_secrets(&self, secrets: &[TemporarySecret]) -> Result<(), StoreError>;

    /// Delete the given secrets. Unknown ids are ignored.
    fn remove_secrets(&self, ids: &[SecretId]) -> Result<(), StoreError>;

    /// Delete every secret belonging to a contact.
    fn remove_contact_secrets(&self, contact_id: ContactId) -> Result<(), StoreError>;

    /// Delete every secret belonging to a transport, and its latency entry.
    fn remove_transport_secrets(&self, transport_id: &TransportId) -> Result<(), StoreError>;

    /// Return the secret's outgoing stream counter and increment it.
    ///
    /// Returns `None` if no such secret is stored.
    fn increment_stream_counter(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
    ) -> Result<Option<u64>, StoreError>;

    /// Maximum latency (ms) of every known transport.
    fn transport_latencies(&self) -> Result<HashMap<TransportId, u64>, StoreError>;

    /// Persist the incoming reordering window of a secret. Unknown ids are
    /// ignored.
    fn set_reordering_window(
        &self,
        id: &SecretId,
        window: ReorderingWindow,
    ) -> Result<(), StoreError>;
}

/// Maps incoming tags to the stream they open.
///
/// Implementations keep an index over every live secret so that
/// [`recognize`](Self::recognize) runs in O(1) amortized time.
pub trait TagRecognizer: Send + Sync {
    /// Look up a tag read from the wire.
    ///
    /// A recognized tag is consumed: the same tag is never recognized twice.
    fn recognize(&self, tag: &[u8]) -> Result<Option<StreamContext>, RecognitionError>;

    /// Start recognizing tags derived from a secret.
    fn add_secret(&self, secret: &TemporarySecret) -> Result<(), CryptoError>;

    /// Stop recognizing tags derived from a secret.
    fn remove_secret(&self, id: &SecretId);

    /// Stop recognizing tags of every secret of a contact.
    fn remove_contact(&self, contact_id: ContactId);

    /// Stop recognizing tags of every secret of a transport.
    fn remove_transport(&self, transport_id: &TransportId);

    /// Forget every secret.
    fn remove_all(&self);
}

/// Wall-clock time source.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// A one-shot timer task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A task run repeatedly by [`Timer::schedule_at_fixed_rate`].
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Wrap a timer-specific task id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The timer-specific task id.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Scheduler for deferred and periodic work.
pub trait Timer: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Run `task` after `delay`, then every `period`.
    fn schedule_at_fixed_rate(
        &self,
        delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> TaskHandle;

    /// Cancel a task. Cancelling a finished or unknown task does nothing.
    fn cancel(&self, handle: TaskHandle);
}

/// Receives published [`Event`]s.
pub trait EventListener: Send + Sync {
    /// Called on the publishing thread for every event.
    fn event_occurred(&self, event: &Event);
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Publish/subscribe hub for [`Event`]s.
pub trait EventBus: Send + Sync {
    /// Register a listener.
    fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId;

    /// Deregister a listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);
}
