//! In-memory [`SecretStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::core::{ContactId, SecretId, SecretStore, StoreError, TemporarySecret, TransportId};
use crate::crypto::ReorderingWindow;

#[derive(Default)]
struct StoreState {
    secrets: HashMap<SecretId, TemporarySecret>,
    latencies: HashMap<TransportId, u64>,
}

/// A [`SecretStore`] that keeps everything in memory.
///
/// Every operation runs under one lock, so each is atomic and
/// `increment_stream_counter` never hands out a value twice. Contents do not
/// survive the process; share one instance across manager instances to
/// simulate a restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transport and its maximum latency in ms.
    pub fn add_transport(&self, transport_id: TransportId, max_latency: u64) {
        self.state.lock().latencies.insert(transport_id, max_latency);
    }

    /// Look up one stored secret.
    pub fn secret(&self, id: &SecretId) -> Option<TemporarySecret> {
        self.state.lock().secrets.get(id).cloned()
    }

    /// Ids of every stored secret, sorted.
    pub fn secret_ids(&self) -> Vec<SecretId> {
        let mut ids: Vec<SecretId> = self.state.lock().secrets.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Make every mutating operation fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".into()));
        }
        Ok(())
    }
}

impl SecretStore for MemoryStore {
    fn secrets(&self) -> Result<Vec<TemporarySecret>, StoreError> {
        Ok(self.state.lock().secrets.values().cloned().collect())
    }

    fn add_secrets(&self, secrets: &[TemporarySecret]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock();
        for secret in secrets {
            match state.secrets.get_mut(&secret.id()) {
                Some(held) if held.secret.as_bytes() == secret.secret.as_bytes() => {
                    held.outgoing_streams = held.outgoing_streams.max(secret.outgoing_streams);
                }
                _ => {
                    state.secrets.insert(secret.id(), secret.clone());
                }
            }
        }
        Ok(())
    }

    fn remove_secrets(&self, ids: &[SecretId]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock();
        for id in ids {
            state.secrets.remove(id);
        }
        Ok(())
    }

    fn remove_contact_secrets(&self, contact_id: ContactId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.state
            .lock()
            .secrets
            .retain(|id, _| id.contact_id != contact_id);
        Ok(())
    }

    fn remove_transport_secrets(&self, transport_id: &TransportId) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock();
        state.secrets.retain(|id, _| &id.transport_id != transport_id);
        state.latencies.remove(transport_id);
        Ok(())
    }

    fn increment_stream_counter(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
    ) -> Result<Option<u64>, StoreError> {
        self.check_writable()?;
        let id = SecretId {
            contact_id,
            transport_id: transport_id.clone(),
            period,
        };
        let mut state = self.state.lock();
        Ok(state.secrets.get_mut(&id).map(|secret| {
            let counter = secret.outgoing_streams;
            secret.outgoing_streams += 1;
            counter
        }))
    }

    fn transport_latencies(&self) -> Result<HashMap<TransportId, u64>, StoreError> {
        Ok(self.state.lock().latencies.clone())
    }

    fn set_reordering_window(
        &self,
        id: &SecretId,
        window: ReorderingWindow,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        if let Some(secret) = self.state.lock().secrets.get_mut(id) {
            secret.incoming_window = window;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::core::Endpoint;
    use crate::crypto::SecretKey;

    fn secret(contact: u32, transport: &str, period: u64) -> TemporarySecret {
        let endpoint = Endpoint::new(ContactId(contact), TransportId::new(transport), 0, true);
        TemporarySecret::new(endpoint, period, SecretKey::generate())
    }

    #[test]
    fn test_increment_returns_previous_value() {
        let store = MemoryStore::new();
        store.add_secrets(&[secret(1, "tcp", 5)]).unwrap();
        let tcp = TransportId::new("tcp");

        assert_eq!(store.increment_stream_counter(ContactId(1), &tcp, 5).unwrap(), Some(0));
        assert_eq!(store.increment_stream_counter(ContactId(1), &tcp, 5).unwrap(), Some(1));
        assert_eq!(store.increment_stream_counter(ContactId(1), &tcp, 6).unwrap(), None);
    }

    #[test]
    fn test_concurrent_increments_unique() {
        let store = Arc::new(MemoryStore::new());
        store.add_secrets(&[secret(1, "tcp", 0)]).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    let tcp = TransportId::new("tcp");
                    (0..100)
                        .map(|_| {
                            store
                                .increment_stream_counter(ContactId(1), &tcp, 0)
                                .unwrap()
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn test_re_adding_same_secret_keeps_counter_and_window() {
        let store = MemoryStore::new();
        let original = secret(1, "tcp", 5);
        store.add_secrets(&[original.clone()]).unwrap();
        let tcp = TransportId::new("tcp");
        store.increment_stream_counter(ContactId(1), &tcp, 5).unwrap();
        store.increment_stream_counter(ContactId(1), &tcp, 5).unwrap();
        let mut window = ReorderingWindow::new();
        window.mark_seen(0).unwrap();
        store.set_reordering_window(&original.id(), window).unwrap();

        let fresh = TemporarySecret::new(original.endpoint.clone(), 5, original.secret.clone());
        store.add_secrets(&[fresh]).unwrap();

        let held = store.secret(&original.id()).unwrap();
        assert_eq!(held.outgoing_streams, 2);
        assert!(held.incoming_window.is_seen(0));
        assert_eq!(store.increment_stream_counter(ContactId(1), &tcp, 5).unwrap(), Some(2));
    }

    #[test]
    fn test_different_secret_replaces_row() {
        let store = MemoryStore::new();
        let original = secret(1, "tcp", 5);
        store.add_secrets(&[original.clone()]).unwrap();
        let tcp = TransportId::new("tcp");
        store.increment_stream_counter(ContactId(1), &tcp, 5).unwrap();

        let replacement = secret(1, "tcp", 5);
        store.add_secrets(&[replacement.clone()]).unwrap();

        let held = store.secret(&original.id()).unwrap();
        assert_eq!(held.secret.as_bytes(), replacement.secret.as_bytes());
        assert_eq!(held.outgoing_streams, 0);
    }

    #[test]
    fn test_remove_transport_drops_latency() {
        let store = MemoryStore::new();
        store.add_transport(TransportId::new("tcp"), 30_000);
        store.add_transport(TransportId::new("bt"), 60_000);
        store
            .add_secrets(&[secret(1, "tcp", 0), secret(1, "bt", 0)])
            .unwrap();

        store.remove_transport_secrets(&TransportId::new("tcp")).unwrap();

        let latencies = store.transport_latencies().unwrap();
        assert_eq!(latencies.len(), 1);
        assert_eq!(latencies[&TransportId::new("bt")], 60_000);
        assert_eq!(store.secrets().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_contact() {
        let store = MemoryStore::new();
        store
            .add_secrets(&[secret(1, "tcp", 0), secret(2, "tcp", 0)])
            .unwrap();
        store.remove_contact_secrets(ContactId(1)).unwrap();

        let ids = store.secret_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].contact_id, ContactId(2));
    }

    #[test]
    fn test_failing_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.add_secrets(&[secret(1, "tcp", 0)]).is_err());
        assert!(store.secrets().unwrap().is_empty());

        store.set_fail_writes(false);
        store.add_secrets(&[secret(1, "tcp", 0)]).unwrap();
        assert_eq!(store.secrets().unwrap().len(), 1);
    }
}
