//! Incrementally maintained tag index.
//!
//! For every live secret the index holds the tags of the unseen stream
//! numbers in that secret's incoming reordering window, so recognizing a tag
//! is a single hash lookup. Recognizing a tag marks its stream number seen,
//! indexes the numbers that enter the window, and persists the window.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::core::{
    ContactId, CryptoError, Endpoint, RecognitionError, SecretId, SecretStore, StreamContext,
    TAG_LENGTH, TagRecognizer, TemporarySecret, TransportId,
};
use crate::crypto::{ReorderingWindow, SecretKey, derive_tag_key, encode_tag};

type Tag = [u8; TAG_LENGTH];

/// [`TagRecognizer`] backed by an in-memory hash index.
pub struct TagIndex {
    store: Arc<dyn SecretStore>,
    inner: Mutex<IndexState>,
}

#[derive(Default)]
struct IndexState {
    tags: HashMap<Tag, TagEntry>,
    secrets: HashMap<SecretId, IndexedSecret>,
}

struct TagEntry {
    id: SecretId,
    stream_number: u64,
}

struct IndexedSecret {
    endpoint: Endpoint,
    secret: SecretKey,
    tag_key: SecretKey,
    window: ReorderingWindow,
    tags: HashMap<u64, Tag>,
}

impl TagIndex {
    /// Create an empty index that persists windows through `store`.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(IndexState::default()),
        }
    }

    /// Number of tags currently recognized.
    pub fn tag_count(&self) -> usize {
        self.inner.lock().tags.len()
    }

    /// Number of secrets currently indexed.
    pub fn secret_count(&self) -> usize {
        self.inner.lock().secrets.len()
    }

    /// Check if tags of a secret are indexed.
    pub fn contains_secret(&self, id: &SecretId) -> bool {
        self.inner.lock().secrets.contains_key(id)
    }
}

impl IndexState {
    fn remove(&mut self, id: &SecretId) -> bool {
        match self.secrets.remove(id) {
            Some(indexed) => {
                for tag in indexed.tags.values() {
                    self.tags.remove(tag);
                }
                true
            }
            None => false,
        }
    }

    fn remove_where(&mut self, predicate: impl Fn(&SecretId) -> bool) -> usize {
        let ids: Vec<SecretId> = self.secrets.keys().filter(|id| predicate(id)).cloned().collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }
}

impl TagRecognizer for TagIndex {
    fn recognize(&self, tag: &[u8]) -> Result<Option<StreamContext>, RecognitionError> {
        let Ok(tag) = Tag::try_from(tag) else {
            return Ok(None);
        };

        let mut state = self.inner.lock();
        let Some(entry) = state.tags.get(&tag) else {
            return Ok(None);
        };
        let id = entry.id.clone();
        let stream_number = entry.stream_number;
        let Some(indexed) = state.secrets.get(&id) else {
            return Ok(None);
        };

        // Work on a copy so a failed persist leaves the index unchanged.
        let mut window = indexed.window;
        let entered = match window.mark_seen(stream_number) {
            Ok(entered) => entered,
            Err(_) => return Ok(None),
        };
        let new_tags = entered
            .into_iter()
            .map(|n| encode_tag(&indexed.tag_key, n).map(|t| (n, t)))
            .collect::<Result<Vec<(u64, Tag)>, CryptoError>>()?;

        self.store.set_reordering_window(&id, window)?;

        let ctx = StreamContext::new(
            indexed.endpoint.contact_id,
            indexed.endpoint.transport_id.clone(),
            indexed.secret.clone(),
            stream_number,
            indexed.endpoint.alice,
        );

        state.tags.remove(&tag);
        for (number, t) in &new_tags {
            state.tags.insert(
                *t,
                TagEntry {
                    id: id.clone(),
                    stream_number: *number,
                },
            );
        }
        if let Some(indexed) = state.secrets.get_mut(&id) {
            indexed.window = window;
            indexed.tags.remove(&stream_number);
            indexed.tags.extend(new_tags);
        }

        debug!(secret = %id, stream = stream_number, "tag recognized");
        Ok(Some(ctx))
    }

    fn add_secret(&self, secret: &TemporarySecret) -> Result<(), CryptoError> {
        // Incoming streams were written by the peer, under the peer's role.
        let tag_key = derive_tag_key(&secret.secret, !secret.endpoint.alice)?;
        let tags = secret
            .incoming_window
            .unseen()
            .map(|n| encode_tag(&tag_key, n).map(|t| (n, t)))
            .collect::<Result<HashMap<u64, Tag>, CryptoError>>()?;

        let id = secret.id();
        let mut state = self.inner.lock();
        state.remove(&id);
        for (number, tag) in &tags {
            state.tags.insert(
                *tag,
                TagEntry {
                    id: id.clone(),
                    stream_number: *number,
                },
            );
        }
        state.secrets.insert(
            id.clone(),
            IndexedSecret {
                endpoint: secret.endpoint.clone(),
                secret: secret.secret.clone(),
                tag_key,
                window: secret.incoming_window,
                tags,
            },
        );

        trace!(secret = %id, "secret indexed");
        Ok(())
    }

    fn remove_secret(&self, id: &SecretId) {
        if self.inner.lock().remove(id) {
            trace!(secret = %id, "secret unindexed");
        }
    }

    fn remove_contact(&self, contact_id: ContactId) {
        let removed = self
            .inner
            .lock()
            .remove_where(|id| id.contact_id == contact_id);
        trace!(contact = %contact_id, removed, "contact unindexed");
    }

    fn remove_transport(&self, transport_id: &TransportId) {
        let removed = self
            .inner
            .lock()
            .remove_where(|id| &id.transport_id == transport_id);
        trace!(transport = %transport_id, removed, "transport unindexed");
    }

    fn remove_all(&self) {
        let mut state = self.inner.lock();
        state.tags.clear();
        state.secrets.clear();
    }
}
