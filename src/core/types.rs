//! Value types for endpoints, secrets and streams.

use std::fmt;
use std::sync::Arc;

use crate::crypto::{ReorderingWindow, SecretKey};

/// Local identifier of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactId(pub u32);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a transport plugin (e.g. `"tcp"`, `"bt"`, `"file"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(Arc<str>);

impl TransportId {
    /// Create a transport identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransportId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Map key for an endpoint: one (contact, transport) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    /// Contact side of the pair.
    pub contact_id: ContactId,
    /// Transport side of the pair.
    pub transport_id: TransportId,
}

impl EndpointKey {
    /// Create an endpoint key.
    pub fn new(contact_id: ContactId, transport_id: TransportId) -> Self {
        Self {
            contact_id,
            transport_id,
        }
    }
}

/// One logical secure channel for a (contact, transport) pair.
///
/// `epoch` is the wall-clock time (ms) the handshake fixed as the start of
/// period 0's window; `alice` records whether the local peer was the
/// initiator of that handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Contact at the other end.
    pub contact_id: ContactId,
    /// Transport carrying the channel.
    pub transport_id: TransportId,
    /// Start of the derivation schedule, in ms since the Unix epoch.
    pub epoch: u64,
    /// Whether the local peer initiated the handshake.
    pub alice: bool,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(contact_id: ContactId, transport_id: TransportId, epoch: u64, alice: bool) -> Self {
        Self {
            contact_id,
            transport_id,
            epoch,
            alice,
        }
    }

    /// The map key for this endpoint.
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.contact_id, self.transport_id.clone())
    }
}

/// Identifies one temporary secret: an endpoint and a period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretId {
    /// Owning contact.
    pub contact_id: ContactId,
    /// Owning transport.
    pub transport_id: TransportId,
    /// Position in the derivation chain.
    pub period: u64,
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.contact_id, self.transport_id, self.period)
    }
}

/// A secret for one period of an endpoint's derivation chain, together with
/// the counters persisted alongside it.
#[derive(Debug, Clone)]
pub struct TemporarySecret {
    /// Endpoint the secret belongs to.
    pub endpoint: Endpoint,
    /// Period of the secret.
    pub period: u64,
    /// The secret itself.
    pub secret: SecretKey,
    /// Next outgoing stream number for this period.
    pub outgoing_streams: u64,
    /// Incoming stream numbers already seen for this period.
    pub incoming_window: ReorderingWindow,
}

impl TemporarySecret {
    /// Create a fresh secret with zeroed counters.
    pub fn new(endpoint: Endpoint, period: u64, secret: SecretKey) -> Self {
        Self {
            endpoint,
            period,
            secret,
            outgoing_streams: 0,
            incoming_window: ReorderingWindow::new(),
        }
    }

    /// Identifier of this secret.
    pub fn id(&self) -> SecretId {
        SecretId {
            contact_id: self.endpoint.contact_id,
            transport_id: self.endpoint.transport_id.clone(),
            period: self.period,
        }
    }

    /// Map key of the owning endpoint.
    pub fn endpoint_key(&self) -> EndpointKey {
        self.endpoint.key()
    }
}

/// Everything needed to build the codec state for one stream.
///
/// Never persisted as a whole; the stream number has already been durably
/// reserved by the time a context exists.
#[derive(Debug, Clone)]
pub struct StreamContext {
    /// Contact at the other end.
    pub contact_id: ContactId,
    /// Transport carrying the stream.
    pub transport_id: TransportId,
    /// Temporary secret the stream keys are derived from.
    pub secret: SecretKey,
    /// Stream number within the secret's period.
    pub stream_number: u64,
    /// Whether the local peer is the endpoint's initiator.
    pub alice: bool,
}

impl StreamContext {
    /// Create a stream context.
    pub fn new(
        contact_id: ContactId,
        transport_id: TransportId,
        secret: SecretKey,
        stream_number: u64,
        alice: bool,
    ) -> Self {
        Self {
            contact_id,
            transport_id,
            secret,
            stream_number,
            alice,
        }
    }
}

/// Notifications published by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A contact and all its endpoints were removed.
    ContactRemoved {
        /// Removed contact.
        contact_id: ContactId,
    },
    /// A transport became available with the given maximum latency.
    TransportAdded {
        /// Added transport.
        transport_id: TransportId,
        /// Maximum one-way latency in ms.
        max_latency: u64,
    },
    /// A transport was removed.
    TransportRemoved {
        /// Removed transport.
        transport_id: TransportId,
    },
}
