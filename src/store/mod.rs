//! [`SecretStore`](crate::core::SecretStore) implementations.

mod memory;

pub use memory::MemoryStore;
