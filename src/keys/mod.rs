//! Key management: temporary secret schedules, rotation and stream contexts.
//!
//! Every endpoint holds up to three consecutive periods of its secret chain:
//!
//! ```text
//!   period p-1      period p        period p+1
//! +-----------+  +-----------+  +-----------+
//! |    old    |  |  current  |  |    new    |
//! +-----------+  +-----------+  +-----------+
//!  late incoming   outgoing and    incoming from
//!  streams         incoming        peers running ahead
//! ```
//!
//! [`KeyManager`] keeps the set up to date, persists it through a
//! [`SecretStore`](crate::core::SecretStore) and mirrors it into a
//! [`TagRecognizer`](crate::core::TagRecognizer).

mod config;
mod manager;
mod rotation;
mod schedule;
mod slots;

pub use config::{KeyManagerConfig, KeyManagerConfigBuilder};
pub use manager::KeyManager;
pub use rotation::{RotationPlan, RotationSummary, plan};
pub use schedule::{Lifecycle, SecretSchedule, current_period, rotation_period};
pub use slots::{Phase, SecretSlots};
