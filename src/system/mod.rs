//! Default implementations of the clock, timer and event-bus interfaces.

mod clock;
mod events;
mod timer;

pub use clock::{ManualClock, SystemClock};
pub use events::LocalEventBus;
#[cfg(feature = "runtime")]
pub use timer::TokioTimer;
pub use timer::ManualTimer;
