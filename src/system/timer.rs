//! [`Timer`] implementations.
//!
//! [`ManualTimer`] runs tasks only when its clock is advanced, which makes
//! rotation deterministic under test. [`TokioTimer`] (feature `runtime`)
//! schedules onto a tokio runtime.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::clock::ManualClock;
use crate::core::{Clock, RepeatingTask, Task, TaskHandle, Timer};

enum Scheduled {
    Once(Task),
    Repeating { period: u64, task: RepeatingTask },
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    // Ordered by (due time, id): equal due times run in submission order.
    queue: BTreeMap<(u64, u64), Scheduled>,
    // Repeating tasks currently running, and those cancelled while running.
    running: HashSet<u64>,
    cancelled: HashSet<u64>,
}

/// Deterministic timer driven by a [`ManualClock`].
pub struct ManualTimer {
    clock: Arc<ManualClock>,
    state: Mutex<ManualState>,
}

impl ManualTimer {
    /// Create a timer that reads and advances `clock`.
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Advance the clock by `by`, running every task that falls due, in
    /// order, with the clock set to each task's due time.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.now_millis() + by.as_millis() as u64;

        while let Some((due, id, scheduled)) = self.pop_due(target) {
            if due > self.clock.now_millis() {
                self.clock.set(due);
            }
            match scheduled {
                Scheduled::Once(task) => task(),
                Scheduled::Repeating { period, task } => {
                    self.state.lock().running.insert(id);
                    task();
                    let mut state = self.state.lock();
                    state.running.remove(&id);
                    if !state.cancelled.remove(&id) {
                        state
                            .queue
                            .insert((due + period.max(1), id), Scheduled::Repeating { period, task });
                    }
                }
            }
        }

        if target > self.clock.now_millis() {
            self.clock.set(target);
        }
    }

    /// Run every task already due without moving the clock.
    pub fn run_due(&self) {
        self.advance(Duration::ZERO);
    }

    /// Number of scheduled tasks.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn pop_due(&self, target: u64) -> Option<(u64, u64, Scheduled)> {
        let mut state = self.state.lock();
        let (&(due, id), _) = state.queue.first_key_value()?;
        if due > target {
            return None;
        }
        let scheduled = state.queue.remove(&(due, id))?;
        Some((due, id, scheduled))
    }

    fn insert(&self, delay: Duration, scheduled: Scheduled) -> TaskHandle {
        let due = self.clock.now_millis() + delay.as_millis() as u64;
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.queue.insert((due, id), scheduled);
        TaskHandle::new(id)
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        self.insert(delay, Scheduled::Once(task))
    }

    fn schedule_at_fixed_rate(
        &self,
        delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> TaskHandle {
        self.insert(
            delay,
            Scheduled::Repeating {
                period: period.as_millis() as u64,
                task,
            },
        )
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut state = self.state.lock();
        let id = handle.id();
        if state.running.contains(&id) {
            state.cancelled.insert(id);
        } else {
            state.queue.retain(|&(_, queued), _| queued != id);
        }
    }
}

#[cfg(feature = "runtime")]
pub use tokio_timer::TokioTimer;

#[cfg(feature = "runtime")]
mod tokio_timer {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::runtime::Handle;
    use tokio::task::JoinHandle;
    use tokio::time::{Instant, MissedTickBehavior};
    use tracing::warn;

    use crate::core::{RepeatingTask, Task, TaskHandle, Timer};

    /// [`Timer`] that spawns onto a tokio runtime.
    ///
    /// Tasks run on the blocking pool, so key-manager work never stalls the
    /// runtime's async workers.
    pub struct TokioTimer {
        handle: Handle,
        next_id: AtomicU64,
        tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    }

    impl TokioTimer {
        /// Create a timer on the given runtime.
        pub fn new(handle: Handle) -> Self {
            Self {
                handle,
                next_id: AtomicU64::new(0),
                tasks: Mutex::new(HashMap::new()),
            }
        }

        /// Create a timer on the runtime of the calling context.
        pub fn from_current() -> Result<Self, tokio::runtime::TryCurrentError> {
            Ok(Self::new(Handle::try_current()?))
        }

        fn track(&self, join: JoinHandle<()>) -> TaskHandle {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let mut tasks = self.tasks.lock();
            tasks.retain(|_, h| !h.is_finished());
            tasks.insert(id, join);
            TaskHandle::new(id)
        }
    }

    impl Timer for TokioTimer {
        fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
            let join = self.handle.spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = tokio::task::spawn_blocking(task).await {
                    warn!(error = %e, "timer task failed");
                }
            });
            self.track(join)
        }

        fn schedule_at_fixed_rate(
            &self,
            delay: Duration,
            period: Duration,
            task: RepeatingTask,
        ) -> TaskHandle {
            let join = self.handle.spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + delay, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
                loop {
                    interval.tick().await;
                    let task = task.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || task()).await {
                        warn!(error = %e, "repeating timer task failed");
                    }
                }
            });
            self.track(join)
        }

        fn cancel(&self, handle: TaskHandle) {
            if let Some(join) = self.tasks.lock().remove(&handle.id()) {
                join.abort();
            }
        }
    }

    impl Drop for TokioTimer {
        fn drop(&mut self) {
            for (_, join) in self.tasks.lock().drain() {
                join.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn timer() -> (Arc<ManualClock>, ManualTimer) {
        let clock = Arc::new(ManualClock::new(1_000));
        (clock.clone(), ManualTimer::new(clock))
    }

    #[test]
    fn test_one_shot_runs_when_due() {
        let (clock, timer) = timer();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        timer.schedule(
            Duration::from_millis(500),
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        timer.advance(Duration::from_millis(499));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        timer.advance(Duration::from_millis(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(clock.now_millis(), 1_500);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn test_zero_delay_runs_on_run_due() {
        let (clock, timer) = timer();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        timer.schedule(
            Duration::ZERO,
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        timer.run_due();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(clock.now_millis(), 1_000);
    }

    #[test]
    fn test_fixed_rate_sees_due_time() {
        let (clock, timer) = timer();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let c = clock.clone();
        timer.schedule_at_fixed_rate(
            Duration::from_millis(100),
            Duration::from_millis(100),
            Arc::new(move || s.lock().push(c.now_millis())),
        );

        timer.advance(Duration::from_millis(350));
        assert_eq!(*seen.lock(), vec![1_100, 1_200, 1_300]);
        assert_eq!(clock.now_millis(), 1_350);
        assert_eq!(timer.pending(), 1);
    }

    #[test]
    fn test_cancel_stops_repeating_task() {
        let (_, timer) = timer();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let handle = timer.schedule_at_fixed_rate(
            Duration::from_millis(10),
            Duration::from_millis(10),
            Arc::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        timer.advance(Duration::from_millis(25));
        timer.cancel(handle);
        timer.advance(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn test_cancel_unknown_handle_is_forgotten() {
        let (_, timer) = timer();
        timer.cancel(TaskHandle::new(42));
        timer.cancel(TaskHandle::new(43));
        assert!(timer.state.lock().cancelled.is_empty());
    }

    #[test]
    fn test_repeating_task_cancels_itself() {
        let (_, timer) = timer();
        let timer = Arc::new(timer);
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = Arc::new(Mutex::new(None::<TaskHandle>));

        let t = timer.clone();
        let r = runs.clone();
        let h = handle.clone();
        let scheduled = timer.schedule_at_fixed_rate(
            Duration::from_millis(10),
            Duration::from_millis(10),
            Arc::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
                if let Some(own) = h.lock().take() {
                    t.cancel(own);
                }
            }),
        );
        *handle.lock() = Some(scheduled);

        timer.advance(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(timer.pending(), 0);
        assert!(timer.state.lock().cancelled.is_empty());
    }

    #[test]
    fn test_task_scheduled_by_task_runs_in_same_advance() {
        let (_, timer) = timer();
        let timer = Arc::new(timer);
        let runs = Arc::new(AtomicUsize::new(0));

        let t = timer.clone();
        let r = runs.clone();
        timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                t.schedule(
                    Duration::ZERO,
                    Box::new(move || {
                        r.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        timer.advance(Duration::from_millis(10));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "runtime")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_timer_runs_and_cancels() {
        let timer = TokioTimer::from_current().unwrap();
        let once = Arc::new(AtomicUsize::new(0));
        let repeating = Arc::new(AtomicUsize::new(0));

        let o = once.clone();
        timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                o.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let r = repeating.clone();
        let handle = timer.schedule_at_fixed_rate(
            Duration::ZERO,
            Duration::from_millis(10),
            Arc::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        timer.cancel(handle);
        let after_cancel = repeating.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(once.load(Ordering::SeqCst), 1);
        assert!(after_cancel >= 2);
        assert!(repeating.load(Ordering::SeqCst) <= after_cancel + 1);
    }
}
