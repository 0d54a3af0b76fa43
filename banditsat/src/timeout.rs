//! Run deadlines.
//!
//! A [`Deadline`] spawns a watcher thread that snapshots the best reward the
//! moment the time limit passes and then raises a flag. The driver keeps the
//! reward cell current and polls the flag between tree descents, so an
//! in-flight descent always completes: its improvements still count towards
//! the run's best reward, but not towards the snapshot taken at the
//! deadline.
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

#[derive(Default)]
struct Shared {
    /// Set once the deadline has passed.
    expired: AtomicBool,
    /// Bits of the best reward reported so far.
    best: AtomicU64,
    /// Bits of the best reward at the moment the deadline passed.
    snapshot: AtomicU64,
    /// Cancellation flag, used to stop the watcher early.
    cancelled: Mutex<bool>,
    /// Signalled on cancellation.
    wakeup: Condvar,
}

/// A one-shot asynchronous deadline.
pub struct Deadline {
    shared: Arc<Shared>,
    watcher: Option<JoinHandle<()>>,
}

impl Deadline {
    /// Starts a watcher that fires after the given time limit.
    pub fn start(limit: Duration) -> Deadline {
        let shared = Arc::new(Shared::default());
        let watcher_shared = Arc::clone(&shared);
        let end = Instant::now() + limit;

        let watcher = std::thread::spawn(move || {
            let mut cancelled = watcher_shared.cancelled.lock().unwrap();
            loop {
                if *cancelled {
                    return;
                }
                let now = Instant::now();
                if now >= end {
                    break;
                }
                let (guard, _) = watcher_shared
                    .wakeup
                    .wait_timeout(cancelled, end - now)
                    .unwrap();
                cancelled = guard;
            }
            let best = watcher_shared.best.load(Ordering::Relaxed);
            watcher_shared.snapshot.store(best, Ordering::Release);
            watcher_shared.expired.store(true, Ordering::Release);
        });

        Deadline {
            shared,
            watcher: Some(watcher),
        }
    }

    /// Publishes a new best reward for the watcher to snapshot.
    pub fn record(&self, reward: f64) {
        self.shared.best.store(reward.to_bits(), Ordering::Relaxed);
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.shared.expired.load(Ordering::Acquire)
    }

    /// The best reward at the moment the deadline passed.
    ///
    /// Only meaningful once [`expired`][Self::expired] returns `true`.
    pub fn snapshot(&self) -> f64 {
        f64::from_bits(self.shared.snapshot.load(Ordering::Acquire))
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        *self.shared.cancelled.lock().unwrap() = true;
        self.shared.wakeup.notify_one();
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
    }
}
