//! Cheap monotonic millisecond clock.
//!
//! A background thread refreshes a shared atomic every period, so reading "now" on the
//! hot path is one atomic load instead of a system clock call. The value is milliseconds
//! since the clock was created and never goes backwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::warn;

/// Monotonic milliseconds, refreshed at a fixed period.
#[derive(Debug)]
pub struct Clock {
    origin: Instant,
    now: AtomicU64,
    period: Duration,
    ticking: AtomicBool,
    manual: bool,
}

static GLOBAL: OnceLock<Arc<Clock>> = OnceLock::new();

impl Clock {
    /// Start a clock refreshed every `period` (at least one millisecond).
    ///
    /// The refresh thread stops once the last `Arc<Clock>` is dropped. If the thread
    /// cannot be spawned the clock reads the system clock directly instead.
    pub fn start(period: Duration) -> Arc<Clock> {
        let period = period.max(Duration::from_millis(1));
        let clock = Arc::new(Clock {
            origin: Instant::now(),
            now: AtomicU64::new(0),
            period,
            ticking: AtomicBool::new(true),
            manual: false,
        });

        let weak = Arc::downgrade(&clock);
        let spawned = thread::Builder::new()
            .name("graphrun-clock".to_string())
            .spawn(move || tick(weak, period));

        if let Err(_err) = spawned {
            #[cfg(feature = "tracing")]
            warn!(error = %_err, "failed to spawn clock thread, reading system clock directly");

            clock.ticking.store(false, Ordering::Relaxed);
        }

        clock
    }

    /// Process-wide clock with a 1 ms period, started on first use.
    pub fn global() -> Arc<Clock> {
        Arc::clone(GLOBAL.get_or_init(|| Clock::start(Duration::from_millis(1))))
    }

    /// A clock that only moves through [`Clock::advance`]. Meant for tests.
    pub fn manual() -> Arc<Clock> {
        Arc::new(Clock {
            origin: Instant::now(),
            now: AtomicU64::new(0),
            period: Duration::ZERO,
            ticking: AtomicBool::new(false),
            manual: true,
        })
    }

    /// Move a manual clock forward. Ignored by ticking clocks.
    pub fn advance(&self, by: Duration) {
        if self.manual {
            let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
            self.now.fetch_add(millis, Ordering::Relaxed);
        }
    }

    /// Milliseconds since the clock was created.
    pub fn now_millis(&self) -> u64 {
        if self.manual || self.ticking.load(Ordering::Relaxed) {
            self.now.load(Ordering::Relaxed)
        } else {
            millis_since(self.origin)
        }
    }

    /// Milliseconds elapsed since `start`, a previous [`Clock::now_millis`] reading.
    pub fn elapsed_since(&self, start: u64) -> u64 {
        self.now_millis().saturating_sub(start)
    }

    /// Refresh period; zero for manual clocks.
    pub fn period(&self) -> Duration {
        self.period
    }
}

fn tick(clock: Weak<Clock>, period: Duration) {
    loop {
        thread::sleep(period);
        let Some(clock) = clock.upgrade() else {
            return;
        };
        clock.now.store(millis_since(clock.origin), Ordering::Relaxed);
    }
}

fn millis_since(origin: Instant) -> u64 {
    u64::try_from(origin.elapsed().as_millis()).unwrap_or(u64::MAX)
}
