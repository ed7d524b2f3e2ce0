//! Time source shared by all primitives.
//!
//! Lease timestamps and pool due-times are taken from a [`Clock`] handed
//! in at construction, so tests can pin "now" to a known instant.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    /// Current UNIX timestamp in whole seconds.
    fn now(&self) -> i64;

    /// Current UNIX timestamp with sub-second precision.
    fn precise_now(&self) -> f64;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn precise_now(&self) -> f64 {
        let now = chrono::Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
    }
}

/// A clock that only moves when told to.
///
/// `precise_now` keeps a fixed fractional part on top of `now`, mirroring a
/// real microsecond clock read during the same second.
#[derive(Debug)]
pub struct FixedClock {
    micros: AtomicI64,
}

impl FixedClock {
    pub fn new(precise: f64) -> Self {
        Self {
            micros: AtomicI64::new((precise * 1_000_000.0).round() as i64),
        }
    }

    pub fn set(&self, precise: f64) {
        self.micros
            .store((precise * 1_000_000.0).round() as i64, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.micros.fetch_add(seconds * 1_000_000, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.micros.load(Ordering::SeqCst).div_euclid(1_000_000)
    }

    fn precise_now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}
