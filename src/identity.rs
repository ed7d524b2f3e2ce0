//! Consumer identity.
//!
//! Every primitive instance leases items into a processing list named after
//! its identity, so two instances never share a lease. A crashed consumer's
//! list stays behind under this name until some process reclaims it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::Clock;

/// Instances created so far in this process.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// `{hostname}[{pid}][{construction-time}]` for a new instance.
    ///
    /// The time is in microseconds and carries a per-process sequence
    /// number, so instances built in the same instant still differ.
    pub fn generate(clock: &dyn Clock) -> Self {
        let micros = (clock.precise_now() * 1_000_000.0).round() as i64;
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self::from_parts(&hostname(), std::process::id(), &format!("{micros}.{seq}"))
    }

    pub fn from_parts(host: &str, pid: u32, created: &str) -> Self {
        Self(format!("{host}[{pid}][{created}]"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Best-effort host name: `HOSTNAME`, then `/etc/hostname`, then "localhost".
pub fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    match std::fs::read_to_string("/etc/hostname") {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => "localhost".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    #[test]
    fn formats_host_pid_and_time() {
        let id = ConsumerId::from_parts("worker-7", 4242, "1444222459");
        assert_eq!(id.as_str(), "worker-7[4242][1444222459]");
        assert_eq!(id.to_string(), "worker-7[4242][1444222459]");
    }

    #[test]
    fn generated_id_embeds_pid_and_clock() {
        let clock = FixedClock::new(100.5);
        let id = ConsumerId::generate(&clock);
        let expected = format!("[{}][100500000.", std::process::id());
        assert!(id.as_str().contains(&expected), "{id}");
        assert!(id.as_str().ends_with(']'), "{id}");
        assert!(!hostname().is_empty());
    }

    #[test]
    fn ids_differ_within_the_same_instant() {
        let clock = FixedClock::new(100.0);
        let a = ConsumerId::generate(&clock);
        let b = ConsumerId::generate(&clock);
        assert_ne!(a, b);
    }
}
