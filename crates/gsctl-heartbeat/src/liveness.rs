//! Heartbeat freshness.

use std::time::Duration;

/// Verdict for a single heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

impl Liveness {
    pub fn is_running(self) -> bool {
        self == Liveness::Alive
    }
}

/// A heartbeat is dead once more than `timeout` has passed since it was
/// written. Timestamps ahead of `now` count as fresh.
pub fn evaluate(timestamp: i64, now: u64, timeout: Duration) -> Liveness {
    let now = i64::try_from(now).unwrap_or(i64::MAX);
    let timeout = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
    if now.saturating_sub(timestamp) > timeout {
        Liveness::Dead
    } else {
        Liveness::Alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(40);

    #[test]
    fn boundary_is_inclusive() {
        assert_eq!(evaluate(1_000, 1_040, TIMEOUT), Liveness::Alive);
        assert_eq!(evaluate(1_000, 1_041, TIMEOUT), Liveness::Dead);
    }

    #[test]
    fn future_timestamp_is_alive() {
        assert_eq!(evaluate(2_000, 1_000, TIMEOUT), Liveness::Alive);
    }

    #[test]
    fn zero_or_negative_timestamp_is_dead() {
        assert_eq!(evaluate(0, 1_000, TIMEOUT), Liveness::Dead);
        assert_eq!(evaluate(i64::MIN, 1_000, TIMEOUT), Liveness::Dead);
    }
}
