//! Wall-clock source for expiry watermarks.

use chrono::Utc;
use psnsync_core::UnixTimestamp;

pub trait Clock: Send + Sync {
    /// Current time in unix seconds.
    fn now(&self) -> UnixTimestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixTimestamp {
        Utc::now().timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_past_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
