use std::time::{Duration, Instant};

/// A wall-clock countdown that can also be expired by hand.
#[derive(Debug, Clone)]
pub struct Countdown {
    duration: Duration,
    started: Instant,
    expired: bool,
}

impl Countdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: Instant::now(),
            expired: false,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn remaining(&self) -> Duration {
        if self.expired {
            return Duration::ZERO;
        }
        self.duration.saturating_sub(self.started.elapsed())
    }

    pub fn has_expired(&self) -> bool {
        self.expired || self.started.elapsed() >= self.duration
    }

    pub fn set_expired(&mut self) {
        self.expired = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_is_expired_immediately() {
        let timer = Countdown::new(Duration::ZERO);
        assert!(timer.has_expired());
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    #[test]
    fn counts_down_and_can_be_forced() {
        let mut timer = Countdown::new(Duration::from_secs(60));
        assert!(!timer.has_expired());
        assert!(timer.remaining() > Duration::from_secs(59));
        timer.set_expired();
        assert!(timer.has_expired());
        assert_eq!(timer.remaining(), Duration::ZERO);
        assert_eq!(timer.duration(), Duration::from_secs(60));
    }
}
