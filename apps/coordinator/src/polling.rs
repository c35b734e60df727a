use std::time::Duration;

use eps_spine_client::PollPolicy;

use crate::config::PollingConfig;

/// Polls at a fixed interval until either the attempt cap or the deadline is
/// reached. A wait that would end past the deadline is not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedIntervalPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl FixedIntervalPolicy {
    pub fn new(interval: Duration, max_attempts: u32, deadline: Duration) -> Self {
        Self {
            interval,
            max_attempts,
            deadline,
        }
    }
}

impl From<&PollingConfig> for FixedIntervalPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.interval_ms),
            config.max_attempts,
            Duration::from_secs(config.deadline_secs),
        )
    }
}

impl PollPolicy for FixedIntervalPolicy {
    fn next_delay(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        if attempt >= self.max_attempts || elapsed + self.interval > self.deadline {
            return None;
        }
        Some(self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FixedIntervalPolicy {
        FixedIntervalPolicy::new(Duration::from_secs(1), 3, Duration::from_secs(10))
    }

    #[test]
    fn waits_the_interval_while_within_limits() {
        assert_eq!(policy().next_delay(0, Duration::ZERO), Some(Duration::from_secs(1)));
        assert_eq!(policy().next_delay(2, Duration::from_secs(5)), Some(Duration::from_secs(1)));
    }

    #[test]
    fn stops_at_the_attempt_cap() {
        assert_eq!(policy().next_delay(3, Duration::ZERO), None);
    }

    #[test]
    fn stops_before_overrunning_the_deadline() {
        assert_eq!(policy().next_delay(1, Duration::from_secs(9)), Some(Duration::from_secs(1)));
        assert_eq!(policy().next_delay(1, Duration::from_millis(9_500)), None);
    }

    #[test]
    fn built_from_config() {
        let config = PollingConfig {
            interval_ms: 250,
            max_attempts: 4,
            deadline_secs: 2,
        };
        assert_eq!(
            FixedIntervalPolicy::from(&config),
            FixedIntervalPolicy::new(Duration::from_millis(250), 4, Duration::from_secs(2))
        );
    }
}
