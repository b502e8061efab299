use std::time::Duration;

use serde::Deserialize;

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// How the synchronizer re-attaches a change feed after it drops.
///
/// Exponential backoff: `initial_delay_ms * 2^attempt`, capped at
/// `max_delay_ms`. `max_attempts = None` retries forever; `Some(0)` never
/// reconnects. Reconnecting only re-subscribes; the initial query is not
/// repeated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// A dropped feed stays dropped.
    pub fn never() -> Self {
        Self { max_attempts: Some(0), ..Self::default() }
    }

    pub fn backoff(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay_ms: initial.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay before reconnect attempt number `attempt` (0-based), or `None`
    /// once the attempt budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }
        let ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        Some(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..7)
            .map(|a| policy.delay(a).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        assert_eq!(policy.delay(200), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_attempt_budget() {
        assert_eq!(ReconnectPolicy::never().delay(0), None);

        let policy = ReconnectPolicy::default().with_max_attempts(2);
        assert!(policy.delay(1).is_some());
        assert_eq!(policy.delay(2), None);
    }
}
