//! Retry engine: given a failure classification,
//! decides whether to retry, after what delay, and why.

use agentgate_core::ErrorKind;
use rand::Rng;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub base_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
    pub max_retries: u32,
    /// Whether `agent_crash` is retryable. Defaults to `false` — a crash is
    /// treated as a signal something is structurally wrong with the agent
    /// invocation, not a transient fault.
    pub crash_retryable: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            multiplier: 2.0,
            max_backoff_ms: 60_000,
            jitter: true,
            max_retries: 5,
            crash_retryable: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay_ms: u64,
    pub reason: String,
}

impl RetryPolicy {
    fn is_retryable(&self, kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::AgentCrash => self.crash_retryable,
            other => other.default_retryable(),
        }
    }

    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        if !self.is_retryable(kind) {
            return RetryDecision {
                should_retry: false,
                delay_ms: 0,
                reason: format!("{kind} is not retryable"),
            };
        }
        if attempt >= self.max_retries {
            return RetryDecision {
                should_retry: false,
                delay_ms: 0,
                reason: format!("exceeded max_retries ({})", self.max_retries),
            };
        }

        let raw = (self.base_ms as f64) * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_backoff_ms as f64);
        let delay_ms = if self.jitter {
            let jitter_span = capped * 0.25;
            capped + rand::thread_rng().gen_range(0.0..=jitter_span)
        } else {
            capped
        };

        RetryDecision {
            should_retry: true,
            delay_ms: delay_ms.round() as u64,
            reason: format!("{kind} is retryable (attempt {attempt})"),
        }
    }

    pub fn delay(&self, decision: &RetryDecision) -> Duration {
        Duration::from_millis(decision.delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryable_set_matches_spec() {
        let policy = RetryPolicy::default();
        assert!(policy.decide(ErrorKind::AgentTimeout, 0).should_retry);
        assert!(policy.decide(ErrorKind::SystemError, 0).should_retry);
        assert!(policy.decide(ErrorKind::GithubError, 0).should_retry);
        assert!(!policy.decide(ErrorKind::AgentCrash, 0).should_retry);
        assert!(!policy.decide(ErrorKind::Validation, 0).should_retry);
    }

    #[test]
    fn crash_retryable_knob_opts_in() {
        let mut policy = RetryPolicy::default();
        policy.crash_retryable = true;
        assert!(policy.decide(ErrorKind::AgentCrash, 0).should_retry);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..Default::default()
        };
        let d0 = policy.decide(ErrorKind::SystemError, 0);
        let d1 = policy.decide(ErrorKind::SystemError, 1);
        let d2 = policy.decide(ErrorKind::SystemError, 2);
        assert_eq!(d0.delay_ms, 1_000);
        assert_eq!(d1.delay_ms, 2_000);
        assert_eq!(d2.delay_ms, 4_000);

        let d_big = policy.decide(ErrorKind::SystemError, 20);
        assert!(d_big.should_retry == false || d_big.delay_ms <= policy.max_backoff_ms);
    }

    #[test]
    fn stops_after_max_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        assert!(policy.decide(ErrorKind::SystemError, 1).should_retry);
        assert!(!policy.decide(ErrorKind::SystemError, 2).should_retry);
    }
}
