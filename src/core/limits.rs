//! Input limits and per-run abort checks.
//!
//! Prompts are validated before a run starts. During a run, a [`RunGuard`] is
//! consulted at every stage boundary so a caller can cancel, and a runaway run
//! stops at its deadline.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Limits applied to build requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLimits {
    /// Minimum prompt length in characters (default: 3)
    #[serde(default = "default_min_prompt_chars")]
    pub min_prompt_chars: usize,

    /// Maximum prompt size in bytes (default: 64KB)
    #[serde(default = "default_max_prompt_bytes")]
    pub max_prompt_bytes: usize,

    /// Total run deadline in seconds (default: 300 = 5 min)
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
}

fn default_min_prompt_chars() -> usize {
    3
}
fn default_max_prompt_bytes() -> usize {
    64 * 1024
}
fn default_run_timeout() -> u64 {
    300
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            min_prompt_chars: default_min_prompt_chars(),
            max_prompt_bytes: default_max_prompt_bytes(),
            run_timeout_seconds: default_run_timeout(),
        }
    }
}

impl RunLimits {
    /// Reject prompts that are too short or too large
    pub fn validate_prompt(&self, prompt: &str) -> Result<(), LimitViolation> {
        let chars = prompt.chars().count();
        if chars < self.min_prompt_chars {
            return Err(LimitViolation::PromptTooShort {
                actual: chars,
                min: self.min_prompt_chars,
            });
        }

        if prompt.len() > self.max_prompt_bytes {
            return Err(LimitViolation::PromptTooLarge {
                actual: prompt.len(),
                limit: self.max_prompt_bytes,
            });
        }

        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }

    /// Start guarding a run
    pub fn guard(&self, cancel: CancellationToken) -> RunGuard {
        RunGuard::new(cancel, self.run_timeout())
    }
}

/// Cancellation token plus deadline for a single run
#[derive(Debug, Clone)]
pub struct RunGuard {
    cancel: CancellationToken,
    started_at: Instant,
    timeout: Duration,
}

impl RunGuard {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            started_at: Instant::now(),
            timeout,
        }
    }

    /// Called before each stage starts
    pub fn check(&self) -> Result<(), LimitViolation> {
        if self.cancel.is_cancelled() {
            return Err(LimitViolation::Cancelled);
        }

        if self.started_at.elapsed() >= self.timeout {
            return Err(self.deadline_exceeded());
        }

        Ok(())
    }

    /// Run `fut` unless the run is cancelled or hits its deadline first
    pub async fn race<F: Future>(&self, fut: F) -> Result<F::Output, LimitViolation> {
        self.check()?;

        tokio::select! {
            biased;
            output = fut => Ok(output),
            _ = self.cancel.cancelled() => Err(LimitViolation::Cancelled),
            _ = tokio::time::sleep(self.remaining()) => Err(self.deadline_exceeded()),
        }
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started_at.elapsed())
    }

    fn deadline_exceeded(&self) -> LimitViolation {
        LimitViolation::RunTimeout {
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
            limit_seconds: self.timeout.as_secs(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Limit violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("Prompt too short: {actual} < {min} characters")]
    PromptTooShort { actual: usize, min: usize },

    #[error("Prompt too large: {actual} > {limit} bytes")]
    PromptTooLarge { actual: usize, limit: usize },

    #[error("Run deadline exceeded: {elapsed_ms}ms >= {limit_seconds}s")]
    RunTimeout { elapsed_ms: u64, limit_seconds: u64 },

    #[error("Run cancelled by caller")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = RunLimits::default();
        assert_eq!(limits.min_prompt_chars, 3);
        assert_eq!(limits.max_prompt_bytes, 64 * 1024);
        assert_eq!(limits.run_timeout_seconds, 300);
    }

    #[test]
    fn test_prompt_validation() {
        let limits = RunLimits {
            max_prompt_bytes: 10,
            ..Default::default()
        };

        assert!(limits.validate_prompt("api").is_ok());
        assert!(matches!(
            limits.validate_prompt("ab"),
            Err(LimitViolation::PromptTooShort { actual: 2, min: 3 })
        ));
        assert!(matches!(
            limits.validate_prompt(&"x".repeat(20)),
            Err(LimitViolation::PromptTooLarge { .. })
        ));
    }

    #[test]
    fn test_min_length_counts_characters() {
        let limits = RunLimits::default();
        // Three characters, more than three bytes
        assert!(limits.validate_prompt("日本語").is_ok());
    }

    #[test]
    fn test_guard_cancellation() {
        let token = CancellationToken::new();
        let guard = RunLimits::default().guard(token.clone());
        assert!(guard.check().is_ok());

        token.cancel();
        assert_eq!(guard.check(), Err(LimitViolation::Cancelled));
    }

    #[tokio::test]
    async fn test_race_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let guard = RunLimits::default().guard(token.clone());

        let canceller = async {
            tokio::task::yield_now().await;
            token.cancel();
        };
        let (result, _) = tokio::join!(guard.race(std::future::pending::<()>()), canceller);
        assert_eq!(result, Err(LimitViolation::Cancelled));
    }

    #[tokio::test]
    async fn test_race_deadline() {
        let guard = RunGuard::new(CancellationToken::new(), Duration::from_millis(20));
        let result = guard.race(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(LimitViolation::RunTimeout { .. })));

        let guard = RunLimits::default().guard(CancellationToken::new());
        assert_eq!(guard.race(async { 7 }).await, Ok(7));
    }

    #[test]
    fn test_guard_deadline() {
        let guard = RunGuard::new(CancellationToken::new(), Duration::ZERO);
        assert!(matches!(
            guard.check(),
            Err(LimitViolation::RunTimeout { limit_seconds: 0, .. })
        ));
    }
}
