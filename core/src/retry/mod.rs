//! # Retry policy
//!
//! [`compute_delay`] is the pure backoff function: strategy and attempt index
//! in, delay out. [`RetryPolicy`] binds it to a retry budget, an exponential
//! cap and a jitter mode, and answers whether a classified failure may be
//! retried at all.
//!
//! `attempt` is the 0-based index of the retry about to happen, so with a
//! base of 100 ms the exponential schedule is 100, 200, 400, ... ms.

mod jitter;

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ErrorKind;

pub use jitter::JitterMode;

/// Default cap applied to exponential delays.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Multipliers for the Fibonacci strategy; attempts past the end reuse the last one.
pub const FIBONACCI: [u64; 10] = [1, 1, 2, 3, 5, 8, 13, 21, 34, 55];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    Immediate,
    Linear,
    #[default]
    Exponential,
    #[serde(alias = "custom")]
    Fibonacci,
}

impl RetryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryStrategy::Immediate => "immediate",
            RetryStrategy::Linear => "linear",
            RetryStrategy::Exponential => "exponential",
            RetryStrategy::Fibonacci => "fibonacci",
        }
    }
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(RetryStrategy::Immediate),
            "linear" => Ok(RetryStrategy::Linear),
            "exponential" | "exponential-backoff" => Ok(RetryStrategy::Exponential),
            "fibonacci" | "custom" => Ok(RetryStrategy::Fibonacci),
            other => Err(format!("unknown retry strategy '{other}'")),
        }
    }
}

/// Backoff delay in milliseconds, exponential delays capped at [`DEFAULT_MAX_DELAY_MS`].
pub fn compute_delay(strategy: RetryStrategy, attempt: u32, base_delay_ms: u64) -> u64 {
    compute_delay_capped(strategy, attempt, base_delay_ms, DEFAULT_MAX_DELAY_MS)
}

pub fn compute_delay_capped(
    strategy: RetryStrategy,
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
) -> u64 {
    match strategy {
        RetryStrategy::Immediate => 0,
        RetryStrategy::Linear => {
            base_delay_ms.saturating_mul(u64::from(attempt).saturating_add(1))
        }
        RetryStrategy::Exponential => {
            let exp = 1u64 << attempt.min(62);
            base_delay_ms.saturating_mul(exp).min(max_delay_ms)
        }
        RetryStrategy::Fibonacci => {
            let idx = (attempt as usize).min(FIBONACCI.len() - 1);
            base_delay_ms.saturating_mul(FIBONACCI[idx])
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    pub jitter: JitterMode,
}

impl RetryPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            strategy: cfg.retry_strategy,
            base_delay_ms: cfg.base_retry_delay_ms,
            max_delay_ms: cfg.max_retry_delay_ms,
            max_retries: cfg.max_retries,
            jitter: cfg.jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// A failure is retried only while budget remains and its kind allows it.
    pub fn should_retry(&self, kind: ErrorKind, retry_count: u32) -> bool {
        retry_count < self.max_retries && !self.is_fatal_error(kind)
    }

    pub fn is_fatal_error(&self, kind: ErrorKind) -> bool {
        !kind.is_retryable()
    }

    /// Delay before retry number `attempt` (0-based), jitter included.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let ms =
            compute_delay_capped(self.strategy, attempt, self.base_delay_ms, self.max_delay_ms);
        self.jitter.apply(Duration::from_millis(ms))
    }

    /// The full un-jittered schedule for this policy's retry budget.
    pub fn schedule(&self) -> Vec<u64> {
        (0..self.max_retries)
            .map(|attempt| {
                compute_delay_capped(self.strategy, attempt, self.base_delay_ms, self.max_delay_ms)
            })
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
