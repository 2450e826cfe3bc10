//! Broker configuration.

use std::time::Duration;

/// Tunables shared by every service of a broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    /// Claim timeout used when a claim request does not carry one.
    pub default_claim_timeout: Duration,

    /// `max_attempts` of a task created without one.
    pub default_max_attempts: u32,

    /// Page size of `List tasks` without an explicit limit.
    pub default_list_limit: usize,

    /// Hard cap of `List tasks`; larger limits are clamped.
    pub max_list_limit: usize,

    /// How many eligible rows a store locks per claim before the strategy picks one.
    pub claim_candidate_batch: usize,

    pub conflict_retry: ConflictRetryPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_claim_timeout: Duration::from_secs(300),
            default_max_attempts: 3,
            default_list_limit: 100,
            max_list_limit: 1000,
            claim_candidate_batch: 16,
            conflict_retry: ConflictRetryPolicy::default(),
        }
    }
}

impl BrokerConfig {
    /// Requested list limit, defaulted and clamped to `1..=max_list_limit`.
    pub fn list_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_list_limit)
            .clamp(1, self.max_list_limit.max(1))
    }
}

/// Internal retry of operations that hit a `StoreConflict`.
///
/// Exponential backoff: `base_delay * multiplier^(retry - 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRetryPolicy {
    /// Retries after the first attempt; `0` surfaces the first conflict.
    pub max_retries: u32,

    pub base_delay: Duration,

    pub multiplier: f64,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }
}

impl ConflictRetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-indexed).
    ///
    /// Example with base_delay=10ms, multiplier=2.0:
    /// - retry 1: 10ms
    /// - retry 2: 20ms
    /// - retry 3: 40ms
    pub fn next_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}
