use std::time::Duration;

use rand::Rng;

const MAX_BACKOFF: Duration = Duration::from_secs(64);
const MAX_JITTER_MICROS: u64 = 1_000_000;

/// Retry budget for transport-level failures of a single hop.
///
/// HTTP responses, whatever their status, never consume this budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
}

impl RetryPolicy {
    pub const fn disabled() -> Self {
        Self { max_retries: 0 }
    }

    pub const fn limited(max_retries: usize) -> Self {
        Self { max_retries }
    }

    pub const fn max_retries(self) -> usize {
        self.max_retries
    }

    /// Whether another attempt is allowed after `retries_so_far` retries.
    pub const fn allows_retry(self, retries_so_far: usize) -> bool {
        retries_so_far < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based):
    /// `min(2^attempt s + U(0, 1 s), 64 s)`.
    pub fn backoff_for_retry(self, attempt: usize) -> Duration {
        let jitter_micros = rand::rng().random_range(0..=MAX_JITTER_MICROS);
        backoff_with_jitter(attempt, Duration::from_micros(jitter_micros))
    }
}

pub(crate) fn backoff_with_jitter(attempt: usize, jitter: Duration) -> Duration {
    let exponent = attempt.min(32) as u32;
    let base = Duration::from_secs(1_u64 << exponent);
    base.saturating_add(jitter).min(MAX_BACKOFF)
}
