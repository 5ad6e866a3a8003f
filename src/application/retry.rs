//! Per-account retry policy
//!
//! Up to `max_attempts` tries. Between tries the wait is
//! `attempt * unit`, where the unit is long for navigation/network-class
//! failures and short otherwise. The wait aborts as soon as the stop token
//! fires. The last failure is handed back unchanged so the caller can still
//! match on its class.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::SiteError;

pub mod defaults {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const SHORT_BACKOFF_SECS: u64 = 30;
    pub const LONG_BACKOFF_SECS: u64 = 60;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub short_backoff: Duration,
    pub long_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            short_backoff: Duration::from_secs(defaults::SHORT_BACKOFF_SECS),
            long_backoff: Duration::from_secs(defaults::LONG_BACKOFF_SECS),
        }
    }
}

impl RetryPolicy {
    /// Wait after the 1-based `attempt` failed with `error`.
    pub fn backoff_after(&self, error: &SiteError, attempt: u32) -> Duration {
        let unit = if error.class().uses_long_backoff() {
            self.long_backoff
        } else {
            self.short_backoff
        };
        unit * attempt
    }
}

/// Why no attempt succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    /// Every attempt failed; carries the last error.
    Exhausted { error: SiteError, attempts: u32 },
    /// A stop was requested before the next attempt could start.
    Stopped { error: SiteError, attempts: u32 },
}

impl RetryFailure {
    pub const fn error(&self) -> &SiteError {
        match self {
            Self::Exhausted { error, .. } | Self::Stopped { error, .. } => error,
        }
    }

    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Stopped { attempts, .. } => *attempts,
        }
    }

    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

/// Run `attempt_fn` under `policy`, passing the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    stop: &CancellationToken,
    label: &str,
    mut attempt_fn: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SiteError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match attempt_fn(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!("✅ {} succeeded on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if attempt >= max_attempts {
            warn!(
                "❌ {} failed after {} attempts ({}): {}",
                label,
                attempt,
                error.class().as_str(),
                error
            );
            return Err(RetryFailure::Exhausted {
                error,
                attempts: attempt,
            });
        }

        if stop.is_cancelled() {
            info!("🛑 {} stop requested after attempt {}, not retrying", label, attempt);
            return Err(RetryFailure::Stopped {
                error,
                attempts: attempt,
            });
        }

        let wait = policy.backoff_after(&error, attempt);
        warn!(
            "🔄 {} attempt {}/{} failed ({}): {}. Retrying in {}s",
            label,
            attempt,
            max_attempts,
            error.class().as_str(),
            error,
            wait.as_secs()
        );

        tokio::select! {
            biased;
            () = stop.cancelled() => {
                info!("🛑 {} stop requested during retry backoff", label);
                return Err(RetryFailure::Stopped { error, attempts: attempt });
            }
            () = tokio::time::sleep(wait) => {}
        }

        attempt += 1;
    }
}
