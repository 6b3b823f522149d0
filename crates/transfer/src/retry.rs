//! Bounded-retry executor with failure classification.
//!
//! Server overload (502/503/504) and generic transport faults back off
//! exponentially up to the configured ceiling. Connection-establishment
//! failures get a raised ceiling and a fixed first delay, because DNS
//! propagation is not well modeled by exponential growth from attempt 1.
//! Everything else propagates immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::TransferError;

/// How a failed attempt should be handled by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryClass {
    /// Server reported 502/503/504.
    ServerBusy,
    /// DNS resolution or TCP connect failed.
    Connect,
    /// Timeout, disconnect, or truncated payload.
    Transport,
    /// Not retryable.
    Fatal,
}

impl TransferError {
    pub(crate) fn retry_class(&self) -> RetryClass {
        match self {
            TransferError::Status { status, .. } if matches!(*status, 502 | 503 | 504) => {
                RetryClass::ServerBusy
            }
            TransferError::Transport { source, .. } => {
                if source.is_connect() {
                    RetryClass::Connect
                } else if source.is_timeout()
                    || source.is_body()
                    || source.is_decode()
                    || source.is_request()
                {
                    RetryClass::Transport
                } else {
                    RetryClass::Fatal
                }
            }
            TransferError::Unready { .. } => RetryClass::Transport,
            _ => RetryClass::Fatal,
        }
    }
}

/// Retry ceilings and backoff shape for one operation invocation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt ceiling for server-busy and transport failures.
    pub max_retries: u32,
    /// Base of the exponential backoff; attempt `n` sleeps `base ^ n` seconds.
    pub backoff_base: f64,
    /// Minimum attempt ceiling for connection/DNS failures.
    pub connect_retry_floor: u32,
    /// Fixed delay before the first retry of a connection/DNS failure.
    pub connect_retry_delay: Duration,
    /// Cap on any single backoff sleep.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: 2.0,
            connect_retry_floor: 7,
            connect_retry_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Attempt ceiling for a failure class.
    fn ceiling(&self, class: RetryClass) -> u32 {
        match class {
            RetryClass::Connect => self.max_retries.max(self.connect_retry_floor),
            _ => self.max_retries,
        }
    }

    /// Sleep before the retry following failed attempt `attempt` (1-based).
    ///
    /// Connection failures wait a fixed interval first; their exponential
    /// schedule is counted from the second attempt.
    pub(crate) fn delay_for(&self, class: RetryClass, attempt: u32) -> Duration {
        let exp = match class {
            RetryClass::Connect if attempt == 1 => return self.connect_retry_delay,
            RetryClass::Connect => attempt.saturating_sub(1),
            _ => attempt,
        };
        let secs = self.backoff_base.powi(exp.min(63) as i32);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Invokes `op` until it succeeds or its failure class exhausts the policy.
///
/// The attempt counter is local to this call and the last captured error is
/// returned unchanged, so callers can still distinguish failure kinds after
/// exhaustion.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut attempt: u32 = 1;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let class = err.retry_class();
        if class == RetryClass::Fatal {
            return Err(err);
        }

        let ceiling = policy.ceiling(class);
        if attempt >= ceiling {
            return Err(err);
        }

        let delay = policy.delay_for(class, attempt);
        warn!(
            attempt,
            ceiling,
            delay_secs = delay.as_secs_f64(),
            error = %err,
            "retrying after failure"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
