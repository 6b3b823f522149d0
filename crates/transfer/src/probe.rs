//! Readiness probe: confirms the endpoint accepts requests before a
//! transfer starts.
//!
//! Every attempt builds a fresh `reqwest::Client` so a cached stale DNS
//! answer from an earlier attempt can never poison the next one. Freshly
//! provisioned endpoints routinely answer with transient non-success
//! statuses or refuse connections while DNS propagates; both are retried.

use reqwest::Client;
use skiff_protocol::routes;
use tracing::debug;

use crate::retry::{RetryPolicy, retry};
use crate::{REQUEST_TIMEOUT, TransferError};

/// Probes `GET {endpoint}/ping` with bearer auth until it succeeds.
///
/// On exhaustion, returns a connection error naming the endpoint, the
/// attempt count, and the last failure.
pub async fn wait_until_ready(
    endpoint: &str,
    token: &str,
    policy: &RetryPolicy,
) -> Result<(), TransferError> {
    let attempts = std::cell::Cell::new(0u32);

    let result = retry(policy, || {
        attempts.set(attempts.get() + 1);
        ping_once(endpoint, token)
    })
    .await;

    match result {
        Ok(()) => {
            debug!(endpoint, attempts = attempts.get(), "endpoint ready");
            Ok(())
        }
        Err(err) => Err(TransferError::Connection {
            endpoint: endpoint.to_string(),
            reason: format!("not ready after {} attempts: {err}", attempts.get()),
        }),
    }
}

async fn ping_once(endpoint: &str, token: &str) -> Result<(), TransferError> {
    // Fresh connection pool per attempt, on purpose.
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| TransferError::Transport {
            context: "building probe client".into(),
            source: e,
        })?;

    let response = client
        .get(format!("{endpoint}{}", routes::PING))
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| TransferError::Transport {
            context: "ping".into(),
            source: e,
        })?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransferError::Unready {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}
