//! Bounded-retry health check for one host.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};

use vigil_core::config::PollerConfig;

use crate::probe::HealthProbe;

/// The literal body a healthy peer answers with.
pub const HEALTHY_BODY: &str = "ok";

/// Terminal outcome of a failed check cycle for one host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckError {
    /// The host answered, but not with `ok`.
    #[error("Server unhealthy {host}: {body}")]
    Unhealthy { host: String, body: String },

    /// Every attempt failed to produce a response.
    #[error("Server unresponsive {host}: {reason}")]
    Unresponsive {
        host: String,
        attempts: u32,
        reason: String,
    },
}

/// How hard to try before giving up on a host for this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub path: String,
    pub attempts: u32,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PollerConfig) -> Self {
        Self {
            path: config.path.clone(),
            attempts: config.attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            retry_delay: config.retry_delay(),
        }
    }
}

/// Check `host` at `address`, retrying transport failures.
///
/// An unhealthy answer ends the check immediately; only failures to get
/// any answer are retried, `retry.attempts` times in total.
pub async fn check_host(
    probe: &dyn HealthProbe,
    host: &str,
    address: &str,
    retry: &RetryPolicy,
) -> Result<(), CheckError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match probe.get(address, &retry.path, retry.attempt_timeout).await {
            Ok(resp) if resp.status < 300 && resp.body == HEALTHY_BODY => {
                debug!(%host, attempt, "host healthy");
                return Ok(());
            }
            Ok(resp) => {
                let body = if resp.status < 300 {
                    resp.body
                } else {
                    format!("HTTP {}: {}", resp.status, resp.body)
                };
                let err = CheckError::Unhealthy {
                    host: host.to_string(),
                    body,
                };
                error!(%host, error = %err, "server unhealthy");
                return Err(err);
            }
            Err(e) if attempt < retry.attempts => {
                debug!(%host, attempt, error = %e, delay = ?retry.retry_delay, "check failed, retrying");
                tokio::time::sleep(retry.retry_delay).await;
            }
            Err(e) => {
                let err = CheckError::Unresponsive {
                    host: host.to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                };
                error!(%host, error = %err, "server down");
                return Err(err);
            }
        }
    }
}
