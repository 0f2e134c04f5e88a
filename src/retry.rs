//! Retry coordinator: wraps the executor with two independent failure
//! budgets, one for cooldowns and one for network faults. Intended for
//! background workloads, foreground callers should call
//! [`crate::executor::execute`] directly and handle the one error it
//! surfaces.

use rand::Rng as _;
use reqwest::Client;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{self, ResponseBody};
use crate::store::Store;

const BACKOFF_BASE_SECS: f64 = 1.0;
const BACKOFF_CAP_SECS: f64 = 20.0;

/// Executes `url` with retry, recovering cooldowns and network faults up to
/// their independent budgets and surfacing anything else (or an exhausted
/// budget) immediately.
///
/// # Errors
///
/// Returns the last [`Error::ApplicationCooldown`] / `MethodCooldown` /
/// `ServiceCooldown` / `UnspecifiedCooldown` once `attempts` is exhausted,
/// the last [`Error::NetworkFault`] once `network_tolerance` is exhausted, or
/// any other error immediately on first occurrence.
pub async fn execute_with_retry(
    url: &str,
    http_client: &Client,
    store: &dyn Store,
    config: &Config,
    attempts: u32,
    network_tolerance: u32,
) -> Result<ResponseBody> {
    assert!(attempts >= 1, "attempts must be >= 1");
    assert!(network_tolerance >= 1, "network_tolerance must be >= 1");

    let mut cooldown_failures: u32 = 0;
    let mut network_failures: u32 = 0;

    loop {
        match executor::execute(url, http_client, store, config).await {
            Ok(body) => return Ok(body),
            Err(err) if err.is_cooldown() => {
                cooldown_failures += 1;
                if cooldown_failures >= attempts {
                    return Err(err);
                }
                let wait = err.retry_after().unwrap_or(0) + 1;

                #[cfg(feature = "tracing")]
                tracing::info!(cooldown_failures, wait, "retrying after cooldown");

                sleep(Duration::from_secs(wait)).await;
            }
            Err(err) if err.as_network_fault().is_some() => {
                network_failures += 1;
                if network_failures >= network_tolerance {
                    return Err(err);
                }
                let wait = full_jitter_backoff(network_failures);

                #[cfg(feature = "tracing")]
                tracing::info!(network_failures, wait_ms = wait.as_millis() as u64, "retrying after network fault");

                sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// `Uniform(0, min(cap, base * 2^(k-1)))`, `k` the 1-based failure count.
fn full_jitter_backoff(k: u32) -> Duration {
    let upper = (BACKOFF_BASE_SECS * 2f64.powi(i32::try_from(k.saturating_sub(1)).unwrap_or(i32::MAX)))
        .min(BACKOFF_CAP_SECS);
    let secs = rand::rng().random_range(0.0..=upper.max(f64::EPSILON));
    Duration::from_secs_f64(secs)
}
