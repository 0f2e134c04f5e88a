//! A distributed, client-side rate-limit governor for a quota-constrained
//! upstream HTTP API.
//!
//! Many cooperating processes share one API credential subject to several
//! overlapping quotas the upstream enforces. This crate decides, before
//! every request, whether sending it would exceed any quota, checked
//! atomically against a shared store so the decision holds fleet-wide, not
//! just in one process, and reacts correctly when the upstream rate-limits
//! a request anyway.
//!
//! Three pieces compose the public surface:
//!
//! - [`classify::classify`] + [`catalog`] resolve a URL to the router,
//!   service, method, and window limits that govern it.
//! - [`executor::execute`] sweeps the four [`arbiter`] dimensions
//!   (Application, Method, Service, Unspecified) in order, issues the
//!   request, and classifies the response.
//! - [`retry::execute_with_retry`] wraps the executor with two independent
//!   retry budgets, one for cooldowns, one for network faults, for
//!   background workloads that can tolerate the resulting latency.
//!
//! Enable the `tracing` feature for structured logging of classification,
//! admission, and absorption decisions; without it the crate logs nothing
//! and `tracing` is not linked at all.

pub mod arbiter;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod retry;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use executor::{execute, ResponseBody};
pub use retry::execute_with_retry;

/// Default cooldown-retry budget for [`execute_with_retry`].
pub const DEFAULT_COOLDOWN_ATTEMPTS: u32 = 3;
/// Default network-fault-retry budget for [`execute_with_retry`].
pub const DEFAULT_NETWORK_TOLERANCE: u32 = 5;

/// [`execute_with_retry`] with the default budgets (3 cooldown retries, 5
/// network-fault retries).
///
/// # Errors
///
/// See [`execute_with_retry`].
pub async fn execute_with_default_retry(
    url: &str,
    http_client: &reqwest::Client,
    store: &dyn store::Store,
    config: &Config,
) -> Result<ResponseBody> {
    execute_with_retry(
        url,
        http_client,
        store,
        config,
        DEFAULT_COOLDOWN_ATTEMPTS,
        DEFAULT_NETWORK_TOLERANCE,
    )
    .await
}
