//! The four sibling arbiters: Application, Method, Service, and Unspecified.
//! Each wraps one dimension of the shared store's atomic contract; the
//! executor sweeps them in this fixed order on every request.

mod application;
mod method;
mod service;
mod unspecified;

pub use application::ApplicationArbiter;
pub use method::MethodArbiter;
pub use service::ServiceArbiter;
pub use unspecified::UnspecifiedArbiter;

/// Default cooldown length applied whenever the upstream supplies no
/// `retry-after` hint.
pub const DEFAULT_COOLDOWN_SECS: u64 = 68;

fn normalize_retry_after(retry_after_s: Option<u64>) -> u64 {
    match retry_after_s {
        Some(0) | None => DEFAULT_COOLDOWN_SECS,
        Some(v) => v,
    }
}
