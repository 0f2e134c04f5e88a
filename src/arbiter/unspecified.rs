//! Unspecified arbiter: cooldown-only, per router, for upstream cooldown
//! responses that arrive without a classification header.

use crate::error::{Enforcement, Error, OffendingContext, Result, UnspecifiedCooldown};
use crate::store::Store;

use super::normalize_retry_after;

pub struct UnspecifiedArbiter<'s> {
    store: &'s dyn Store,
}

impl<'s> UnspecifiedArbiter<'s> {
    #[must_use]
    pub fn new(store: &'s dyn Store) -> Self {
        Self { store }
    }

    fn key(router: &str) -> String {
        format!("unspec-block:{router}")
    }

    pub async fn admit(&self, router: &str, service: &str, method_id: &str, endpoint: &str) -> Result<()> {
        let decision = self.store.cooldown_admit(&Self::key(router)).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(router, allowed = decision.allowed, "unspecified admit");

        if decision.allowed {
            return Ok(());
        }

        Err(Error::UnspecifiedCooldown(Box::new(UnspecifiedCooldown {
            retry_after: decision.retry_after,
            enforcement: Enforcement::Internal,
            router: router.to_owned(),
            service: service.to_owned(),
            method_id: method_id.to_owned(),
            endpoint: endpoint.to_owned(),
            offending_context: None,
        })))
    }

    /// Always fails, writing the marker with the supplied retry-after
    /// (defaulting to 68s) via create-if-absent.
    pub async fn absorb(
        &self,
        router: &str,
        service: &str,
        method_id: &str,
        endpoint: &str,
        retry_after_s: Option<u64>,
        context: OffendingContext,
    ) -> Result<()> {
        let retry_after = normalize_retry_after(retry_after_s);
        self.store.absorb_create_if_absent(&Self::key(router), retry_after).await?;

        #[cfg(feature = "tracing")]
        tracing::warn!(router, retry_after, "unspecified cooldown absorbed");

        Err(Error::UnspecifiedCooldown(Box::new(UnspecifiedCooldown {
            retry_after,
            enforcement: Enforcement::External,
            router: router.to_owned(),
            service: service.to_owned(),
            method_id: method_id.to_owned(),
            endpoint: endpoint.to_owned(),
            offending_context: Some(context),
        })))
    }
}
