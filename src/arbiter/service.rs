//! Service arbiter: cooldown-only, per router and service, fixed 68s TTL.

use crate::error::{Enforcement, Error, OffendingContext, Result, ServiceCooldown};
use crate::store::Store;

use super::DEFAULT_COOLDOWN_SECS;

pub struct ServiceArbiter<'s> {
    store: &'s dyn Store,
}

impl<'s> ServiceArbiter<'s> {
    #[must_use]
    pub fn new(store: &'s dyn Store) -> Self {
        Self { store }
    }

    fn key(router: &str, service: &str) -> String {
        format!("svc-block:{router}:{service}")
    }

    pub async fn admit(&self, router: &str, service: &str, endpoint: &str) -> Result<()> {
        let decision = self.store.cooldown_admit(&Self::key(router, service)).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(router, service, allowed = decision.allowed, "service admit");

        if decision.allowed {
            return Ok(());
        }

        Err(Error::ServiceCooldown(Box::new(ServiceCooldown {
            retry_after: decision.retry_after,
            enforcement: Enforcement::Internal,
            router: router.to_owned(),
            service: service.to_owned(),
            endpoint: endpoint.to_owned(),
            offending_context: None,
        })))
    }

    /// Always fails, the upstream supplies no retry hint for service
    /// cooldowns, so the marker is always written with the fixed TTL.
    pub async fn absorb(&self, router: &str, service: &str, endpoint: &str, context: OffendingContext) -> Result<()> {
        self.store
            .absorb_create_if_absent(&Self::key(router, service), DEFAULT_COOLDOWN_SECS)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::warn!(router, service, "service cooldown absorbed");

        Err(Error::ServiceCooldown(Box::new(ServiceCooldown {
            retry_after: DEFAULT_COOLDOWN_SECS,
            enforcement: Enforcement::External,
            router: router.to_owned(),
            service: service.to_owned(),
            endpoint: endpoint.to_owned(),
            offending_context: Some(context),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn absorb_blocks_subsequent_admits_until_expiry() {
        let store = InMemoryStore::new();
        let arbiter = ServiceArbiter::new(&store);
        let err = arbiter
            .absorb("na1", "MATCH", "https://na1/x", OffendingContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceCooldown(_)));
        assert_eq!(err.retry_after(), Some(DEFAULT_COOLDOWN_SECS));

        let denied = arbiter.admit("na1", "MATCH", "https://na1/x").await.unwrap_err();
        assert!(matches!(denied, Error::ServiceCooldown(_)));
    }

    #[tokio::test]
    async fn unrelated_router_service_pair_is_unaffected() {
        let store = InMemoryStore::new();
        let arbiter = ServiceArbiter::new(&store);
        arbiter
            .absorb("na1", "MATCH", "https://na1/x", OffendingContext::default())
            .await
            .unwrap_err();
        arbiter.admit("euw1", "MATCH", "https://euw1/x").await.unwrap();
    }
}
