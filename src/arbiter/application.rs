//! Application arbiter: credential-wide seconds/minutes windows, per router.

use crate::config::Config;
use crate::error::{ApplicationCooldown, Enforcement, Error, OffendingContext, Result, WindowAccounting};
use crate::store::{Store, TwoWindowKeys, WindowSpec};

use super::normalize_retry_after;

/// Permissive defaults used outside production mode.
const DEV_SECONDS: WindowSpec = WindowSpec {
    limit: 20,
    window_secs: 1,
};
const DEV_MINUTES: WindowSpec = WindowSpec {
    limit: 100,
    window_secs: 120,
};

/// Strict defaults used when the credential is marked production.
const PROD_SECONDS: WindowSpec = WindowSpec {
    limit: 500,
    window_secs: 10,
};
const PROD_MINUTES: WindowSpec = WindowSpec {
    limit: 30_000,
    window_secs: 600,
};

pub struct ApplicationArbiter<'s> {
    store: &'s dyn Store,
    seconds: WindowSpec,
    minutes: WindowSpec,
}

impl<'s> ApplicationArbiter<'s> {
    #[must_use]
    pub fn new(store: &'s dyn Store, config: &Config) -> Self {
        let (default_seconds, default_minutes) = if config.production {
            (PROD_SECONDS, PROD_MINUTES)
        } else {
            (DEV_SECONDS, DEV_MINUTES)
        };
        let overrides = config.application_overrides;
        let seconds = WindowSpec {
            limit: overrides.seconds_limit.unwrap_or(default_seconds.limit),
            window_secs: overrides.seconds_window.unwrap_or(default_seconds.window_secs),
        };
        let minutes = WindowSpec {
            limit: overrides.minutes_limit.unwrap_or(default_minutes.limit),
            window_secs: overrides.minutes_window.unwrap_or(default_minutes.window_secs),
        };
        Self { store, seconds, minutes }
    }

    fn keys(router: &str) -> (String, String, String) {
        (
            format!("app:{router}:seconds"),
            format!("app:{router}:minutes"),
            format!("app-block:{router}"),
        )
    }

    /// Pre-request check-and-increment against both windows.
    pub async fn admit(&self, router: &str, endpoint: &str) -> Result<()> {
        let (seconds_key, minutes_key, block_key) = Self::keys(router);
        let decision = self
            .store
            .two_window_admit(
                TwoWindowKeys {
                    seconds_key: &seconds_key,
                    minutes_key: &minutes_key,
                    block_key: &block_key,
                },
                Some(self.seconds),
                Some(self.minutes),
            )
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(router, reason = decision.reason, allowed = decision.allowed, "application admit");

        if decision.allowed {
            return Ok(());
        }

        Err(Error::ApplicationCooldown(Box::new(ApplicationCooldown {
            retry_after: decision.retry_after.max(1),
            enforcement: Enforcement::Internal,
            router: router.to_owned(),
            endpoint: endpoint.to_owned(),
            reason: decision.reason,
            seconds: Some(WindowAccounting {
                limit: self.seconds.limit,
                window_secs: self.seconds.window_secs,
                observed_count: decision.seconds_count,
            }),
            minutes: Some(WindowAccounting {
                limit: self.minutes.limit,
                window_secs: self.minutes.window_secs,
                observed_count: decision.minutes_count,
            }),
            offending_context: None,
        })))
    }

    /// Post-response absorption of an upstream cooldown. Always fails.
    pub async fn absorb(
        &self,
        router: &str,
        endpoint: &str,
        retry_after_s: Option<u64>,
        context: OffendingContext,
    ) -> Result<()> {
        let supplied = normalize_retry_after(retry_after_s);
        let (_, _, block_key) = Self::keys(router);
        let outcome = self.store.absorb_monotonic(&block_key, supplied).await?;

        #[cfg(feature = "tracing")]
        tracing::warn!(
            router,
            effective_retry_after = outcome.effective_retry_after,
            "application cooldown absorbed"
        );

        Err(Error::ApplicationCooldown(Box::new(ApplicationCooldown {
            retry_after: outcome.effective_retry_after,
            enforcement: Enforcement::External,
            router: router.to_owned(),
            endpoint: endpoint.to_owned(),
            reason: "absorbed",
            seconds: None,
            minutes: None,
            offending_context: Some(context),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationOverrides;
    use crate::store::InMemoryStore;

    fn dev_config() -> Config {
        Config {
            credential: "x".to_owned(),
            store_url: "redis://localhost".to_owned(),
            debug: false,
            production: false,
            application_overrides: ApplicationOverrides::default(),
        }
    }

    #[tokio::test]
    async fn dev_defaults_allow_then_deny_seconds_window() {
        let store = InMemoryStore::new();
        let arbiter = ApplicationArbiter::new(&store, &dev_config());
        for _ in 0..20 {
            arbiter.admit("na1", "https://na1/x").await.unwrap();
        }
        let err = arbiter.admit("na1", "https://na1/x").await.unwrap_err();
        assert!(matches!(err, Error::ApplicationCooldown(_)));
        assert_eq!(err.retry_after(), Some(1));
    }

    #[tokio::test]
    async fn absorb_always_fails_and_blocks_subsequent_admits() {
        let store = InMemoryStore::new();
        let arbiter = ApplicationArbiter::new(&store, &dev_config());
        let err = arbiter
            .absorb("na1", "https://na1/x", Some(5), OffendingContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ApplicationCooldown(_)));
        assert_eq!(err.retry_after(), Some(5));

        let denied = arbiter.admit("na1", "https://na1/x").await.unwrap_err();
        assert!(matches!(denied, Error::ApplicationCooldown(_)));
    }
}
