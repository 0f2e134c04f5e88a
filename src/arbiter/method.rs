//! Method arbiter: per-router, per-method seconds/minutes windows, either of
//! which may be absent.

use crate::classify::Fingerprint;
use crate::error::{Enforcement, Error, MethodCooldown, OffendingContext, Result, WindowAccounting};
use crate::store::{Store, TwoWindowKeys, WindowSpec};

use super::normalize_retry_after;

pub struct MethodArbiter<'s> {
    store: &'s dyn Store,
}

impl<'s> MethodArbiter<'s> {
    #[must_use]
    pub fn new(store: &'s dyn Store) -> Self {
        Self { store }
    }

    fn keys(router: &str, method_id: &str) -> (String, String, String) {
        (
            format!("meth:{router}:{method_id}:seconds"),
            format!("meth:{router}:{method_id}:minutes"),
            format!("meth-block:{router}:{method_id}"),
        )
    }

    /// Pre-request check-and-increment. Fails with [`Error::InvalidQuota`] if
    /// the fingerprint carries neither window, calling with nothing to
    /// police is a programming error, not a quota denial.
    pub async fn admit(&self, fingerprint: &Fingerprint) -> Result<()> {
        let seconds = fingerprint.seconds_cfg.map(|w| WindowSpec {
            limit: w.limit,
            window_secs: w.window_secs,
        });
        let minutes = fingerprint.minutes_cfg.map(|w| WindowSpec {
            limit: w.limit,
            window_secs: w.window_secs,
        });
        if seconds.is_none() && minutes.is_none() {
            return Err(Error::InvalidQuota(format!(
                "method {} on router {} has neither a seconds nor a minutes window configured",
                fingerprint.method_id, fingerprint.router
            )));
        }

        let (seconds_key, minutes_key, block_key) = Self::keys(&fingerprint.router, fingerprint.method_id);
        let decision = self
            .store
            .two_window_admit(
                TwoWindowKeys {
                    seconds_key: &seconds_key,
                    minutes_key: &minutes_key,
                    block_key: &block_key,
                },
                seconds,
                minutes,
            )
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            router = %fingerprint.router,
            method = fingerprint.method_id,
            reason = decision.reason,
            allowed = decision.allowed,
            "method admit"
        );

        if decision.allowed {
            return Ok(());
        }

        Err(Error::MethodCooldown(Box::new(MethodCooldown {
            retry_after: decision.retry_after.max(1),
            enforcement: Enforcement::Internal,
            router: fingerprint.router.clone(),
            method_id: fingerprint.method_id.to_owned(),
            endpoint: fingerprint.url.clone(),
            reason: decision.reason,
            seconds: seconds.map(|w| WindowAccounting {
                limit: w.limit,
                window_secs: w.window_secs,
                observed_count: decision.seconds_count,
            }),
            minutes: minutes.map(|w| WindowAccounting {
                limit: w.limit,
                window_secs: w.window_secs,
                observed_count: decision.minutes_count,
            }),
            offending_context: None,
        })))
    }

    /// Post-response absorption of an upstream cooldown. Always fails.
    pub async fn absorb(
        &self,
        fingerprint: &Fingerprint,
        retry_after_s: Option<u64>,
        context: OffendingContext,
    ) -> Result<()> {
        let supplied = normalize_retry_after(retry_after_s);
        let (_, _, block_key) = Self::keys(&fingerprint.router, fingerprint.method_id);
        let outcome = self.store.absorb_monotonic(&block_key, supplied).await?;

        #[cfg(feature = "tracing")]
        tracing::warn!(
            router = %fingerprint.router,
            method = fingerprint.method_id,
            effective_retry_after = outcome.effective_retry_after,
            "method cooldown absorbed"
        );

        Err(Error::MethodCooldown(Box::new(MethodCooldown {
            retry_after: outcome.effective_retry_after,
            enforcement: Enforcement::External,
            router: fingerprint.router.clone(),
            method_id: fingerprint.method_id.to_owned(),
            endpoint: fingerprint.url.clone(),
            reason: "absorbed",
            seconds: None,
            minutes: None,
            offending_context: Some(context),
        })))
    }
}
