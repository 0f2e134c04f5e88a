//! The shared-store abstraction arbiters admit and absorb through.
//!
//! Every admission/absorption the arbiters need is exposed here as one
//! already-atomic operation rather than raw GET/SET/INCR primitives, because
//! cross-process correctness requires the *entire* decision, read, compare,
//! conditionally write, to happen as a single round trip to the store; no
//! caller may rely on separate read-then-write sequences. [`RedisStore`]
//! implements each operation as a registered Lua script invoked by its cached
//! SHA; [`InMemoryStore`] implements the same contract over a mutex for
//! tests, where in-process atomicity is sufficient.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands as _, Script};

use crate::error::{Error, Result};

/// One side of a two-window admission check.
#[derive(Clone, Copy, Debug)]
pub struct WindowSpec {
    pub limit: u32,
    pub window_secs: u32,
}

/// The three keys a two-window admission script touches.
#[derive(Clone, Copy, Debug)]
pub struct TwoWindowKeys<'a> {
    pub seconds_key: &'a str,
    pub minutes_key: &'a str,
    pub block_key: &'a str,
}

/// Outcome of a two-window admission (Application or Method arbiter).
#[derive(Clone, Debug)]
pub struct TwoWindowDecision {
    pub allowed: bool,
    /// Seconds to wait before retrying, meaningful only when `!allowed`.
    pub retry_after: u64,
    /// `"blocking_key"`, `"seconds"`, `"minutes"`, or `"allowed"`.
    pub reason: &'static str,
    pub seconds_count: Option<u32>,
    pub minutes_count: Option<u32>,
}

/// Outcome of a cooldown-only admission (Service or Unspecified arbiter).
#[derive(Clone, Copy, Debug)]
pub struct CooldownDecision {
    pub allowed: bool,
    /// Remaining TTL on the block key, floored at 1s, meaningful only when `!allowed`.
    pub retry_after: u64,
}

/// Outcome of a monotonic-extension absorb (Application or Method arbiter).
#[derive(Clone, Copy, Debug)]
pub struct MonotonicAbsorb {
    pub existed: bool,
    pub cur_ttl: u64,
    /// `max(new_retry_after, cur_ttl)`, the caller always waits for the
    /// longest pending cooldown.
    pub effective_retry_after: u64,
}

/// The atomic operations every arbiter is built from. Implementations MUST
/// make each method a single atomic unit with respect to the keys it
/// touches; no caller ever issues a read and a write as two calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Two-window admission script. `seconds`/`minutes` being `None` means
    /// that dimension is not policed (Method arbiter only); both `None` is a
    /// caller error, validated before this is called.
    async fn two_window_admit(
        &self,
        keys: TwoWindowKeys<'_>,
        seconds: Option<WindowSpec>,
        minutes: Option<WindowSpec>,
    ) -> Result<TwoWindowDecision>;

    /// Cooldown-only admission check: denies iff `block_key` exists.
    async fn cooldown_admit(&self, block_key: &str) -> Result<CooldownDecision>;

    /// Monotonic-extension absorb, used by Application and Method. Never
    /// shortens an existing TTL.
    async fn absorb_monotonic(&self, block_key: &str, new_retry_after: u64) -> Result<MonotonicAbsorb>;

    /// Create-if-absent absorb used by Service (fixed 68s) and Unspecified
    /// (supplied retry-after). Leaves an existing marker's TTL untouched.
    async fn absorb_create_if_absent(&self, block_key: &str, ttl_secs: u64) -> Result<()>;
}

const TWO_WINDOW_ADMIT_SCRIPT: &str = r"
local block_key = KEYS[1]
local seconds_key = KEYS[2]
local minutes_key = KEYS[3]
local has_seconds = tonumber(ARGV[1])
local seconds_limit = tonumber(ARGV[2])
local seconds_window = tonumber(ARGV[3])
local has_minutes = tonumber(ARGV[4])
local minutes_limit = tonumber(ARGV[5])
local minutes_window = tonumber(ARGV[6])

if redis.call('EXISTS', block_key) == 1 then
    return {0, redis.call('TTL', block_key), 'blocking_key', -1, -1}
end

local s = 0
if has_seconds == 1 then
    s = tonumber(redis.call('GET', seconds_key)) or 0
    if s >= seconds_limit then
        return {0, redis.call('TTL', seconds_key), 'seconds', s, -1}
    end
end

local m = 0
if has_minutes == 1 then
    m = tonumber(redis.call('GET', minutes_key)) or 0
    if m >= minutes_limit then
        return {0, redis.call('TTL', minutes_key), 'minutes', -1, m}
    end
end

if has_seconds == 1 then
    local existed = redis.call('EXISTS', seconds_key) == 1
    s = redis.call('INCR', seconds_key)
    if not existed then
        redis.call('EXPIRE', seconds_key, seconds_window)
    end
end
if has_minutes == 1 then
    local existed = redis.call('EXISTS', minutes_key) == 1
    m = redis.call('INCR', minutes_key)
    if not existed then
        redis.call('EXPIRE', minutes_key, minutes_window)
    end
end

return {1, 0, 'allowed', s, m}
";

const MONOTONIC_ABSORB_SCRIPT: &str = r"
local block_key = KEYS[1]
local new_retry_after = tonumber(ARGV[1])

local existed = redis.call('EXISTS', block_key) == 1
local cur_ttl = 0
if existed then
    cur_ttl = redis.call('TTL', block_key)
end

if (not existed) or (new_retry_after > cur_ttl) then
    redis.call('SET', block_key, '1', 'EX', new_retry_after)
end

return {existed and 1 or 0, cur_ttl}
";

const CREATE_IF_ABSENT_SCRIPT: &str = r"
local block_key = KEYS[1]
local ttl_secs = tonumber(ARGV[1])
if redis.call('EXISTS', block_key) == 0 then
    redis.call('SET', block_key, '1', 'EX', ttl_secs)
end
return 1
";

static TWO_WINDOW_ADMIT: Lazy<Script> = Lazy::new(|| Script::new(TWO_WINDOW_ADMIT_SCRIPT));
static MONOTONIC_ABSORB: Lazy<Script> = Lazy::new(|| Script::new(MONOTONIC_ABSORB_SCRIPT));
static CREATE_IF_ABSENT: Lazy<Script> = Lazy::new(|| Script::new(CREATE_IF_ABSENT_SCRIPT));

/// Redis-backed implementation. Scripts are loaded once (implicitly, by
/// `redis`'s `EVALSHA`-with-`EVAL`-fallback) and thereafter invoked by SHA,
/// the `Script` handles above are built once per process via `Lazy` and
/// shared across every call, mirroring `initialize_scripts` /
/// `check_and_increment_sha` in the system this was ported from.
pub struct RedisStore {
    conn: Mutex<ConnectionManager>,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://host:6379`) and prepares a connection
    /// manager that reconnects transparently on failure.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::StoreUnavailable(format!("invalid store url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("connection failed: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    async fn connection(&self) -> ConnectionManager {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn two_window_admit(
        &self,
        keys: TwoWindowKeys<'_>,
        seconds: Option<WindowSpec>,
        minutes: Option<WindowSpec>,
    ) -> Result<TwoWindowDecision> {
        let mut conn = self.connection().await;
        let (has_seconds, seconds_limit, seconds_window) = seconds
            .map(|w| (1, w.limit, w.window_secs))
            .unwrap_or((0, 0, 1));
        let (has_minutes, minutes_limit, minutes_window) = minutes
            .map(|w| (1, w.limit, w.window_secs))
            .unwrap_or((0, 0, 1));

        let (allowed, retry_after, reason, seconds_count, minutes_count): (
            i64,
            i64,
            String,
            i64,
            i64,
        ) = TWO_WINDOW_ADMIT
            .key(keys.block_key)
            .key(keys.seconds_key)
            .key(keys.minutes_key)
            .arg(has_seconds)
            .arg(seconds_limit)
            .arg(seconds_window)
            .arg(has_minutes)
            .arg(minutes_limit)
            .arg(minutes_window)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("two_window_admit: {e}")))?;

        Ok(TwoWindowDecision {
            allowed: allowed == 1,
            retry_after: retry_after.max(0) as u64,
            reason: intern_reason(&reason),
            seconds_count: (seconds_count >= 0).then_some(seconds_count as u32),
            minutes_count: (minutes_count >= 0).then_some(minutes_count as u32),
        })
    }

    async fn cooldown_admit(&self, block_key: &str) -> Result<CooldownDecision> {
        let mut conn = self.connection().await;
        let ttl: i64 = conn
            .ttl(block_key)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("cooldown_admit: {e}")))?;
        if ttl < 0 {
            Ok(CooldownDecision {
                allowed: true,
                retry_after: 0,
            })
        } else {
            Ok(CooldownDecision {
                allowed: false,
                retry_after: ttl.max(1) as u64,
            })
        }
    }

    async fn absorb_monotonic(&self, block_key: &str, new_retry_after: u64) -> Result<MonotonicAbsorb> {
        let mut conn = self.connection().await;
        let (existed, cur_ttl): (i64, i64) = MONOTONIC_ABSORB
            .key(block_key)
            .arg(new_retry_after)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("absorb_monotonic: {e}")))?;
        let cur_ttl = cur_ttl.max(0) as u64;
        Ok(MonotonicAbsorb {
            existed: existed == 1,
            cur_ttl,
            effective_retry_after: new_retry_after.max(cur_ttl),
        })
    }

    async fn absorb_create_if_absent(&self, block_key: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection().await;
        let _: i64 = CREATE_IF_ABSENT
            .key(block_key)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("absorb_create_if_absent: {e}")))?;
        Ok(())
    }
}

/// `reason` only ever takes one of a handful of literal values; interning
/// them avoids allocating a `String` in the hot admission path's return type.
fn intern_reason(reason: &str) -> &'static str {
    match reason {
        "blocking_key" => "blocking_key",
        "seconds" => "seconds",
        "minutes" => "minutes",
        _ => "allowed",
    }
}

struct MemoryEntry {
    value: i64,
    expires_at: Option<Instant>,
}

/// In-process fake implementing the same atomic contract over a mutex.
/// Not a Redis protocol mock, a real (if non-distributed) implementation of
/// [`Store`], used by arbiter/executor tests and the property tests.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_live(map: &mut HashMap<String, MemoryEntry>, key: &str, now: Instant) -> Option<i64> {
        match map.get(key) {
            Some(entry) if entry.expires_at.is_none_or(|exp| exp > now) => Some(entry.value),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    fn ttl_secs(map: &mut HashMap<String, MemoryEntry>, key: &str, now: Instant) -> Option<u64> {
        match map.get(key) {
            Some(MemoryEntry { expires_at: Some(exp), .. }) if *exp > now => {
                let remaining = *exp - now;
                Some(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
            }
            Some(MemoryEntry { expires_at: None, .. }) => Some(u64::MAX),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn two_window_admit(
        &self,
        keys: TwoWindowKeys<'_>,
        seconds: Option<WindowSpec>,
        minutes: Option<WindowSpec>,
    ) -> Result<TwoWindowDecision> {
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if Self::get_live(&mut map, keys.block_key, now).is_some() {
            let retry_after = Self::ttl_secs(&mut map, keys.block_key, now).unwrap_or(1);
            return Ok(TwoWindowDecision {
                allowed: false,
                retry_after,
                reason: "blocking_key",
                seconds_count: None,
                minutes_count: None,
            });
        }

        if let Some(spec) = seconds {
            let count = Self::get_live(&mut map, keys.seconds_key, now).unwrap_or(0);
            if count >= i64::from(spec.limit) {
                let retry_after = Self::ttl_secs(&mut map, keys.seconds_key, now).unwrap_or(0);
                return Ok(TwoWindowDecision {
                    allowed: false,
                    retry_after,
                    reason: "seconds",
                    seconds_count: Some(count as u32),
                    minutes_count: None,
                });
            }
        }
        if let Some(spec) = minutes {
            let count = Self::get_live(&mut map, keys.minutes_key, now).unwrap_or(0);
            if count >= i64::from(spec.limit) {
                let retry_after = Self::ttl_secs(&mut map, keys.minutes_key, now).unwrap_or(0);
                return Ok(TwoWindowDecision {
                    allowed: false,
                    retry_after,
                    reason: "minutes",
                    seconds_count: None,
                    minutes_count: Some(count as u32),
                });
            }
        }

        let seconds_count = seconds.map(|spec| {
            let existed = Self::get_live(&mut map, keys.seconds_key, now).is_some();
            let entry = map.entry(keys.seconds_key.to_owned()).or_insert(MemoryEntry {
                value: 0,
                expires_at: None,
            });
            entry.value += 1;
            if !existed {
                entry.expires_at = Some(now + Duration::from_secs(u64::from(spec.window_secs)));
            }
            entry.value as u32
        });
        let minutes_count = minutes.map(|spec| {
            let existed = Self::get_live(&mut map, keys.minutes_key, now).is_some();
            let entry = map.entry(keys.minutes_key.to_owned()).or_insert(MemoryEntry {
                value: 0,
                expires_at: None,
            });
            entry.value += 1;
            if !existed {
                entry.expires_at = Some(now + Duration::from_secs(u64::from(spec.window_secs)));
            }
            entry.value as u32
        });

        Ok(TwoWindowDecision {
            allowed: true,
            retry_after: 0,
            reason: "allowed",
            seconds_count,
            minutes_count,
        })
    }

    async fn cooldown_admit(&self, block_key: &str) -> Result<CooldownDecision> {
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if Self::get_live(&mut map, block_key, now).is_some() {
            let retry_after = Self::ttl_secs(&mut map, block_key, now).unwrap_or(1);
            Ok(CooldownDecision {
                allowed: false,
                retry_after,
            })
        } else {
            Ok(CooldownDecision {
                allowed: true,
                retry_after: 0,
            })
        }
    }

    async fn absorb_monotonic(&self, block_key: &str, new_retry_after: u64) -> Result<MonotonicAbsorb> {
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let existed = Self::get_live(&mut map, block_key, now).is_some();
        let cur_ttl = if existed {
            Self::ttl_secs(&mut map, block_key, now).unwrap_or(0)
        } else {
            0
        };

        if !existed || new_retry_after > cur_ttl {
            map.insert(
                block_key.to_owned(),
                MemoryEntry {
                    value: 1,
                    expires_at: Some(now + Duration::from_secs(new_retry_after)),
                },
            );
        }

        Ok(MonotonicAbsorb {
            existed,
            cur_ttl,
            effective_retry_after: new_retry_after.max(cur_ttl),
        })
    }

    async fn absorb_create_if_absent(&self, block_key: &str, ttl_secs: u64) -> Result<()> {
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if Self::get_live(&mut map, block_key, now).is_none() {
            map.insert(
                block_key.to_owned(),
                MemoryEntry {
                    value: 1,
                    expires_at: Some(now + Duration::from_secs(ttl_secs)),
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<'a>(seconds: &'a str, minutes: &'a str, block: &'a str) -> TwoWindowKeys<'a> {
        TwoWindowKeys {
            seconds_key: seconds,
            minutes_key: minutes,
            block_key: block,
        }
    }

    #[tokio::test]
    async fn two_window_admit_allows_then_denies_at_limit() {
        let store = InMemoryStore::new();
        let spec = WindowSpec {
            limit: 2,
            window_secs: 60,
        };
        let k = keys("s", "m", "b");

        let first = store.two_window_admit(k, Some(spec), None).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.seconds_count, Some(1));

        let second = store.two_window_admit(k, Some(spec), None).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.seconds_count, Some(2));

        let third = store.two_window_admit(k, Some(spec), None).await.unwrap();
        assert!(!third.allowed);
        assert_eq!(third.reason, "seconds");
    }

    #[tokio::test]
    async fn blocking_key_short_circuits_before_counters() {
        let store = InMemoryStore::new();
        store.absorb_create_if_absent("b", 5).await.unwrap();
        let spec = WindowSpec {
            limit: 100,
            window_secs: 60,
        };
        let decision = store
            .two_window_admit(keys("s", "m", "b"), Some(spec), None)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "blocking_key");
    }

    #[tokio::test]
    async fn absorb_monotonic_never_shortens_ttl() {
        let store = InMemoryStore::new();
        let first = store.absorb_monotonic("b", 10).await.unwrap();
        assert!(!first.existed);
        assert_eq!(first.effective_retry_after, 10);

        let second = store.absorb_monotonic("b", 3).await.unwrap();
        assert!(second.existed);
        assert_eq!(second.effective_retry_after, 10);

        let third = store.absorb_monotonic("b", 30).await.unwrap();
        assert!(third.existed);
        assert_eq!(third.effective_retry_after, 30);
    }

    #[tokio::test]
    async fn create_if_absent_does_not_overwrite_existing_marker() {
        let store = InMemoryStore::new();
        store.absorb_create_if_absent("svc", 68).await.unwrap();
        let decision = store.cooldown_admit("svc").await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.retry_after <= 68);

        store.absorb_create_if_absent("svc", 5).await.unwrap();
        let still_blocked = store.cooldown_admit("svc").await.unwrap();
        assert!(!still_blocked.allowed);
    }
}
