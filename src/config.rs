//! Startup configuration, loaded once from the environment.
//!
//! Every required variable fails loudly (an [`Error::InvalidConfig`]) if
//! missing or malformed, rather than silently defaulting.

use crate::error::{Error, Result};

const CREDENTIAL: &str = "QUOTA_GOVERNOR_CREDENTIAL";
const STORE_URL: &str = "QUOTA_GOVERNOR_STORE_URL";
const DEBUG: &str = "QUOTA_GOVERNOR_DEBUG";
const PRODUCTION: &str = "QUOTA_GOVERNOR_PRODUCTION";
const SECONDS_LIMIT: &str = "QUOTA_GOVERNOR_SECONDS_LIMIT";
const SECONDS_WINDOW: &str = "QUOTA_GOVERNOR_SECONDS_WINDOW";
const MINUTES_LIMIT: &str = "QUOTA_GOVERNOR_MINUTES_LIMIT";
const MINUTES_WINDOW: &str = "QUOTA_GOVERNOR_MINUTES_WINDOW";

/// Optional per-field overrides to the Application arbiter's defaults.
/// Only meaningful (and only permitted) when [`Config::production`] is true.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplicationOverrides {
    pub seconds_limit: Option<u32>,
    pub seconds_window: Option<u32>,
    pub minutes_limit: Option<u32>,
    pub minutes_window: Option<u32>,
}

impl ApplicationOverrides {
    fn is_empty(self) -> bool {
        self.seconds_limit.is_none()
            && self.seconds_window.is_none()
            && self.minutes_limit.is_none()
            && self.minutes_window.is_none()
    }
}

/// Process-wide configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub credential: String,
    pub store_url: String,
    pub debug: bool,
    pub production: bool,
    pub application_overrides: ApplicationOverrides,
}

impl Config {
    /// Loads configuration from the environment, failing loudly on any
    /// missing or malformed required value.
    pub fn from_env() -> Result<Self> {
        let credential = require_str(CREDENTIAL)?;
        let store_url = require_str(STORE_URL)?;
        let debug = require_bool_flag(DEBUG)?;
        let production = require_bool_flag(PRODUCTION)?;

        let application_overrides = ApplicationOverrides {
            seconds_limit: optional_positive_int(SECONDS_LIMIT)?,
            seconds_window: optional_positive_int(SECONDS_WINDOW)?,
            minutes_limit: optional_positive_int(MINUTES_LIMIT)?,
            minutes_window: optional_positive_int(MINUTES_WINDOW)?,
        };

        if !application_overrides.is_empty() && !production {
            return Err(Error::InvalidConfig(
                "custom Application-arbiter overrides require QUOTA_GOVERNOR_PRODUCTION=1"
                    .to_owned(),
            ));
        }

        Ok(Self {
            credential,
            store_url,
            debug,
            production,
            application_overrides,
        })
    }
}

fn require_str(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::InvalidConfig(format!("missing required variable {name}")))
}

fn require_bool_flag(name: &str) -> Result<bool> {
    let raw = require_str(name)?;
    match raw.as_str() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(Error::InvalidConfig(format!(
            "{name} must be \"0\" or \"1\", got {other:?}"
        ))),
    }
}

fn optional_positive_int(name: &str) -> Result<Option<u32>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let value: u32 = raw
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{name} must be a positive integer, got {raw:?}")))?;
    if value == 0 {
        return Err(Error::InvalidConfig(format!("{name} must be > 0, got 0")));
    }
    Ok(Some(value))
}
