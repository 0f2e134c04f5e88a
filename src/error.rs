//! Structured error taxonomy for the quota governor.
//!
//! Every fallible entry point returns [`Error`]. Cooldown variants always
//! carry enough context to format an operator-readable diagnostic; the
//! formatter lives on [`OffendingContext`] and is shared across variants so
//! the "pretty headers, wrapped body" rendering stays in one place.

use std::fmt;

use yansi::Paint as _;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Whether a cooldown was predicted locally or actually experienced upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enforcement {
    /// Our own counters denied the request before it was sent.
    Internal,
    /// The upstream returned a 429 and we are absorbing its cooldown.
    External,
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Internal => "internal",
            Self::External => "external",
        })
    }
}

/// The offending response headers and body captured at absorb time, or at
/// any non-success status the executor surfaces.
#[derive(Clone, Debug, Default)]
pub struct OffendingContext {
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl OffendingContext {
    #[must_use]
    pub fn new(headers: Vec<(String, String)>, body: Option<serde_json::Value>) -> Self {
        Self { headers, body }
    }

    /// Pretty-prints headers one per line and wraps the body to 100 columns,
    /// capped at 30 lines, matching the diagnostic format callers expect.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = vec!["  offending_context:".to_owned(), "    headers:".to_owned()];
        for (key, value) in &self.headers {
            lines.push(format!("      {key}: {value}"));
        }

        let body_str = match &self.body {
            Some(value) => serde_json::to_string_pretty(value)
                .unwrap_or_else(|_| value.to_string()),
            None => "<no body>".to_owned(),
        };
        lines.push("    body:".to_owned());
        let wrapped = wrap(&body_str, 100);
        let truncated = wrapped.len() > 30;
        for line in wrapped.into_iter().take(30) {
            lines.push(format!("      {line}"));
        }
        if truncated {
            lines.push("      ... (truncated)".to_owned());
        }
        lines.join("\n")
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Window accounting attached to Application/Method cooldowns. Observed
/// counts only exist when the denial was issued internally.
#[derive(Clone, Debug)]
pub struct WindowAccounting {
    pub limit: u32,
    pub window_secs: u32,
    pub observed_count: Option<u32>,
}

impl fmt::Display for WindowAccounting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .observed_count
            .map_or_else(|| "N/A - upstream headers are source of truth".to_owned(), |c| c.to_string());
        write!(
            f,
            "limit={}, window={}s, observed_count={count}",
            self.limit, self.window_secs
        )
    }
}

/// One offending dimension in a cooldown denial (`"seconds"`, `"minutes"`,
/// or `"blocking_key"`).
pub type DenialReason = &'static str;

#[derive(Clone, Debug)]
pub struct ApplicationCooldown {
    pub retry_after: u64,
    pub enforcement: Enforcement,
    pub router: String,
    pub endpoint: String,
    pub reason: DenialReason,
    pub seconds: Option<WindowAccounting>,
    pub minutes: Option<WindowAccounting>,
    pub offending_context: Option<OffendingContext>,
}

impl fmt::Display for ApplicationCooldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![
            format!("retry_after: {}s", self.retry_after),
            format!("enforcement: {}", self.enforcement),
            format!("router: {}", self.router),
            format!("endpoint: {}", self.endpoint),
            format!("reason: {}", self.reason),
        ];
        if let Some(seconds) = &self.seconds {
            lines.push(format!("seconds: {seconds}"));
        }
        if let Some(minutes) = &self.minutes {
            lines.push(format!("minutes: {minutes}"));
        }
        if let Some(ctx) = &self.offending_context {
            lines.push(ctx.render());
        }
        write!(f, "{}", format!("ApplicationCooldown:\n  {}", lines.join("\n  ")).red())
    }
}

#[derive(Clone, Debug)]
pub struct MethodCooldown {
    pub retry_after: u64,
    pub enforcement: Enforcement,
    pub router: String,
    pub method_id: String,
    pub endpoint: String,
    pub reason: DenialReason,
    pub seconds: Option<WindowAccounting>,
    pub minutes: Option<WindowAccounting>,
    pub offending_context: Option<OffendingContext>,
}

impl fmt::Display for MethodCooldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![
            format!("retry_after: {}s", self.retry_after),
            format!("enforcement: {}", self.enforcement),
            format!("router: {}", self.router),
            format!("method: {}", self.method_id),
            format!("endpoint: {}", self.endpoint),
            format!("reason: {}", self.reason),
        ];
        if let Some(seconds) = &self.seconds {
            lines.push(format!("seconds: {seconds}"));
        }
        if let Some(minutes) = &self.minutes {
            lines.push(format!("minutes: {minutes}"));
        }
        if let Some(ctx) = &self.offending_context {
            lines.push(ctx.render());
        }
        write!(f, "{}", format!("MethodCooldown:\n  {}", lines.join("\n  ")).red())
    }
}

#[derive(Clone, Debug)]
pub struct ServiceCooldown {
    pub retry_after: u64,
    pub enforcement: Enforcement,
    pub router: String,
    pub service: String,
    pub endpoint: String,
    pub offending_context: Option<OffendingContext>,
}

impl fmt::Display for ServiceCooldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![
            format!("retry_after: {}s", self.retry_after),
            format!("enforcement: {}", self.enforcement),
            format!("router: {}", self.router),
            format!("service: {}", self.service),
            format!("endpoint: {}", self.endpoint),
        ];
        if let Some(ctx) = &self.offending_context {
            lines.push(ctx.render());
        }
        write!(f, "{}", format!("ServiceCooldown:\n  {}", lines.join("\n  ")).red())
    }
}

#[derive(Clone, Debug)]
pub struct UnspecifiedCooldown {
    pub retry_after: u64,
    pub enforcement: Enforcement,
    pub router: String,
    pub service: String,
    pub method_id: String,
    pub endpoint: String,
    pub offending_context: Option<OffendingContext>,
}

impl fmt::Display for UnspecifiedCooldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![
            format!("retry_after: {}s", self.retry_after),
            format!("enforcement: {}", self.enforcement),
            format!("router: {}", self.router),
            format!("service: {}", self.service),
            format!("method: {}", self.method_id),
            format!("endpoint: {}", self.endpoint),
        ];
        if let Some(ctx) = &self.offending_context {
            lines.push(ctx.render());
        }
        write!(
            f,
            "{}",
            format!("UnspecifiedCooldown:\n  {}", lines.join("\n  ")).red()
        )
    }
}

#[derive(Clone, Debug)]
pub struct UpstreamApiError {
    pub status: u16,
    pub endpoint: String,
    pub router: String,
    pub service: String,
    pub method_id: String,
    pub body: Option<serde_json::Value>,
    pub offending_context: Option<OffendingContext>,
}

impl fmt::Display for UpstreamApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![
            format!("status: {}", self.status),
            format!("router: {}", self.router),
            format!("service: {}", self.service),
            format!("method: {}", self.method_id),
            format!("endpoint: {}", self.endpoint),
            format!("body: {:?}", self.body),
        ];
        if let Some(ctx) = &self.offending_context {
            lines.push(ctx.render());
        }
        write!(
            f,
            "{}",
            format!("UpstreamApiError:\n  {}", lines.join("\n  ")).yellow()
        )
    }
}

/// The transport-layer subtype of a network fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkFaultKind {
    Timeout,
    Connection,
    HttpError,
    Gateway,
    Cloudflare,
}

impl fmt::Display for NetworkFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::HttpError => "http_error",
            Self::Gateway => "gateway",
            Self::Cloudflare => "cloudflare",
        })
    }
}

#[derive(Debug)]
pub struct NetworkFault {
    pub kind: NetworkFaultKind,
    pub endpoint: String,
    pub source: Option<reqwest::Error>,
}

impl Clone for NetworkFault {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            endpoint: self.endpoint.clone(),
            // `reqwest::Error` isn't `Clone`; the diagnostic text is preserved via Display,
            // the underlying transport error is not needed beyond the first report.
            source: None,
        }
    }
}

impl fmt::Display for NetworkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            format!(
                "NetworkFault({}): endpoint={}{}",
                self.kind,
                self.endpoint,
                self.source
                    .as_ref()
                    .map(|e| format!(", source={e}"))
                    .unwrap_or_default()
            )
            .yellow()
        )
    }
}

/// The full error taxonomy: four cooldown kinds, upstream/network faults, and
/// the programming/configuration faults that should never be retried.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("{0}")]
    ApplicationCooldown(Box<ApplicationCooldown>),
    #[error("{0}")]
    MethodCooldown(Box<MethodCooldown>),
    #[error("{0}")]
    ServiceCooldown(Box<ServiceCooldown>),
    #[error("{0}")]
    UnspecifiedCooldown(Box<UnspecifiedCooldown>),
    #[error("{0}")]
    UpstreamApiError(Box<UpstreamApiError>),
    #[error("{0}")]
    NetworkFault(Box<NetworkFault>),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid quota definition: {0}")]
    InvalidQuota(String),
    #[error("unknown service for endpoint: {0}")]
    UnknownService(String),
    #[error("unknown method for endpoint: {0}")]
    UnknownMethod(String),
    #[error("unknown router for endpoint: {0}")]
    UnknownRouter(String),
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    /// The `retry_after` seconds a retry coordinator should wait, for the
    /// variants that carry one.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::ApplicationCooldown(e) => Some(e.retry_after),
            Self::MethodCooldown(e) => Some(e.retry_after),
            Self::ServiceCooldown(e) => Some(e.retry_after),
            Self::UnspecifiedCooldown(e) => Some(e.retry_after),
            _ => None,
        }
    }

    /// True for any of the four cooldown variants.
    #[must_use]
    pub fn is_cooldown(&self) -> bool {
        matches!(
            self,
            Self::ApplicationCooldown(_)
                | Self::MethodCooldown(_)
                | Self::ServiceCooldown(_)
                | Self::UnspecifiedCooldown(_)
        )
    }

    #[must_use]
    pub fn as_network_fault(&self) -> Option<&NetworkFault> {
        match self {
            Self::NetworkFault(fault) => Some(fault),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offending_context_wraps_body_and_caps_lines() {
        let body = serde_json::json!({"message": "x".repeat(4000)});
        let ctx = OffendingContext::new(vec![("content-type".to_owned(), "application/json".to_owned())], Some(body));
        let rendered = ctx.render();
        assert!(rendered.contains("content-type: application/json"));
        assert!(rendered.lines().count() <= 34); // header lines + up to 30 body lines + labels
    }

    #[test]
    fn retry_after_present_only_for_cooldowns() {
        let err = Error::UnknownRouter("na9".to_owned());
        assert_eq!(err.retry_after(), None);
        assert!(!err.is_cooldown());

        let cooldown = Error::ServiceCooldown(Box::new(ServiceCooldown {
            retry_after: 68,
            enforcement: Enforcement::External,
            router: "na1".to_owned(),
            service: "MATCH".to_owned(),
            endpoint: "https://na1.api.example.com/lol/match/v5/matches/NA1_1".to_owned(),
            offending_context: None,
        }));
        assert_eq!(cooldown.retry_after(), Some(68));
        assert!(cooldown.is_cooldown());
    }
}
