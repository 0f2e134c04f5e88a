//! Request executor: classify → admit sweep → single GET → status-based
//! dispatch.

use reqwest::Client;

use crate::arbiter::{ApplicationArbiter, MethodArbiter, ServiceArbiter, UnspecifiedArbiter};
use crate::classify::{self, Fingerprint};
use crate::config::Config;
use crate::error::{Error, NetworkFault, NetworkFaultKind, OffendingContext, Result, UpstreamApiError};
use crate::store::Store;

/// The credential header the upstream expects on every request.
const CREDENTIAL_HEADER: &str = "X-Riot-Token";
/// The header the upstream uses to classify a 429's offending dimension.
const CLASSIFICATION_HEADER: &str = "x-rate-limit-type";
/// Default assumed by the upstream's own docs when `retry-after` is absent.
const DEFAULT_RETRY_AFTER: u64 = 68;

/// The service whose 403 responses mean "game mode unsupported", not an
/// error, see [`handle_status`].
const NO_CONTENT_403_SERVICE: &str = "MATCH-V5";

/// The decoded payload of a successful call, or the sentinel for a response
/// the upstream defines as content-free.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    NoContent,
}

/// Executes a single governed request: classify, admit, GET, dispatch.
///
/// # Errors
///
/// Returns any arbiter denial, the classifier's failures, a transport-level
/// [`Error::NetworkFault`], or [`Error::UpstreamApiError`] for anything else
/// the upstream returns.
pub async fn execute(
    url: &str,
    http_client: &Client,
    store: &dyn Store,
    config: &Config,
) -> Result<ResponseBody> {
    let fingerprint = classify::classify(url)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        router = %fingerprint.router,
        service = fingerprint.service,
        method = fingerprint.method_id,
        "classified request"
    );

    let application = ApplicationArbiter::new(store, config);
    let method = MethodArbiter::new(store);
    let service = ServiceArbiter::new(store);
    let unspecified = UnspecifiedArbiter::new(store);

    application.admit(&fingerprint.router, url).await?;
    method.admit(&fingerprint).await?;
    service.admit(&fingerprint.router, fingerprint.service, url).await?;
    unspecified
        .admit(&fingerprint.router, fingerprint.service, fingerprint.method_id, url)
        .await?;

    let response = http_client
        .get(url)
        .header(CREDENTIAL_HEADER, &config.credential)
        .send()
        .await
        .map_err(|e| wrap_transport_error(e, url))?;

    handle_status(response, &fingerprint, url, &application, &method, &service, &unspecified).await
}

fn wrap_transport_error(err: reqwest::Error, endpoint: &str) -> Error {
    let kind = if err.is_timeout() {
        NetworkFaultKind::Timeout
    } else if err.is_connect() {
        NetworkFaultKind::Connection
    } else {
        NetworkFaultKind::HttpError
    };

    #[cfg(feature = "tracing")]
    tracing::warn!(endpoint, %kind, "transport error");

    Error::NetworkFault(Box::new(NetworkFault {
        kind,
        endpoint: endpoint.to_owned(),
        source: Some(err),
    }))
}

#[allow(clippy::too_many_arguments)]
async fn handle_status(
    response: reqwest::Response,
    fingerprint: &Fingerprint,
    endpoint: &str,
    application: &ApplicationArbiter<'_>,
    method: &MethodArbiter<'_>,
    service: &ServiceArbiter<'_>,
    unspecified: &UnspecifiedArbiter<'_>,
) -> Result<ResponseBody> {
    let status = response.status();

    match status.as_u16() {
        200 => {
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("<binary>").to_owned()))
                .collect();
            let bytes = response.bytes().await.map_err(|e| wrap_transport_error(e, endpoint))?;
            serde_json::from_slice::<serde_json::Value>(&bytes)
                .map(ResponseBody::Json)
                .map_err(|_| {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(endpoint, "200 response body is not valid json");
                    Error::UpstreamApiError(Box::new(UpstreamApiError {
                        status: 200,
                        endpoint: endpoint.to_owned(),
                        router: fingerprint.router.clone(),
                        service: fingerprint.service.to_owned(),
                        method_id: fingerprint.method_id.to_owned(),
                        body: None,
                        offending_context: Some(OffendingContext::new(headers, None)),
                    }))
                })
        }
        204 => Ok(ResponseBody::NoContent),
        403 if fingerprint.service == NO_CONTENT_403_SERVICE => {
            #[cfg(feature = "tracing")]
            tracing::debug!(endpoint, service = fingerprint.service, "403 treated as no-content");
            Ok(ResponseBody::NoContent)
        }
        429 => {
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("<binary>").to_owned()))
                .collect();
            let retry_after = headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
                .and_then(|(_, value)| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER)
                + 1;
            let classification = headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(CLASSIFICATION_HEADER))
                .map(|(_, value)| value.clone());
            let body = response.json::<serde_json::Value>().await.ok();
            let context = OffendingContext::new(headers, body);

            match classification.as_deref() {
                Some("application") => application.absorb(&fingerprint.router, endpoint, Some(retry_after), context).await,
                Some("method") => method.absorb(fingerprint, Some(retry_after), context).await,
                Some("service") => service.absorb(&fingerprint.router, fingerprint.service, endpoint, context).await,
                _ => {
                    unspecified
                        .absorb(
                            &fingerprint.router,
                            fingerprint.service,
                            fingerprint.method_id,
                            endpoint,
                            Some(retry_after),
                            context,
                        )
                        .await
                }
            }
        }
        502 | 503 | 504 => Err(gateway_fault(status.as_u16(), endpoint)),
        520..=527 => Err(cloudflare_fault(status.as_u16(), endpoint)),
        other => {
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("<binary>").to_owned()))
                .collect();
            let body = response.json::<serde_json::Value>().await.ok();
            let context = OffendingContext::new(headers, body.clone());

            #[cfg(feature = "tracing")]
            tracing::warn!(endpoint, status = other, "upstream api error");

            Err(Error::UpstreamApiError(Box::new(UpstreamApiError {
                status: other,
                endpoint: endpoint.to_owned(),
                router: fingerprint.router.clone(),
                service: fingerprint.service.to_owned(),
                method_id: fingerprint.method_id.to_owned(),
                body,
                offending_context: Some(context),
            })))
        }
    }
}

fn gateway_fault(status: u16, endpoint: &str) -> Error {
    #[cfg(feature = "tracing")]
    tracing::warn!(endpoint, status, "gateway status treated as network fault");
    Error::NetworkFault(Box::new(NetworkFault {
        kind: NetworkFaultKind::Gateway,
        endpoint: endpoint.to_owned(),
        source: None,
    }))
}

fn cloudflare_fault(status: u16, endpoint: &str) -> Error {
    #[cfg(feature = "tracing")]
    tracing::warn!(endpoint, status, "cloudflare status treated as network fault");
    Error::NetworkFault(Box::new(NetworkFault {
        kind: NetworkFaultKind::Cloudflare,
        endpoint: endpoint.to_owned(),
        source: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationOverrides;
    use crate::store::InMemoryStore;
    use httpmock::prelude::*;

    fn production_config() -> Config {
        Config {
            credential: "test-credential".to_owned(),
            store_url: "redis://localhost".to_owned(),
            debug: false,
            production: true,
            application_overrides: ApplicationOverrides::default(),
        }
    }

    /// Builds a client that resolves `{router}.test` to the mock server's
    /// real socket address, and the matching URL, so `classify()` sees a
    /// router-shaped host while the request actually reaches `server`,
    /// without depending on any real DNS.
    fn routed(server: &MockServer, router: &str, path: &str) -> (Client, String) {
        let host = format!("{router}.test");
        let client = Client::builder()
            .resolve(&host, server.address().to_owned())
            .build()
            .expect("client with resolver override");
        let url = format!("http://{host}:{}{path}", server.port());
        (client, url)
    }

    #[tokio::test]
    async fn fresh_window_allows_through_and_decodes_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/lol/match/v5/matches/KR_1");
            then.status(200).json_body(serde_json::json!({"ok": 1}));
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "kr", "/lol/match/v5/matches/KR_1");
        let result = execute(&url, &client, &store, &production_config()).await.unwrap();
        assert_eq!(result, ResponseBody::Json(serde_json::json!({"ok": 1})));
        mock.assert();
    }

    #[tokio::test]
    async fn no_content_on_204() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lol/league-exp/v4/entries/RANKED_SOLO_5x5/I/IV");
            then.status(204);
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "na1", "/lol/league-exp/v4/entries/RANKED_SOLO_5x5/I/IV");
        let result = execute(&url, &client, &store, &production_config()).await.unwrap();
        assert_eq!(result, ResponseBody::NoContent);
    }

    #[tokio::test]
    async fn match_service_403_is_no_content() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lol/match/v5/matches/KR_1");
            then.status(403);
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "kr", "/lol/match/v5/matches/KR_1");
        let result = execute(&url, &client, &store, &production_config()).await.unwrap();
        assert_eq!(result, ResponseBody::NoContent);
    }

    #[tokio::test]
    async fn gateway_status_is_network_fault() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lol/match/v5/matches/KR_1");
            then.status(502);
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "kr", "/lol/match/v5/matches/KR_1");
        let err = execute(&url, &client, &store, &production_config()).await.unwrap_err();
        assert!(matches!(err, Error::NetworkFault(_)));
        assert_eq!(err.as_network_fault().unwrap().kind, NetworkFaultKind::Gateway);
    }

    #[tokio::test]
    async fn method_429_absorbs_into_method_cooldown() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lol/match/v5/matches/KR_1");
            then.status(429)
                .header("retry-after", "30")
                .header("x-rate-limit-type", "method")
                .json_body(serde_json::json!({"status": {"message": "Rate limit exceeded"}}));
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "kr", "/lol/match/v5/matches/KR_1");
        let err = execute(&url, &client, &store, &production_config()).await.unwrap_err();
        assert!(matches!(err, Error::MethodCooldown(_)));
        assert_eq!(err.retry_after(), Some(31));
    }

    #[tokio::test]
    async fn unknown_status_is_upstream_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lol/match/v5/matches/KR_1");
            then.status(418).json_body(serde_json::json!({"teapot": true}));
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "kr", "/lol/match/v5/matches/KR_1");
        let err = execute(&url, &client, &store, &production_config()).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamApiError(_)));
    }

    #[tokio::test]
    async fn preseeded_application_window_denies_without_any_http_call() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/lol/match/v5/matches/KR_1");
            then.status(200).json_body(serde_json::json!({"ok": 1}));
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "kr", "/lol/match/v5/matches/KR_1");
        let config = production_config();

        let seconds_limit = ApplicationArbiter::new(&store, &config);
        for _ in 0..500 {
            seconds_limit.admit("kr", &url).await.unwrap();
        }

        let err = execute(&url, &client, &store, &config).await.unwrap_err();
        assert!(matches!(err, Error::ApplicationCooldown(_)));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn service_cooldown_is_fixed_length_regardless_of_supplied_retry_after() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lol/match/v5/matches/KR_1");
            then.status(429)
                .header("retry-after", "5")
                .header("x-rate-limit-type", "service")
                .json_body(serde_json::json!({"status": {"message": "Rate limit exceeded"}}));
        });

        let store = InMemoryStore::new();
        let (client, url) = routed(&server, "kr", "/lol/match/v5/matches/KR_1");
        let config = production_config();

        let err = execute(&url, &client, &store, &config).await.unwrap_err();
        assert!(matches!(err, Error::ServiceCooldown(_)));
        // Service cooldowns ignore the upstream's supplied retry-after and use
        // the fixed 68s default regardless.
        assert_eq!(err.retry_after(), Some(68));

        let second = execute(&url, &client, &store, &config).await.unwrap_err();
        assert!(matches!(second, Error::ServiceCooldown(_)));
        assert_eq!(second.retry_after(), Some(68));
    }
}
