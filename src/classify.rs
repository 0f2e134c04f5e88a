//! URL → [`Fingerprint`] classification.
//!
//! Classification is pure and side-effect-free: it never touches the shared
//! store, and the same URL always yields the same fingerprint (modulo the
//! catalog itself changing, which only happens at compile time).

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::catalog::{self, WindowLimit, CATALOG};
use crate::error::{Error, Result};

/// The resolved identity of a single request: which router, service, and
/// method it targets, and the window limits that apply to this router.
#[derive(Clone, Debug)]
pub struct Fingerprint {
    pub url: String,
    pub router: String,
    pub service: &'static str,
    pub method_id: &'static str,
    pub seconds_cfg: Option<WindowLimit>,
    pub minutes_cfg: Option<WindowLimit>,
}

/// One compiled method pattern, retained alongside its owning service/method
/// identifiers so the scan in [`classify`] doesn't need to re-resolve them.
struct CompiledMethod {
    service: &'static str,
    method: &'static catalog::MethodDescriptor,
    regex: Regex,
}

static COMPILED: Lazy<Vec<CompiledMethod>> = Lazy::new(|| {
    CATALOG
        .iter()
        .flat_map(|service| {
            service.methods.iter().map(move |method| CompiledMethod {
                service: service.name,
                method,
                regex: Regex::new(method.pattern)
                    .unwrap_or_else(|e| panic!("invalid catalog pattern {:?}: {e}", method.pattern)),
            })
        })
        .collect()
});

/// Classifies `url` into a [`Fingerprint`]: host → router, path → service
/// (fixed substring priority order) → method (ordered regex scan) → router
/// window lookup with a `"default"` fallback.
///
/// # Errors
///
/// Returns [`Error::UnknownService`] if no service's path markers match,
/// [`Error::UnknownMethod`] if the service matched but no method pattern
/// does, and [`Error::UnknownRouter`] if the method has no window row for
/// this router and no `"default"` fallback row either.
pub fn classify(url: &str) -> Result<Fingerprint> {
    let parsed = Url::parse(url).map_err(|e| Error::UnknownRouter(format!("{url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::UnknownRouter(format!("{url}: no host")))?;
    let router = host
        .split('.')
        .next()
        .unwrap_or(host)
        .to_ascii_lowercase();

    let path = parsed.path();
    let lower_path = path.to_ascii_lowercase();

    let service = CATALOG
        .iter()
        .find(|s| s.path_markers.iter().any(|marker| lower_path.contains(marker)))
        .ok_or_else(|| Error::UnknownService(url.to_owned()))?;

    let compiled_method = COMPILED
        .iter()
        .filter(|cm| cm.service == service.name)
        .find(|cm| cm.regex.is_match(path))
        .ok_or_else(|| Error::UnknownMethod(url.to_owned()))?;

    let windows = compiled_method
        .method
        .windows_for(&router)
        .ok_or_else(|| Error::UnknownRouter(format!("{router} has no quota row for {url}")))?;

    Ok(Fingerprint {
        url: url.to_owned(),
        router,
        service: service.name,
        method_id: compiled_method.method.id,
        seconds_cfg: windows.seconds,
        minutes_cfg: windows.minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_a_known_match_endpoint() {
        let fp = classify("https://kr.api.riotgames.com/lol/match/v5/matches/KR_1").unwrap();
        assert_eq!(fp.router, "kr");
        assert_eq!(fp.service, "MATCH-V5");
        assert_eq!(fp.method_id, "/lol/match/v5/matches");
        assert_eq!(fp.seconds_cfg.unwrap().window_secs, 10);
    }

    #[test]
    fn router_is_lowercased_leftmost_host_label() {
        let fp = classify("https://NA1.api.riotgames.com/lol/summoner/v4/summoners/by-puuid/abc")
            .unwrap();
        assert_eq!(fp.router, "na1");
    }

    #[test]
    fn unmatched_path_fails_with_unknown_service() {
        let err = classify("https://na1.api.riotgames.com/lol/spectator/v4/active-games/by-summoner/x")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownService(_)));
    }

    #[test]
    fn matched_service_but_no_method_fails_with_unknown_method() {
        let err = classify("https://na1.api.riotgames.com/lol/match/v5/nonexistent").unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(_)));
    }

    #[test]
    fn classification_is_deterministic() {
        let url = "https://euw1.api.riotgames.com/lol/league/v4/entries/by-summoner/xyz";
        let a = classify(url).unwrap();
        let b = classify(url).unwrap();
        assert_eq!(a.router, b.router);
        assert_eq!(a.service, b.service);
        assert_eq!(a.method_id, b.method_id);
    }

    #[test]
    fn league_exp_is_not_shadowed_by_league() {
        let fp = classify("https://na1.api.riotgames.com/lol/league-exp/v4/entries/RANKED_SOLO_5x5/I/IV")
            .unwrap();
        assert_eq!(fp.service, "LEAGUE-EXP-V4");
    }
}
