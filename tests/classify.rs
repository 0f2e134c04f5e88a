//! Integration tests for URL classification against the real catalog.

use quota_governor::classify::classify;
use quota_governor::Error;

#[test]
fn champion_mastery_resolves_with_both_windows() {
    let fp = classify(
        "https://euw1.api.riotgames.com/lol/champion-mastery/v4/champion-masteries/by-puuid/abc/top",
    )
    .unwrap();
    assert_eq!(fp.router, "euw1");
    assert_eq!(fp.service, "CHAMPION-MASTERY-V4");
    assert!(fp.seconds_cfg.is_some());
    assert!(fp.minutes_cfg.is_some());
}

#[test]
fn account_v1_resolves_on_continental_router() {
    let fp = classify("https://americas.api.riotgames.com/riot/account/v1/accounts/by-puuid/xyz").unwrap();
    assert_eq!(fp.router, "americas");
    assert_eq!(fp.service, "ACCOUNT-V1");
    assert_eq!(fp.method_id, "/riot/account/v1/accounts/by-puuid");
}

#[test]
fn unrecognized_host_still_yields_a_router() {
    // Classification only cares about the leftmost label; an unfamiliar
    // subdomain is still a router, just one with no catalog row, so this
    // fails at the method/service stage, not the URL-parsing stage.
    let err = classify("https://totally-unknown.api.riotgames.com/not/a/real/path").unwrap_err();
    assert!(matches!(err, Error::UnknownService(_)));
}

#[test]
fn malformed_url_fails_fast() {
    let err = classify("not a url").unwrap_err();
    assert!(matches!(err, Error::UnknownRouter(_)));
}
