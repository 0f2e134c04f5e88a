//! Static quota catalog: service → ordered method list, each carrying a
//! per-router window table.
//!
//! This is data, not logic, see [`crate::classify`] for how a URL is turned
//! into a [`crate::classify::Fingerprint`] against this table. The catalog is
//! immutable after process start and is never touched by the store.

/// One side of a method's rate limit (either the seconds or minutes window).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowLimit {
    pub limit: u32,
    pub window_secs: u32,
}

impl WindowLimit {
    #[must_use]
    pub const fn new(limit: u32, window_secs: u32) -> Self {
        Self { limit, window_secs }
    }
}

/// The window limits configured for one router on one method. Either window
/// may be absent, that dimension is not policed for this router.
#[derive(Clone, Copy, Debug)]
pub struct RouterWindows {
    pub router: &'static str,
    pub seconds: Option<WindowLimit>,
    pub minutes: Option<WindowLimit>,
}

/// A single endpoint within a service: its canonical identifier, the regex
/// pattern (anchored, matched against the URL path), and the per-router
/// window table.
#[derive(Clone, Copy, Debug)]
pub struct MethodDescriptor {
    pub id: &'static str,
    pub pattern: &'static str,
    pub routers: &'static [RouterWindows],
}

impl MethodDescriptor {
    /// The window table for `router`, falling back to the `"default"` row
    /// if the router isn't explicitly listed.
    #[must_use]
    pub fn windows_for(&self, router: &str) -> Option<&'static RouterWindows> {
        self.routers
            .iter()
            .find(|rw| rw.router.eq_ignore_ascii_case(router))
            .or_else(|| self.routers.iter().find(|rw| rw.router == "default"))
    }
}

/// A top-level API family and the methods it exposes, in declared priority
/// order (classification scans in this order and returns the first match).
#[derive(Clone, Copy, Debug)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    /// Substrings checked against the lowercased URL path, in priority
    /// order; the first service whose substring matches wins.
    pub path_markers: &'static [&'static str],
    pub methods: &'static [MethodDescriptor],
}

// `seconds_opt!`'s two fields are matched as `:tt`, not `:expr`: an `expr`
// fragment is opaque once captured, so forwarding a captured `None` through
// another macro invocation would no longer match a literal `None` arm. `tt`
// keeps each argument as a raw token so the literal-`None` arm still fires.
macro_rules! windows {
    ($router:literal, $seconds_limit:tt, $seconds_window:tt, $minutes_limit:tt, $minutes_window:tt) => {
        RouterWindows {
            router: $router,
            seconds: seconds_opt!($seconds_limit, $seconds_window),
            minutes: seconds_opt!($minutes_limit, $minutes_window),
        }
    };
}

macro_rules! seconds_opt {
    (None, None) => {
        None
    };
    ($limit:tt, $window:tt) => {
        Some(WindowLimit::new($limit, $window))
    };
}

/// Service-detection priority order: SUMMONER, LEAGUE, LEAGUE-EXP, ACCOUNT,
/// MATCH, CHAMPION-MASTERY. The classifier walks this slice in order and
/// takes the first path-marker match, so the array order below IS the
/// priority order, don't reorder it without checking `classify::classify`
/// still needs no adjustment.
pub static CATALOG: &[ServiceDescriptor] = &[
    ServiceDescriptor {
        name: "SUMMONER-V4",
        path_markers: &["/lol/summoner/v4", "/fulfillment/v1"],
        methods: &[
            MethodDescriptor {
                id: "/lol/summoner/v4/summoners/by-puuid",
                pattern: r"^/lol/summoner/v4/summoners/by-puuid/([^/]+)$",
                routers: &[
                    windows!("na1", 2000, 60, None, None),
                    windows!("euw1", 2000, 60, None, None),
                    windows!("kr", 2000, 60, None, None),
                    windows!("br1", 1300, 60, None, None),
                    windows!("default", 800, 60, None, None),
                ],
            },
            MethodDescriptor {
                id: "/lol/summoner/v4/summoners/me",
                pattern: r"^/lol/summoner/v4/summoners/me$",
                routers: &[windows!("default", 20000, 10, 1_200_000, 600)],
            },
            MethodDescriptor {
                id: "/lol/summoner/v4/summoners",
                pattern: r"^/lol/summoner/v4/summoners/([^/]+)$",
                routers: &[
                    windows!("na1", 2000, 60, None, None),
                    windows!("euw1", 2000, 60, None, None),
                    windows!("kr", 2000, 60, None, None),
                    windows!("br1", 1300, 60, None, None),
                    windows!("default", 800, 60, None, None),
                ],
            },
        ],
    },
    ServiceDescriptor {
        name: "LEAGUE-V4",
        path_markers: &["/lol/league/v4"],
        methods: &[
            MethodDescriptor {
                id: "/lol/league/v4/challengerleagues/by-queue",
                pattern: r"^/lol/league/v4/challengerleagues/by-queue/([^/]+)$",
                routers: &[windows!("default", 30, 10, 500, 600)],
            },
            MethodDescriptor {
                id: "/lol/league/v4/entries/by-summoner",
                pattern: r"^/lol/league/v4/entries/by-summoner/([^/]+)$",
                routers: &[windows!("default", 50, 10, None, None)],
            },
            MethodDescriptor {
                id: "/lol/league/v4/masterleagues/by-queue",
                pattern: r"^/lol/league/v4/masterleagues/by-queue/([^/]+)$",
                routers: &[windows!("default", 30, 10, 500, 600)],
            },
        ],
    },
    ServiceDescriptor {
        name: "LEAGUE-EXP-V4",
        path_markers: &["/lol/league-exp/v4"],
        methods: &[MethodDescriptor {
            id: "/lol/league-exp/v4/entries",
            pattern: r"^/lol/league-exp/v4/entries/([^/]+)/([^/]+)/([^/]+)$",
            routers: &[windows!("default", 50, 10, None, None)],
        }],
    },
    ServiceDescriptor {
        name: "ACCOUNT-V1",
        path_markers: &["/riot/account/v1"],
        methods: &[
            MethodDescriptor {
                id: "/riot/account/v1/accounts/by-riot-id",
                pattern: r"^/riot/account/v1/accounts/by-riot-id/([^/]+)/([^/]+)$",
                routers: &[
                    windows!("americas", 1000, 60, None, None),
                    windows!("asia", 1000, 60, None, None),
                    windows!("europe", 1000, 60, None, None),
                    windows!("default", 1000, 60, None, None),
                ],
            },
            MethodDescriptor {
                id: "/riot/account/v1/accounts/by-puuid",
                pattern: r"^/riot/account/v1/accounts/by-puuid/([^/]+)$",
                routers: &[
                    windows!("americas", 1000, 60, None, None),
                    windows!("asia", 1000, 60, None, None),
                    windows!("europe", 1000, 60, None, None),
                    windows!("default", 1000, 60, None, None),
                ],
            },
            MethodDescriptor {
                id: "/riot/account/v1/active-shards/by-game",
                pattern: r"^/riot/account/v1/active-shards/by-game/([^/]+)/([^/]+)$",
                routers: &[windows!("default", 20000, 10, 1_200_000, 600)],
            },
        ],
    },
    ServiceDescriptor {
        name: "MATCH-V5",
        path_markers: &["/lol/match/v5/"],
        methods: &[
            MethodDescriptor {
                id: "/lol/match/v5/matches",
                pattern: r"^/lol/match/v5/matches/([^/]+)$",
                routers: &[
                    windows!("americas", 20000, 10, None, None),
                    windows!("asia", 20000, 10, None, None),
                    windows!("europe", 20000, 10, None, None),
                    windows!("sea", 20000, 10, None, None),
                    windows!("default", 20000, 10, None, None),
                ],
            },
            MethodDescriptor {
                id: "/lol/match/v5/matches/by-puuid",
                pattern: r"^/lol/match/v5/matches/by-puuid/([^/]+)/ids$",
                routers: &[
                    windows!("americas", 20000, 10, None, None),
                    windows!("asia", 20000, 10, None, None),
                    windows!("europe", 20000, 10, None, None),
                    windows!("sea", 20000, 10, None, None),
                    windows!("default", 20000, 10, None, None),
                ],
            },
            MethodDescriptor {
                id: "/lol/match/v5/matches/timeline",
                pattern: r"^/lol/match/v5/matches/([^/]+)/timeline$",
                routers: &[
                    windows!("americas", 20000, 10, None, None),
                    windows!("asia", 20000, 10, None, None),
                    windows!("europe", 20000, 10, None, None),
                    windows!("sea", 20000, 10, None, None),
                    windows!("default", 20000, 10, None, None),
                ],
            },
        ],
    },
    ServiceDescriptor {
        name: "CHAMPION-MASTERY-V4",
        path_markers: &["/lol/champion-mastery/v4"],
        methods: &[
            MethodDescriptor {
                id: "/lol/champion-mastery/v4/champion-masteries/by-puuid/by-champion",
                pattern: r"^/lol/champion-mastery/v4/champion-masteries/by-puuid/([^/]+)/by-champion/([^/]+)$",
                routers: &[windows!("default", 20000, 10, 1_200_000, 600)],
            },
            MethodDescriptor {
                id: "/lol/champion-mastery/v4/champion-masteries/by-puuid/top",
                pattern: r"^/lol/champion-mastery/v4/champion-masteries/by-puuid/([^/]+)/top$",
                routers: &[windows!("default", 20000, 10, 1_200_000, 600)],
            },
            MethodDescriptor {
                id: "/lol/champion-mastery/v4/champion-masteries/by-puuid",
                pattern: r"^/lol/champion-mastery/v4/champion-masteries/by-puuid/([^/]+)$",
                routers: &[windows!("default", 20000, 10, 1_200_000, 600)],
            },
            MethodDescriptor {
                id: "/lol/champion-mastery/v4/scores/by-puuid",
                pattern: r"^/lol/champion-mastery/v4/scores/by-puuid/([^/]+)$",
                routers: &[windows!("default", 20000, 10, 1_200_000, 600)],
            },
        ],
    },
];
