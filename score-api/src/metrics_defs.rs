//! Metrics definitions for the score API.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SYNC_ACCEPTED: MetricDef = MetricDef {
    name: "sync.accepted",
    metric_type: MetricType::Counter,
    description: "Number of score syncs persisted successfully",
};

pub const SYNC_UNAUTHORIZED: MetricDef = MetricDef {
    name: "sync.unauthorized",
    metric_type: MetricType::Counter,
    description: "Number of score syncs rejected because the token did not verify",
};

pub const SYNC_FAILED: MetricDef = MetricDef {
    name: "sync.failed",
    metric_type: MetricType::Counter,
    description: "Number of score syncs that failed in the player store",
};

pub const BOUNDARY_REJECTED: MetricDef = MetricDef {
    name: "boundary.rejected",
    metric_type: MetricType::Counter,
    description: "Number of requests rejected by the origin filter",
};

pub const LEADERBOARD_SERVED: MetricDef = MetricDef {
    name: "leaderboard.served",
    metric_type: MetricType::Counter,
    description: "Number of leaderboard queries answered",
};

pub const SIGNING_KEYS_FETCHED: MetricDef = MetricDef {
    name: "signing_keys.fetched",
    metric_type: MetricType::Counter,
    description: "Number of identity provider key set fetches",
};

pub const UNKNOWN_KEY_CACHE_HIT: MetricDef = MetricDef {
    name: "signing_keys.unknown_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of tokens rejected for a key id missing from the last key set fetch",
};

pub const UNKNOWN_KEY_CACHE_MISS: MetricDef = MetricDef {
    name: "signing_keys.unknown_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of key id lookups not found among recently missing key ids",
};

pub const STORE_QUERY_DURATION: MetricDef = MetricDef {
    name: "store.query.duration",
    metric_type: MetricType::Histogram,
    description: "Time to run a player store query in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    SYNC_ACCEPTED,
    SYNC_UNAUTHORIZED,
    SYNC_FAILED,
    BOUNDARY_REJECTED,
    LEADERBOARD_SERVED,
    SIGNING_KEYS_FETCHED,
    UNKNOWN_KEY_CACHE_HIT,
    UNKNOWN_KEY_CACHE_MISS,
    STORE_QUERY_DURATION,
];
