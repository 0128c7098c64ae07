//! Key ids the identity provider did not publish at the last fetch.
//!
//! Remembered for a short while so tokens naming made-up key ids are rejected
//! without another key set fetch. Entries expire on their own, which lets a
//! key that is published later be picked up on the next miss.

use crate::metrics_defs::{UNKNOWN_KEY_CACHE_HIT, UNKNOWN_KEY_CACHE_MISS};
use moka::sync::Cache;
use shared::counter;
use std::time::Duration;

const UNKNOWN_KEY_CAPACITY: u64 = 1000;
const UNKNOWN_KEY_TTL_SECS: u64 = 60;

pub struct UnknownKeyIds {
    kids: Cache<String, ()>,
}

impl UnknownKeyIds {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(UNKNOWN_KEY_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        UnknownKeyIds {
            kids: Cache::builder()
                .max_capacity(UNKNOWN_KEY_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn record(&self, kid: &str) {
        self.kids.insert(kid.to_string(), ());
    }

    pub fn is_unknown(&self, kid: &str) -> bool {
        let unknown = self.kids.contains_key(kid);
        if unknown {
            counter!(UNKNOWN_KEY_CACHE_HIT).increment(1);
        } else {
            counter!(UNKNOWN_KEY_CACHE_MISS).increment(1);
        }
        unknown
    }
}
