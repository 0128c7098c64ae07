//! Google ID token verification.
//!
//! [`IdentityVerifier`] is the narrow seam between the score service and the
//! identity provider: it takes an opaque assertion and hands back
//! [`IdentityClaims`], or fails. Anything it cannot cryptographically
//! validate is rejected.

use crate::config::IdentityConfig;
use crate::metrics_defs::SIGNING_KEYS_FETCHED;
use crate::unknown_keys::UnknownKeyIds;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use moka::sync::Cache;
use serde::Deserialize;
use shared::counter;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

const KEY_TTL_SECS: u64 = 60 * 60;
const KEY_CACHE_SIZE: u64 = 64;

/// Claims extracted from a verified assertion.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityClaims {
    /// Stable provider-issued user id (`sub`).
    pub subject: String,
    pub name: String,
    pub picture: String,
}

#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("no audience configured")]
    MissingAudience,
    #[error("token rejected: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("unknown signing key {0}")]
    UnknownKey(String),
    #[error("could not fetch signing keys: {0}")]
    KeySet(#[from] reqwest::Error),
    #[error("could not acquire key refresh permit")]
    RefreshPermit(#[from] tokio::sync::AcquireError),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, VerifyError>;
}

#[derive(Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Validates signature, audience, issuer and expiry, then extracts claims.
pub fn decode_claims(
    assertion: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    audience: &str,
    issuers: &[String],
) -> Result<IdentityClaims, VerifyError> {
    let mut validation = Validation::new(algorithm);
    validation.set_audience(&[audience]);
    validation.set_issuer(issuers);
    validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

    let data = decode::<TokenClaims>(assertion, key, &validation)?;

    Ok(IdentityClaims {
        subject: data.claims.sub,
        name: data.claims.name.unwrap_or_default(),
        picture: data.claims.picture.unwrap_or_default(),
    })
}

/// Verifies RS256 ID tokens against Google's published signing keys.
pub struct GoogleIdTokenVerifier {
    client_id: Option<String>,
    issuers: Vec<String>,
    keys: KeySet,
}

impl GoogleIdTokenVerifier {
    pub fn new(config: &IdentityConfig) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()?;

        Ok(GoogleIdTokenVerifier {
            client_id: config.client_id.clone(),
            issuers: config.issuers.clone(),
            keys: KeySet::new(client, config.certs_url.clone()),
        })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, VerifyError> {
        let audience = self
            .client_id
            .as_deref()
            .ok_or(VerifyError::MissingAudience)?;

        let header = decode_header(assertion)?;
        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
        let key = self.keys.get(&kid).await?;

        decode_claims(assertion, &key, Algorithm::RS256, audience, &self.issuers)
    }
}

/// Provider signing keys by key id, refetched when they expire or an unknown
/// key id shows up. Key ids still missing after a fetch are remembered for a
/// while and rejected without fetching again.
struct KeySet {
    client: reqwest::Client,
    certs_url: String,
    cache: Cache<String, DecodingKey>,
    unknown: UnknownKeyIds,
    // Only one fetch runs at a time, concurrent misses wait on it.
    refresh_lock: Semaphore,
}

impl KeySet {
    fn new(client: reqwest::Client, certs_url: String) -> Self {
        let cache = Cache::builder()
            .max_capacity(KEY_CACHE_SIZE)
            .time_to_live(Duration::from_secs(KEY_TTL_SECS))
            .build();

        KeySet {
            client,
            certs_url,
            cache,
            unknown: UnknownKeyIds::new(),
            refresh_lock: Semaphore::new(1),
        }
    }

    async fn get(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        if let Some(key) = self.cache.get(kid) {
            return Ok(key);
        }
        if self.unknown.is_unknown(kid) {
            return Err(VerifyError::UnknownKey(kid.to_string()));
        }

        let _permit = self.refresh_lock.acquire().await?;

        // Another request may have refreshed while we waited
        if let Some(key) = self.cache.get(kid) {
            return Ok(key);
        }
        if self.unknown.is_unknown(kid) {
            return Err(VerifyError::UnknownKey(kid.to_string()));
        }

        let jwks = self
            .client
            .get(&self.certs_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;

        counter!(SIGNING_KEYS_FETCHED).increment(1);

        let keys = keys_from_jwks(&jwks);
        info!("Fetched {} identity provider signing keys", keys.len());
        for (id, key) in keys {
            self.cache.insert(id, key);
        }

        self.cache.get(kid).ok_or_else(|| {
            self.unknown.record(kid);
            VerifyError::UnknownKey(kid.to_string())
        })
    }
}

fn keys_from_jwks(jwks: &JwkSet) -> Vec<(String, DecodingKey)> {
    jwks.keys
        .iter()
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some((kid, key)),
                Err(e) => {
                    debug!("Skipping unusable signing key {kid}: {e}");
                    None
                }
            }
        })
        .collect()
}
