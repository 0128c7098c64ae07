use serde::Deserialize;
use thiserror::Error;

const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: &[&str] = &["accounts.google.com", "https://accounts.google.com"];

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Leaderboard limit must be at least 1")]
    InvalidLeaderboardLimit,

    #[error("Boundary domain cannot be empty")]
    EmptyDomain,

    #[error("At least one identity issuer is required")]
    NoIssuers,

    #[error("Invalid value for {key}: {value}")]
    InvalidEnvValue { key: &'static str, value: String },
}

/// Score API configuration. Every section has a default so an empty file, or
/// no file at all, yields a usable config that the environment then fills in.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub listener: Listener,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub boundary: BoundaryPolicy,
    pub leaderboard: LeaderboardConfig,
}

impl Config {
    /// Overrides config values with the ones found through `lookup`.
    ///
    /// Recognised keys: `DATABASE_URL` (or `MONGODB_URI`), `GOOGLE_CLIENT_ID`,
    /// `PORT`, `ALLOWED_ORIGINS`, `ALLOWED_ORIGIN_SUFFIX` and `ALLOWED_DOMAIN`.
    /// Empty values are ignored. A domain takes precedence over an origin list.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("MONGODB_URI")) {
            self.database.url = Some(url);
        }

        if let Some(client_id) = lookup("GOOGLE_CLIENT_ID") {
            self.identity.client_id = Some(client_id);
        }

        if let Some(port) = lookup("PORT") {
            self.listener.port = port
                .trim()
                .parse()
                .map_err(|_| ValidationError::InvalidEnvValue {
                    key: "PORT",
                    value: port.clone(),
                })?;
        }

        let origins = lookup("ALLOWED_ORIGINS").map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        });
        let suffix = lookup("ALLOWED_ORIGIN_SUFFIX");
        if origins.is_some() || suffix.is_some() {
            self.boundary = BoundaryPolicy::AllowList {
                origins: origins.unwrap_or_default(),
                suffix,
            };
        }

        if let Some(domain) = lookup("ALLOWED_DOMAIN") {
            self.boundary = BoundaryPolicy::Domain { domain };
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;

        if self.leaderboard.limit == 0 {
            return Err(ValidationError::InvalidLeaderboardLimit);
        }

        if self.identity.issuers.is_empty() {
            return Err(ValidationError::NoIssuers);
        }

        if let BoundaryPolicy::Domain { domain } = &self.boundary
            && domain.trim_matches(|c: char| c == '.' || c.is_whitespace()).is_empty()
        {
            return Err(ValidationError::EmptyDomain);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string. Left unset, every store operation fails.
    pub url: Option<String>,
    /// Upper bound on waiting for a pooled connection, including the first
    /// connect. Keeps handlers from hanging on an unreachable database.
    pub acquire_timeout_ms: u64,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: None,
            acquire_timeout_ms: 5000,
            max_connections: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    /// Google OAuth client id, checked against the token audience.
    pub client_id: Option<String>,
    pub certs_url: String,
    pub issuers: Vec<String>,
    pub http_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            client_id: None,
            certs_url: GOOGLE_CERTS_URL.into(),
            issuers: GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect(),
            http_timeout_ms: 5000,
        }
    }
}

/// Request admission policy applied before any handler runs.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum BoundaryPolicy {
    /// Admit every request.
    #[default]
    Open,
    /// Admit requests without an origin, with an origin from `origins`, or
    /// with an origin ending in `suffix`.
    AllowList {
        #[serde(default)]
        origins: Vec<String>,
        #[serde(default)]
        suffix: Option<String>,
    },
    /// Admit requests whose origin (or referer) host is `domain` or one of
    /// its subdomains.
    Domain { domain: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub limit: u32,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        LeaderboardConfig { limit: 10 }
    }
}
