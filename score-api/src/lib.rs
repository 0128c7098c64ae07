//! Player score API: verifies Google ID tokens, keeps each player's best
//! score in Postgres and serves the leaderboard.

pub mod api;
pub mod boundary;
pub mod config;
pub mod errors;
pub mod identity;
pub mod metrics_defs;
pub mod player;
pub mod service;
pub mod store;
mod unknown_keys;

#[cfg(test)]
mod testutils;

use boundary::BoundaryFilter;
use identity::GoogleIdTokenVerifier;
use service::ScoreService;
use std::sync::Arc;
use store::PgPlayerStore;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum ScoreApiError {
    #[error("invalid config: {0}")]
    Config(#[from] config::ValidationError),
    #[error("could not set up token verification: {0}")]
    Identity(#[from] identity::VerifyError),
    #[error("server error: {0}")]
    Api(#[from] api::ApiError),
}

pub async fn run(config: config::Config) -> Result<(), ScoreApiError> {
    config.validate()?;

    if config.identity.client_id.is_none() {
        warn!("No Google client id configured, every score sync will be rejected");
    }
    if config.database.url.is_none() {
        warn!("No database url configured, every store operation will fail");
    }

    let verifier = GoogleIdTokenVerifier::new(&config.identity)?;
    let store = PgPlayerStore::new(config.database.clone());
    let service = Arc::new(ScoreService::new(
        Arc::new(verifier),
        Arc::new(store),
        config.leaderboard.limit,
    ));

    let filter = Arc::new(BoundaryFilter::new(config.boundary.clone()));
    info!(policy = ?filter.policy(), "Origin filter configured");

    api::serve(&config.listener, api::router(service, filter)).await?;
    Ok(())
}
