use crate::errors::{Result, ScoreError};
use crate::identity::IdentityVerifier;
use crate::metrics_defs::{LEADERBOARD_SERVED, SYNC_ACCEPTED, SYNC_FAILED, SYNC_UNAUTHORIZED};
use crate::player::{LeaderboardEntry, SyncedScore};
use crate::store::PlayerStore;
use serde_json::Number;
use shared::counter;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Verifies players and reconciles their scores with the player store.
pub struct ScoreService {
    verifier: Arc<dyn IdentityVerifier>,
    store: Arc<dyn PlayerStore>,
    leaderboard_limit: u32,
}

impl ScoreService {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        store: Arc<dyn PlayerStore>,
        leaderboard_limit: u32,
    ) -> Self {
        ScoreService {
            verifier,
            store,
            leaderboard_limit,
        }
    }

    /// Verifies `assertion` and records `score` if it beats the stored one.
    ///
    /// Nothing is written unless the assertion verifies. The returned score
    /// is whatever the store holds after the sync, which may be higher than
    /// `score`.
    pub async fn sync_score(&self, assertion: Option<&str>, score: i64) -> Result<SyncedScore> {
        let assertion = match assertion.map(str::trim) {
            Some(assertion) if !assertion.is_empty() => assertion,
            _ => {
                warn!("Score sync without a token");
                counter!(SYNC_UNAUTHORIZED).increment(1);
                return Err(ScoreError::Unauthorized);
            }
        };

        let claims = self.verifier.verify(assertion).await.map_err(|e| {
            warn!("Token verification failed: {e}");
            counter!(SYNC_UNAUTHORIZED).increment(1);
            ScoreError::Unauthorized
        })?;

        let synced = self
            .store
            .sync_player(&claims, score.max(0))
            .await
            .map_err(|e| {
                error!(subject = %claims.subject, "Score sync failed: {e}");
                counter!(SYNC_FAILED).increment(1);
                ScoreError::Store(e)
            })?;

        debug!(
            subject = %claims.subject,
            submitted = score,
            high_score = synced.high_score,
            "Score synced"
        );
        counter!(SYNC_ACCEPTED).increment(1);
        Ok(synced)
    }

    /// The configured number of best players, highest score first.
    pub async fn top_players(&self) -> Result<Vec<LeaderboardEntry>> {
        let players = self
            .store
            .top_players(self.leaderboard_limit)
            .await
            .map_err(|e| {
                error!("Leaderboard query failed: {e}");
                ScoreError::Store(e)
            })?;

        counter!(LEADERBOARD_SERVED).increment(1);
        Ok(players)
    }
}

/// Turns the submitted JSON score into a stored score.
///
/// Missing scores count as 0 and negative scores are clamped to 0. Whole
/// numbers written as floats (`100.0`) are accepted; fractions and values
/// outside the 64-bit range are rejected.
pub fn normalize_score(raw: Option<&Number>) -> Result<i64> {
    let Some(raw) = raw else {
        return Ok(0);
    };

    if let Some(score) = raw.as_i64() {
        return Ok(score.max(0));
    }

    if raw.is_u64() {
        return Err(ScoreError::BadRequest(format!("score {raw} is out of range")));
    }

    match raw.as_f64() {
        Some(score) if score.is_finite() && score.fract() == 0.0 => {
            if score < 0.0 {
                Ok(0)
            } else if score < i64::MAX as f64 {
                Ok(score as i64)
            } else {
                Err(ScoreError::BadRequest(format!("score {raw} is out of range")))
            }
        }
        _ => Err(ScoreError::BadRequest(format!(
            "score {raw} is not a whole number"
        ))),
    }
}
