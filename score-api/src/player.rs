use crate::identity::IdentityClaims;
use serde::Serialize;

/// One persisted player, keyed by the identity provider's subject id.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerRecord {
    pub external_id: String,
    pub name: String,
    pub picture: String,
    pub high_score: i64,
}

impl PlayerRecord {
    /// Record created by the first sync of a new identity.
    pub fn new(claims: &IdentityClaims, score: i64) -> Self {
        PlayerRecord {
            external_id: claims.subject.clone(),
            name: claims.name.clone(),
            picture: claims.picture.clone(),
            high_score: score.max(0),
        }
    }

    /// Applies a later sync. Profile fields always follow the fresh claims,
    /// the high score only moves when strictly beaten. Returns whether the
    /// high score changed.
    pub fn apply_sync(&mut self, claims: &IdentityClaims, score: i64) -> bool {
        self.name = claims.name.clone();
        self.picture = claims.picture.clone();

        if score > self.high_score {
            self.high_score = score;
            true
        } else {
            false
        }
    }
}

/// Result of a sync as stored after the upsert.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct SyncedScore {
    pub high_score: i64,
    pub name: String,
}

/// Public leaderboard row. The external id is never exposed.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    pub picture: String,
    pub high_score: i64,
}

impl From<&PlayerRecord> for LeaderboardEntry {
    fn from(record: &PlayerRecord) -> Self {
        LeaderboardEntry {
            name: record.name.clone(),
            picture: record.picture.clone(),
            high_score: record.high_score,
        }
    }
}

impl From<&PlayerRecord> for SyncedScore {
    fn from(record: &PlayerRecord) -> Self {
        SyncedScore {
            high_score: record.high_score,
            name: record.name.clone(),
        }
    }
}
