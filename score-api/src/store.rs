//! Player persistence.
//!
//! The Postgres store connects lazily on first use. All reconciliation
//! happens inside a single `INSERT .. ON CONFLICT` statement, so concurrent
//! syncs for one identity serialize on the primary key instead of racing in
//! application code.

use crate::config::DatabaseConfig;
use crate::identity::IdentityClaims;
use crate::metrics_defs::STORE_QUERY_DURATION;
use crate::player::{LeaderboardEntry, SyncedScore};
use async_trait::async_trait;
use shared::histogram;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::info;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    external_id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    picture TEXT NOT NULL DEFAULT '',
    high_score BIGINT NOT NULL DEFAULT 0 CHECK (high_score >= 0)
)
"#;

const CREATE_SCORE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS players_high_score_idx ON players (high_score DESC)";

const UPSERT_PLAYER: &str = r#"
INSERT INTO players (external_id, name, picture, high_score)
VALUES ($1, $2, $3, $4)
ON CONFLICT (external_id) DO UPDATE SET
    name = EXCLUDED.name,
    picture = EXCLUDED.picture,
    high_score = CASE
        WHEN EXCLUDED.high_score > players.high_score THEN EXCLUDED.high_score
        ELSE players.high_score
    END
RETURNING high_score, name
"#;

const TOP_PLAYERS: &str = r#"
SELECT name, picture, high_score
FROM players
ORDER BY high_score DESC, external_id ASC
LIMIT $1
"#;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database url is not configured")]
    MissingConnectionString,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Inserts or updates the player for `claims`, keeping the larger of the
    /// stored and submitted score. `score` is expected to be non-negative.
    async fn sync_player(
        &self,
        claims: &IdentityClaims,
        score: i64,
    ) -> Result<SyncedScore, StoreError>;

    /// Highest scores first, at most `limit` rows.
    async fn top_players(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

pub struct PgPlayerStore {
    config: DatabaseConfig,
    // Set once by the first caller that connects successfully. A failed
    // attempt leaves it empty and the next request tries again.
    pool: OnceCell<PgPool>,
}

impl PgPlayerStore {
    pub fn new(config: DatabaseConfig) -> Self {
        PgPlayerStore {
            config,
            pool: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    async fn pool(&self) -> Result<&PgPool, StoreError> {
        let url = self
            .config
            .url
            .as_deref()
            .ok_or(StoreError::MissingConnectionString)?;

        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .acquire_timeout(Duration::from_millis(self.config.acquire_timeout_ms))
                    .connect(url)
                    .await?;

                sqlx::query(CREATE_TABLE).execute(&pool).await?;
                sqlx::query(CREATE_SCORE_INDEX).execute(&pool).await?;

                info!("Connected to player database");
                Ok::<_, StoreError>(pool)
            })
            .await
    }
}

#[async_trait]
impl PlayerStore for PgPlayerStore {
    async fn sync_player(
        &self,
        claims: &IdentityClaims,
        score: i64,
    ) -> Result<SyncedScore, StoreError> {
        let pool = self.pool().await?;
        let start = Instant::now();

        let synced = sqlx::query_as::<_, SyncedScore>(UPSERT_PLAYER)
            .bind(&claims.subject)
            .bind(&claims.name)
            .bind(&claims.picture)
            .bind(score.max(0))
            .fetch_one(pool)
            .await?;

        histogram!(STORE_QUERY_DURATION, "query" => "sync_player")
            .record(start.elapsed().as_secs_f64());
        Ok(synced)
    }

    async fn top_players(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let pool = self.pool().await?;
        let start = Instant::now();

        let players = sqlx::query_as::<_, LeaderboardEntry>(TOP_PLAYERS)
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await?;

        histogram!(STORE_QUERY_DURATION, "query" => "top_players")
            .record(start.elapsed().as_secs_f64());
        Ok(players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn claims() -> IdentityClaims {
        IdentityClaims {
            subject: "u1".into(),
            name: "Ada".into(),
            picture: String::new(),
        }
    }

    fn player(subject: &str, name: &str) -> IdentityClaims {
        IdentityClaims {
            subject: subject.into(),
            name: name.into(),
            picture: format!("https://example.com/{subject}.png"),
        }
    }

    /// A store on the database named by `DATABASE_URL` with every player whose
    /// id starts with `prefix` removed, or `None` when no database is
    /// configured.
    async fn live_store(prefix: &str) -> Option<Arc<PgPlayerStore>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL is not set, skipping");
            return None;
        };

        let store = PgPlayerStore::new(DatabaseConfig {
            url: Some(url),
            ..DatabaseConfig::default()
        });
        let pool = store.pool().await.unwrap();
        sqlx::query("DELETE FROM players WHERE external_id LIKE $1")
            .bind(format!("{prefix}%"))
            .execute(pool)
            .await
            .unwrap();

        Some(Arc::new(store))
    }

    async fn count_players(store: &PgPlayerStore, external_id: &str) -> i64 {
        let pool = store.pool().await.unwrap();
        sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE external_id = $1")
            .bind(external_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_url_fails_every_operation() {
        let store = PgPlayerStore::new(DatabaseConfig::default());

        assert!(matches!(
            store.sync_player(&claims(), 10).await,
            Err(StoreError::MissingConnectionString)
        ));
        assert!(matches!(
            store.top_players(10).await,
            Err(StoreError::MissingConnectionString)
        ));
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn unreachable_database_fails_fast() {
        let store = PgPlayerStore::new(DatabaseConfig {
            url: Some("postgres://scores@127.0.0.1:1/scores".into()),
            acquire_timeout_ms: 200,
            max_connections: 1,
        });

        let start = Instant::now();
        let result = store.top_players(10).await;

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
        // Failed connections are not cached
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn upsert_only_raises_score() {
        let Some(store) = live_store("keep-best-").await else {
            return;
        };
        let ada = player("keep-best-u1", "Ada");

        let first = store.sync_player(&ada, 100).await.unwrap();
        assert_eq!(first.high_score, 100);
        assert_eq!(first.name, "Ada");

        let lower = store.sync_player(&ada, 50).await.unwrap();
        assert_eq!(lower.high_score, 100);

        let equal = store.sync_player(&ada, 100).await.unwrap();
        assert_eq!(equal.high_score, 100);

        let renamed = player("keep-best-u1", "Ada L.");
        let higher = store.sync_player(&renamed, 150).await.unwrap();
        assert_eq!(higher.high_score, 150);
        assert_eq!(higher.name, "Ada L.");

        assert_eq!(count_players(&store, "keep-best-u1").await, 1);
        assert!(store.is_connected());
    }

    #[tokio::test]
    async fn upsert_clamps_negative_first_score() {
        let Some(store) = live_store("clamp-").await else {
            return;
        };

        let synced = store
            .sync_player(&player("clamp-u1", "Bo"), -5)
            .await
            .unwrap();
        assert_eq!(synced.high_score, 0);
    }

    #[tokio::test]
    async fn concurrent_first_syncs_create_one_player() {
        let Some(store) = live_store("first-sync-").await else {
            return;
        };

        let tasks: Vec<_> = (1..=8)
            .map(|score| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .sync_player(&player("first-sync-u1", "Cy"), score * 10)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(count_players(&store, "first-sync-u1").await, 1);
        let best = store
            .sync_player(&player("first-sync-u1", "Cy"), 0)
            .await
            .unwrap();
        assert_eq!(best.high_score, 80);
    }

    #[tokio::test]
    async fn top_players_are_sorted_and_limited() {
        let Some(store) = live_store("ranked-").await else {
            return;
        };

        // Large enough to outrank any other rows in the table
        for i in 0..15 {
            let claims = player(&format!("ranked-{i:02}"), &format!("Ranked {i:02}"));
            store.sync_player(&claims, i64::MAX - 100 + i).await.unwrap();
        }

        let top = store.top_players(10).await.unwrap();
        assert_eq!(top.len(), 10);
        assert!(top.windows(2).all(|w| w[0].high_score >= w[1].high_score));
        assert_eq!(top[0].name, "Ranked 14");
        assert_eq!(top[0].high_score, i64::MAX - 86);
        assert_eq!(top[9].name, "Ranked 05");

        assert_eq!(store.top_players(3).await.unwrap().len(), 3);
    }
}

