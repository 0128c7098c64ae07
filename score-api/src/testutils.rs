use crate::identity::{IdentityClaims, IdentityVerifier, VerifyError};
use crate::player::{LeaderboardEntry, PlayerRecord, SyncedScore};
use crate::store::{PlayerStore, StoreError};
use async_trait::async_trait;
use axum::{Json, Router, extract::State, routing::get};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

/// Accepts tokens of the form `token-<subject>` for a fixed set of subjects.
pub struct StaticVerifier {
    subjects: Vec<String>,
    calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn with_players(subjects: &[&str]) -> Self {
        StaticVerifier {
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `verify` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let subject = assertion
            .strip_prefix("token-")
            .filter(|subject| self.subjects.iter().any(|s| s == *subject))
            .ok_or_else(|| VerifyError::UnknownKey("static".into()))?;

        Ok(IdentityClaims {
            subject: subject.to_string(),
            name: format!("Player {subject}"),
            picture: format!("https://example.com/{subject}.png"),
        })
    }
}

/// In-memory player store applying the same reconciliation rule as the
/// Postgres upsert, under a single lock.
pub struct MemoryPlayerStore {
    players: Mutex<HashMap<String, PlayerRecord>>,
    writes: AtomicUsize,
    failing: bool,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        MemoryPlayerStore {
            players: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            failing: false,
        }
    }

    /// A store whose every operation fails like an unconfigured database.
    pub fn failing() -> Self {
        MemoryPlayerStore {
            failing: true,
            ..MemoryPlayerStore::new()
        }
    }

    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    pub fn get(&self, external_id: &str) -> Option<PlayerRecord> {
        self.players.lock().get(external_id).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlayerStore for MemoryPlayerStore {
    async fn sync_player(
        &self,
        claims: &IdentityClaims,
        score: i64,
    ) -> Result<SyncedScore, StoreError> {
        if self.failing {
            return Err(StoreError::MissingConnectionString);
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut players = self.players.lock();
        let record = players
            .entry(claims.subject.clone())
            .and_modify(|record| {
                record.apply_sync(claims, score);
            })
            .or_insert_with(|| PlayerRecord::new(claims, score));

        Ok(SyncedScore::from(&*record))
    }

    async fn top_players(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StoreError> {
        if self.failing {
            return Err(StoreError::MissingConnectionString);
        }

        let players = self.players.lock();
        let mut records: Vec<&PlayerRecord> = players.values().collect();
        records.sort_by(|a, b| {
            b.high_score
                .cmp(&a.high_score)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });

        Ok(records
            .into_iter()
            .take(limit as usize)
            .map(LeaderboardEntry::from)
            .collect())
    }
}

#[derive(Clone)]
struct PublishedKeys {
    jwks: Arc<Mutex<Value>>,
    fetches: Arc<AtomicUsize>,
}

/// Serves a JSON Web Key Set at `/certs` on a local port and counts how often
/// it is fetched.
pub struct JwksServer {
    addr: SocketAddr,
    keys: PublishedKeys,
}

impl JwksServer {
    pub async fn start(jwks: Value) -> Self {
        let keys = PublishedKeys {
            jwks: Arc::new(Mutex::new(jwks)),
            fetches: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/certs", get(serve_certs))
            .with_state(keys.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        JwksServer { addr, keys }
    }

    pub fn certs_url(&self) -> String {
        format!("http://{}/certs", self.addr)
    }

    /// Replaces the published key set, as a provider does when rotating keys.
    pub fn publish(&self, jwks: Value) {
        *self.keys.jwks.lock() = jwks;
    }

    pub fn fetches(&self) -> usize {
        self.keys.fetches.load(Ordering::SeqCst)
    }
}

async fn serve_certs(State(keys): State<PublishedKeys>) -> Json<Value> {
    keys.fetches.fetch_add(1, Ordering::SeqCst);
    Json(keys.jwks.lock().clone())
}
