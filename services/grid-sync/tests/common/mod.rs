//! Shared fixtures: an in-memory `BotStore` and a scripted `BotSource`
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bybit_client::{BotSource, BybitError, ListBotsRequest, SourceHealth};
use chrono::{Duration, Utc};
use grid_sync::db::{BotStore, BotTransaction, StoreError};
use grid_sync::models::{GridBot, NormalizedBot};
use serde_json::{json, Value};

#[derive(Default)]
struct Inner {
    rows: Vec<GridBot>,
    next_id: i64,
    begins: usize,
    commits: usize,
    fail_next_commit: bool,
    race_on_commit: Option<NormalizedBot>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Transactional in-memory store.
///
/// A transaction works on a private copy of the rows; commit swaps it in.
/// Grid ids are unique at commit time, like the Postgres index.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<GridBot> {
        self.inner.lock().unwrap().rows.clone()
    }

    pub fn row(&self, grid_id: &str) -> Option<GridBot> {
        self.rows().into_iter().find(|r| r.grid_id == grid_id)
    }

    pub fn begins(&self) -> usize {
        self.inner.lock().unwrap().begins
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().unwrap().commits
    }

    /// The next commit fails as if the connection pool had timed out
    pub fn fail_next_commit(&self) {
        self.inner.lock().unwrap().fail_next_commit = true;
    }

    /// Another writer commits `bot` just before our next commit
    pub fn race_on_commit(&self, bot: NormalizedBot) {
        self.inner.lock().unwrap().race_on_commit = Some(bot);
    }

    /// Insert a row directly, bypassing the uniqueness check
    pub fn seed_raw(&self, bot: NormalizedBot) {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.allocate_id();
        inner.rows.push(GridBot::from_candidate(id, bot, Utc::now()));
    }
}

pub struct MemoryTx {
    inner: Arc<Mutex<Inner>>,
    working: Vec<GridBot>,
    inserted: Vec<i64>,
}

#[async_trait]
impl BotStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begins += 1;
        Ok(MemoryTx {
            inner: self.inner.clone(),
            working: inner.rows.clone(),
            inserted: Vec::new(),
        })
    }

    async fn list_all(&self) -> Result<Vec<GridBot>, StoreError> {
        let mut rows = self.rows();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl BotTransaction for MemoryTx {
    async fn fetch_by_grid_ids(&mut self, grid_ids: &[String]) -> Result<Vec<GridBot>, StoreError> {
        Ok(self
            .working
            .iter()
            .filter(|r| grid_ids.contains(&r.grid_id))
            .cloned()
            .collect())
    }

    async fn update(&mut self, bot: &GridBot) -> Result<(), StoreError> {
        let row = self
            .working
            .iter_mut()
            .find(|r| r.id == bot.id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;

        let floor = row.last_synced_at + Duration::microseconds(1);
        let created_at = row.created_at;
        *row = bot.clone();
        row.created_at = created_at;
        row.last_synced_at = bot.last_synced_at.max(floor);
        row.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn insert(&mut self, bot: &NormalizedBot) -> Result<(), StoreError> {
        let id = self.inner.lock().unwrap().allocate_id();
        self.working.push(GridBot::from_candidate(id, bot.clone(), Utc::now()));
        self.inserted.push(id);
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if std::mem::take(&mut inner.fail_next_commit) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        if let Some(bot) = inner.race_on_commit.take() {
            let id = inner.allocate_id();
            inner.rows.push(GridBot::from_candidate(id, bot, Utc::now()));
        }

        let committed: HashSet<&str> = inner.rows.iter().map(|r| r.grid_id.as_str()).collect();
        for row in self.working.iter().filter(|r| self.inserted.contains(&r.id)) {
            if committed.contains(row.grid_id.as_str()) {
                return Err(StoreError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint \"idx_bots_grid_id\" ({})",
                    row.grid_id
                )));
            }
        }

        inner.rows = self.working;
        inner.commits += 1;
        Ok(())
    }
}

enum Reply {
    Envelope(Value),
    Http(u16, String),
    Timeout,
}

/// Bot source that answers every fetch the same way
pub struct FakeSource {
    reply: Reply,
    api_ok: bool,
    requests: Mutex<Vec<ListBotsRequest>>,
}

impl FakeSource {
    pub fn envelope(envelope: Value) -> Self {
        Self {
            reply: Reply::Envelope(envelope),
            api_ok: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn http_error(status: u16, body: &str) -> Self {
        Self {
            reply: Reply::Http(status, body.to_string()),
            api_ok: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn timeout() -> Self {
        Self {
            reply: Reply::Timeout,
            api_ok: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ListBotsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotSource for FakeSource {
    async fn fetch_bots(&self, request: &ListBotsRequest) -> bybit_client::Result<Value> {
        self.requests.lock().unwrap().push(*request);
        match &self.reply {
            Reply::Envelope(envelope) => Ok(envelope.clone()),
            Reply::Http(status, body) => Err(BybitError::Http {
                status: *status,
                body: body.clone(),
            }),
            Reply::Timeout => Err(BybitError::Timeout { millis: 30_000 }),
        }
    }

    async fn check_api_status(&self) -> bybit_client::Result<bool> {
        Ok(self.api_ok)
    }

    async fn health(&self) -> SourceHealth {
        SourceHealth {
            source: "fake".to_string(),
            is_healthy: self.api_ok,
            last_success: None,
            last_error: None,
            success_rate: 1.0,
            last_latency_ms: 0,
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// A list-style envelope around `entries`
pub fn list_envelope(entries: Vec<Value>) -> Value {
    json!({"retCode": 0, "retMsg": "OK", "result": {"list": entries}})
}

/// A minimal well-formed entry
pub fn entry(grid_id: &str) -> Value {
    json!({
        "gridId": grid_id,
        "symbol": "BTCUSDT",
        "status": "RUNNING",
        "markPrice": "50000",
        "totalInvestment": "1000",
        "leverage": "5"
    })
}
