//! Persistence context: the pool, the store seam the reconciler writes through,
//! and the Postgres implementation of it.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Transaction};
use std::time::Duration;

use crate::config::Settings;
use crate::models::{GridBot, NormalizedBot};

pub type Db = Pool<Postgres>;

/// SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

pub async fn init_db(settings: &Settings) -> anyhow::Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .acquire_timeout(Duration::from_secs(settings.database_acquire_timeout_secs))
        .connect(&settings.database_url)
        .await?;

    Ok(pool)
}

/// Storage-layer failure; always fatal to the sync that hit it
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Stable code for reports: the SQLSTATE when the server sent one
    pub fn code(&self) -> String {
        match self {
            StoreError::UniqueViolation(_) => UNIQUE_VIOLATION.to_string(),
            StoreError::Database(sqlx::Error::Database(db)) => db
                .code()
                .map(|c| c.into_owned())
                .unwrap_or_else(|| "database".to_string()),
            StoreError::Database(sqlx::Error::PoolTimedOut) => "pool_timeout".to_string(),
            StoreError::Database(_) => "database".to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::UniqueViolation(db.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Where synced bots live
#[async_trait]
pub trait BotStore: Send + Sync {
    type Tx: BotTransaction;

    /// Open the single transaction a sync writes through
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Every persisted bot, ordered by local id
    async fn list_all(&self) -> Result<Vec<GridBot>, StoreError>;

    /// Round-trip to the backing store
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait BotTransaction: Send {
    /// Existing rows for the given grid ids, locked for the rest of the transaction
    async fn fetch_by_grid_ids(&mut self, grid_ids: &[String]) -> Result<Vec<GridBot>, StoreError>;

    /// Overwrite a row in place, keyed by its local id
    async fn update(&mut self, bot: &GridBot) -> Result<(), StoreError>;

    async fn insert(&mut self, bot: &NormalizedBot) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgBotStore {
    db: Db,
}

impl PgBotStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BotStore for PgBotStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let tx = self.db.begin().await?;
        Ok(PgTransaction { tx })
    }

    async fn list_all(&self) -> Result<Vec<GridBot>, StoreError> {
        let bots = sqlx::query_as::<_, GridBot>("SELECT * FROM bots ORDER BY id")
            .fetch_all(&self.db)
            .await?;
        Ok(bots)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl BotTransaction for PgTransaction {
    async fn fetch_by_grid_ids(&mut self, grid_ids: &[String]) -> Result<Vec<GridBot>, StoreError> {
        let bots = sqlx::query_as::<_, GridBot>(
            "SELECT * FROM bots WHERE grid_id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(grid_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(bots)
    }

    async fn update(&mut self, bot: &GridBot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE bots SET
                grid_id = $2, bot_type = $3, symbol = $4, status = $5, grid_mode = $6,
                price_token = $7, grid_type = $8, mark_price = $9, total_investment = $10,
                pnl = $11, pnl_percentage = $12, leverage = $13, min_price = $14,
                max_price = $15, cell_num = $16, liq_price = $17, arbitrage_num = $18,
                total_apr = $19, entry_price = $20, current_price = $21,
                running_duration = $22, close_detail = $23, raw_data = $24,
                last_synced_at = GREATEST($25, last_synced_at + INTERVAL '1 microsecond'),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(bot.id)
        .bind(&bot.grid_id)
        .bind(&bot.bot_type)
        .bind(&bot.symbol)
        .bind(&bot.status)
        .bind(&bot.grid_mode)
        .bind(&bot.price_token)
        .bind(&bot.grid_type)
        .bind(bot.mark_price)
        .bind(bot.total_investment)
        .bind(bot.pnl)
        .bind(bot.pnl_percentage)
        .bind(bot.leverage)
        .bind(bot.min_price)
        .bind(bot.max_price)
        .bind(bot.cell_num)
        .bind(bot.liq_price)
        .bind(bot.arbitrage_num)
        .bind(bot.total_apr)
        .bind(bot.entry_price)
        .bind(bot.current_price)
        .bind(bot.running_duration)
        .bind(&bot.close_detail)
        .bind(&bot.raw_data)
        .bind(bot.last_synced_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert(&mut self, bot: &NormalizedBot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bots (
                grid_id, bot_type, symbol, status, grid_mode, price_token, grid_type,
                mark_price, total_investment, pnl, pnl_percentage, leverage, min_price,
                max_price, cell_num, liq_price, arbitrage_num, total_apr, entry_price,
                current_price, running_duration, close_detail, raw_data, last_synced_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24
            )
            "#,
        )
        .bind(&bot.grid_id)
        .bind(&bot.bot_type)
        .bind(&bot.symbol)
        .bind(&bot.status)
        .bind(&bot.grid_mode)
        .bind(&bot.price_token)
        .bind(&bot.grid_type)
        .bind(bot.mark_price)
        .bind(bot.total_investment)
        .bind(bot.pnl)
        .bind(bot.pnl_percentage)
        .bind(bot.leverage)
        .bind(bot.min_price)
        .bind(bot.max_price)
        .bind(bot.cell_num)
        .bind(bot.liq_price)
        .bind(bot.arbitrage_num)
        .bind(bot.total_apr)
        .bind(bot.entry_price)
        .bind(bot.current_price)
        .bind(bot.running_duration)
        .bind(&bot.close_detail)
        .bind(&bot.raw_data)
        .bind(bot.last_synced_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
