use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A grid bot as extracted from one brokerage entry, before it touches the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedBot {
    /// Brokerage-assigned identity, stable across syncs
    pub grid_id: String,
    pub bot_type: String,
    pub symbol: String,
    pub status: String,
    pub grid_mode: String,
    pub price_token: String,
    pub grid_type: String,

    pub mark_price: f64,
    pub total_investment: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub leverage: i32,
    pub min_price: f64,
    pub max_price: f64,
    pub cell_num: i32,
    pub liq_price: f64,
    pub arbitrage_num: i32,
    pub total_apr: f64,
    pub entry_price: f64,
    pub current_price: f64,
    /// Seconds
    pub running_duration: i64,

    pub close_detail: Option<serde_json::Value>,

    /// Verbatim copy of the originating entry
    pub raw_data: serde_json::Value,
    pub last_synced_at: DateTime<Utc>,
}

/// Persisted bot row
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct GridBot {
    pub id: i64,
    pub grid_id: String,
    pub bot_type: String,
    pub symbol: String,
    pub status: String,
    pub grid_mode: String,
    pub price_token: String,
    pub grid_type: String,

    pub mark_price: f64,
    pub total_investment: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub leverage: i32,
    pub min_price: f64,
    pub max_price: f64,
    pub cell_num: i32,
    pub liq_price: f64,
    pub arbitrage_num: i32,
    pub total_apr: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub running_duration: i64,

    pub close_detail: Option<serde_json::Value>,
    pub raw_data: serde_json::Value,
    pub last_synced_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GridBot {
    /// Overwrite every synced field with the candidate's values.
    ///
    /// `id`, `created_at` and `updated_at` are left alone; the store owns them.
    pub fn overwrite_from(&mut self, candidate: NormalizedBot) {
        self.grid_id = candidate.grid_id;
        self.bot_type = candidate.bot_type;
        self.symbol = candidate.symbol;
        self.status = candidate.status;
        self.grid_mode = candidate.grid_mode;
        self.price_token = candidate.price_token;
        self.grid_type = candidate.grid_type;
        self.mark_price = candidate.mark_price;
        self.total_investment = candidate.total_investment;
        self.pnl = candidate.pnl;
        self.pnl_percentage = candidate.pnl_percentage;
        self.leverage = candidate.leverage;
        self.min_price = candidate.min_price;
        self.max_price = candidate.max_price;
        self.cell_num = candidate.cell_num;
        self.liq_price = candidate.liq_price;
        self.arbitrage_num = candidate.arbitrage_num;
        self.total_apr = candidate.total_apr;
        self.entry_price = candidate.entry_price;
        self.current_price = candidate.current_price;
        self.running_duration = candidate.running_duration;
        self.close_detail = candidate.close_detail;
        self.raw_data = candidate.raw_data;
        self.last_synced_at = candidate.last_synced_at;
    }

    /// Materialise a fresh row from a candidate (used by stores that assign ids themselves)
    pub fn from_candidate(id: i64, candidate: NormalizedBot, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            grid_id: candidate.grid_id,
            bot_type: candidate.bot_type,
            symbol: candidate.symbol,
            status: candidate.status,
            grid_mode: candidate.grid_mode,
            price_token: candidate.price_token,
            grid_type: candidate.grid_type,
            mark_price: candidate.mark_price,
            total_investment: candidate.total_investment,
            pnl: candidate.pnl,
            pnl_percentage: candidate.pnl_percentage,
            leverage: candidate.leverage,
            min_price: candidate.min_price,
            max_price: candidate.max_price,
            cell_num: candidate.cell_num,
            liq_price: candidate.liq_price,
            arbitrage_num: candidate.arbitrage_num,
            total_apr: candidate.total_apr,
            entry_price: candidate.entry_price,
            current_price: candidate.current_price,
            running_duration: candidate.running_duration,
            close_detail: candidate.close_detail,
            raw_data: candidate.raw_data,
            last_synced_at: candidate.last_synced_at,
            created_at,
            updated_at: None,
        }
    }
}
