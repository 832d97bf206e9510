//! Field extraction: one untrusted brokerage entry in, one `NormalizedBot` out.
//!
//! Every logical field is resolved through [`Field::candidates`], a fixed
//! priority list of key spellings. Lookups search the nested grid objects
//! first (where the futures-grid payload keeps its data) and then the entry
//! root. The first present, non-null value wins.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::NormalizedBot;

/// Sub-objects that may hold the grid payload, in priority order
const NESTED_SCOPES: &[&str] = &["future_grid", "futureGrid", "grid"];

/// Per-record extraction failure; never fatal to a batch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("entry is not a JSON object")]
    NotAnObject,

    #[error("required field `{0}` is missing or blank")]
    MissingField(&'static str),

    #[error("field `{field}` holds a non-numeric value: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Logical fields of a normalized bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    GridId,
    BotType,
    Symbol,
    Status,
    GridMode,
    PriceToken,
    GridType,
    MarkPrice,
    TotalInvestment,
    Pnl,
    PnlPercentage,
    Leverage,
    MinPrice,
    MaxPrice,
    CellNum,
    LiqPrice,
    ArbitrageNum,
    TotalApr,
    EntryPrice,
    CurrentPrice,
    RunningDuration,
    CloseDetail,
}

impl Field {
    /// Candidate keys for this field, tried in order
    pub const fn candidates(self) -> &'static [&'static str] {
        match self {
            Field::GridId => &["gridId", "grid_id"],
            Field::BotType => &["type", "botType", "bot_type"],
            Field::Symbol => &["symbol"],
            Field::Status => &["status"],
            Field::GridMode => &["gridMode", "grid_mode"],
            Field::PriceToken => &["priceToken", "price_token"],
            Field::GridType => &["gridType", "grid_type"],
            Field::MarkPrice => &["markPrice", "mark_price"],
            Field::TotalInvestment => &["totalInvestment", "total_investment"],
            Field::Pnl => &["pnl"],
            // the futures payload abbreviates this one
            Field::PnlPercentage => &["pnlPer", "pnl_per", "pnlPercentage", "pnl_percentage"],
            Field::Leverage => &["leverage"],
            Field::MinPrice => &["minPrice", "min_price"],
            Field::MaxPrice => &["maxPrice", "max_price"],
            Field::CellNum => &["cellNum", "cell_num"],
            Field::LiqPrice => &["liqPrice", "liq_price"],
            Field::ArbitrageNum => &["arbitrageNum", "arbitrage_num"],
            Field::TotalApr => &["totalApr", "total_apr"],
            Field::EntryPrice => &["entryPrice", "entry_price"],
            Field::CurrentPrice => &["currentPrice", "current_price"],
            Field::RunningDuration => &["runningDuration", "running_duration"],
            Field::CloseDetail => &["closeDetail", "close_detail"],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Field::GridId => "grid_id",
            Field::BotType => "bot_type",
            Field::Symbol => "symbol",
            Field::Status => "status",
            Field::GridMode => "grid_mode",
            Field::PriceToken => "price_token",
            Field::GridType => "grid_type",
            Field::MarkPrice => "mark_price",
            Field::TotalInvestment => "total_investment",
            Field::Pnl => "pnl",
            Field::PnlPercentage => "pnl_percentage",
            Field::Leverage => "leverage",
            Field::MinPrice => "min_price",
            Field::MaxPrice => "max_price",
            Field::CellNum => "cell_num",
            Field::LiqPrice => "liq_price",
            Field::ArbitrageNum => "arbitrage_num",
            Field::TotalApr => "total_apr",
            Field::EntryPrice => "entry_price",
            Field::CurrentPrice => "current_price",
            Field::RunningDuration => "running_duration",
            Field::CloseDetail => "close_detail",
        }
    }
}

/// Extract a bot from one raw entry, stamped with the current time
pub fn extract(raw: &Value) -> Result<NormalizedBot, ExtractError> {
    extract_at(raw, Utc::now())
}

/// Extract a bot from one raw entry with an explicit sync timestamp
pub fn extract_at(raw: &Value, synced_at: DateTime<Utc>) -> Result<NormalizedBot, ExtractError> {
    let entry = Entry::new(raw)?;

    Ok(NormalizedBot {
        grid_id: entry.required_text(Field::GridId)?,
        bot_type: entry.text(Field::BotType),
        symbol: entry.required_text(Field::Symbol)?,
        status: entry.text(Field::Status),
        grid_mode: entry.text(Field::GridMode),
        price_token: entry.text(Field::PriceToken),
        grid_type: entry.text(Field::GridType),

        mark_price: entry.float(Field::MarkPrice, 0.0)?,
        total_investment: entry.float(Field::TotalInvestment, 0.0)?,
        pnl: entry.float(Field::Pnl, 0.0)?,
        pnl_percentage: entry.float(Field::PnlPercentage, 0.0)?,
        leverage: entry.integer(Field::Leverage, 1)?,
        min_price: entry.float(Field::MinPrice, 0.0)?,
        max_price: entry.float(Field::MaxPrice, 0.0)?,
        cell_num: entry.integer(Field::CellNum, 0)?,
        liq_price: entry.float(Field::LiqPrice, 0.0)?,
        arbitrage_num: entry.integer(Field::ArbitrageNum, 0)?,
        total_apr: entry.float(Field::TotalApr, 0.0)?,
        entry_price: entry.entry_price()?,
        current_price: entry.float(Field::CurrentPrice, 0.0)?,
        running_duration: entry.integer(Field::RunningDuration, 0)?,

        close_detail: entry.lookup(Field::CloseDetail).cloned(),
        raw_data: raw.clone(),
        last_synced_at: synced_at,
    })
}

/// Read-only view over one raw entry and its nested grid scopes
struct Entry<'a> {
    scopes: Vec<&'a Map<String, Value>>,
}

impl<'a> Entry<'a> {
    fn new(raw: &'a Value) -> Result<Self, ExtractError> {
        let root = raw.as_object().ok_or(ExtractError::NotAnObject)?;

        let mut scopes: Vec<&Map<String, Value>> = NESTED_SCOPES
            .iter()
            .filter_map(|key| root.get(*key).and_then(Value::as_object))
            .collect();
        scopes.push(root);

        Ok(Self { scopes })
    }

    /// First present, non-null candidate across all scopes
    fn lookup(&self, field: Field) -> Option<&'a Value> {
        self.scopes.iter().find_map(|scope| {
            field
                .candidates()
                .iter()
                .find_map(|key| scope.get(*key).filter(|v| !v.is_null()))
        })
    }

    fn text(&self, field: Field) -> String {
        match self.lookup(field) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    fn required_text(&self, field: Field) -> Result<String, ExtractError> {
        let value = self.text(field);
        if value.is_empty() {
            return Err(ExtractError::MissingField(field.name()));
        }
        Ok(value)
    }

    fn float(&self, field: Field, default: f64) -> Result<f64, ExtractError> {
        match self.lookup(field) {
            None => Ok(default),
            Some(value) => coerce_f64(value)
                .map(|parsed| parsed.unwrap_or(default))
                .ok_or_else(|| invalid(field, value)),
        }
    }

    fn integer<T: TryFrom<i64>>(&self, field: Field, default: T) -> Result<T, ExtractError> {
        let Some(value) = self.lookup(field) else {
            return Ok(default);
        };
        match coerce_i64(value) {
            Some(None) => Ok(default),
            Some(Some(n)) => T::try_from(n).map_err(|_| invalid(field, value)),
            None => Err(invalid(field, value)),
        }
    }

    /// Entry price arrives empty for bots that have not opened a position yet,
    /// so every falsy value reads as zero.
    fn entry_price(&self) -> Result<f64, ExtractError> {
        match self.lookup(Field::EntryPrice) {
            None | Some(Value::Bool(false)) => Ok(0.0),
            Some(value) => self.float(Field::EntryPrice, 0.0).map_err(|_| invalid(Field::EntryPrice, value)),
        }
    }
}

/// `Some(None)` for a blank string, `Some(Some(x))` for a finite number, `None` for garbage
fn coerce_f64(value: &Value) -> Option<Option<f64>> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Some(None),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|x| x.is_finite()).map(Some)
}

/// Integral reading of a value; fractional inputs truncate toward zero
fn coerce_i64(value: &Value) -> Option<Option<i64>> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Some(Some(i));
        }
    }
    if let Value::String(s) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(Some(i));
        }
    }

    match coerce_f64(value)? {
        None => Some(None),
        Some(x) if x >= i64::MIN as f64 && x <= i64::MAX as f64 => Some(Some(x.trunc() as i64)),
        Some(_) => None,
    }
}

fn invalid(field: Field, value: &Value) -> ExtractError {
    ExtractError::InvalidNumber {
        field: field.name(),
        value: value.to_string(),
    }
}
