//! Reconciliation: merge a batch of candidates into the store under one transaction.
//!
//! Planning is pure: [`plan`] takes the rows already stored for the batch's grid ids
//! and decides, in input order, which candidates become updates and which become
//! inserts. [`Reconciler`] wraps that plan in a transaction and applies it.

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::db::{BotStore, BotTransaction, StoreError};
use crate::models::{GridBot, NormalizedBot};

pub const MIN_LEVERAGE: i32 = 1;
pub const MAX_LEVERAGE: i32 = 100;

/// Why a single candidate was kept out of the transaction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("grid id is blank")]
    BlankGridId,

    #[error("`{0}` is not a finite number")]
    NonFinite(&'static str),

    #[error("leverage {0} outside 1..=100")]
    LeverageOutOfRange(i32),

    #[error("total investment {0} is negative")]
    NegativeInvestment(f64),
}

/// Fatal reconciliation failure; nothing from the batch was persisted
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("reconciliation failed: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Candidates rejected by staging
    pub skipped: usize,
    /// Candidates that overwrote an earlier candidate with the same grid id
    pub duplicates: usize,
}

impl ReconcileOutcome {
    /// Distinct rows written
    pub fn synced(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Insert(NormalizedBot),
    Update(GridBot),
}

impl Step {
    fn grid_id(&self) -> &str {
        match self {
            Step::Insert(bot) => &bot.grid_id,
            Step::Update(bot) => &bot.grid_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// One step per distinct grid id, in order of first sighting
    pub steps: Vec<Step>,
    pub skipped: usize,
    pub duplicates: usize,
}

impl ReconcilePlan {
    pub fn inserts(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Insert(_))).count()
    }

    pub fn updates(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Update(_))).count()
    }
}

/// Check that a candidate can be written without tripping a column constraint
pub fn stage(candidate: &NormalizedBot) -> Result<(), StageError> {
    if candidate.grid_id.trim().is_empty() {
        return Err(StageError::BlankGridId);
    }

    let floats = [
        ("mark_price", candidate.mark_price),
        ("total_investment", candidate.total_investment),
        ("pnl", candidate.pnl),
        ("pnl_percentage", candidate.pnl_percentage),
        ("min_price", candidate.min_price),
        ("max_price", candidate.max_price),
        ("liq_price", candidate.liq_price),
        ("total_apr", candidate.total_apr),
        ("entry_price", candidate.entry_price),
        ("current_price", candidate.current_price),
    ];
    if let Some((name, _)) = floats.iter().find(|(_, v)| !v.is_finite()) {
        return Err(StageError::NonFinite(*name));
    }

    if !(MIN_LEVERAGE..=MAX_LEVERAGE).contains(&candidate.leverage) {
        return Err(StageError::LeverageOutOfRange(candidate.leverage));
    }
    if candidate.total_investment < 0.0 {
        return Err(StageError::NegativeInvestment(candidate.total_investment));
    }

    Ok(())
}

/// Decide what to write for a batch.
///
/// `existing` must hold at most one row per grid id; anything else means the
/// store's uniqueness guarantee is broken and the batch is refused.
pub fn plan(existing: &[GridBot], candidates: Vec<NormalizedBot>) -> Result<ReconcilePlan, ReconcileError> {
    let mut stored: HashMap<&str, &GridBot> = HashMap::with_capacity(existing.len());
    for row in existing {
        if stored.insert(row.grid_id.as_str(), row).is_some() {
            return Err(ReconcileError::Internal(format!(
                "more than one stored row for grid id {}",
                row.grid_id
            )));
        }
    }

    let mut plan = ReconcilePlan::default();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        if let Err(err) = stage(&candidate) {
            warn!(grid_id = %candidate.grid_id, error = %err, "Skipping candidate that failed staging");
            plan.skipped += 1;
            continue;
        }

        // Later candidates overwrite earlier ones in place
        if let Some(&slot) = slots.get(&candidate.grid_id) {
            warn!(grid_id = %candidate.grid_id, "Duplicate grid id in batch, last one wins");
            plan.duplicates += 1;
            match &mut plan.steps[slot] {
                Step::Insert(staged) => *staged = candidate,
                Step::Update(row) => row.overwrite_from(candidate),
            }
            continue;
        }

        let step = match stored.get(candidate.grid_id.as_str()) {
            Some(row) => {
                let mut row = (*row).clone();
                row.overwrite_from(candidate);
                Step::Update(row)
            }
            None => Step::Insert(candidate),
        };
        slots.insert(step.grid_id().to_string(), plan.steps.len());
        plan.steps.push(step);
    }

    Ok(plan)
}

/// Applies batches to a store, one transaction per batch
pub struct Reconciler<S> {
    store: S,
}

impl<S: BotStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Merge `candidates` into the store.
    ///
    /// On any error the transaction is dropped before commit, so none of the
    /// batch's writes survive.
    pub async fn reconcile(&self, candidates: Vec<NormalizedBot>) -> Result<ReconcileOutcome, ReconcileError> {
        if candidates.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        let mut grid_ids: Vec<String> = candidates.iter().map(|c| c.grid_id.clone()).collect();
        grid_ids.sort_unstable();
        grid_ids.dedup();

        let mut tx = self.store.begin().await.map_err(log_store_error)?;
        let existing = tx.fetch_by_grid_ids(&grid_ids).await.map_err(log_store_error)?;
        let plan = plan(&existing, candidates)?;

        let outcome = ReconcileOutcome {
            inserted: plan.inserts(),
            updated: plan.updates(),
            skipped: plan.skipped,
            duplicates: plan.duplicates,
        };

        for step in &plan.steps {
            let applied = match step {
                Step::Insert(bot) => tx.insert(bot).await,
                Step::Update(row) => tx.update(row).await,
            };
            applied.map_err(log_store_error)?;
        }

        tx.commit().await.map_err(log_store_error)?;

        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            duplicates = outcome.duplicates,
            "Reconciliation committed"
        );
        Ok(outcome)
    }
}

fn log_store_error(err: StoreError) -> ReconcileError {
    error!(code = %err.code(), error = %err, "Reconciliation rolled back");
    ReconcileError::Persistence(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn candidate(grid_id: &str) -> NormalizedBot {
        NormalizedBot {
            grid_id: grid_id.to_string(),
            bot_type: "GRID_FUTURES".to_string(),
            symbol: "BTCUSDT".to_string(),
            status: "RUNNING".to_string(),
            grid_mode: "NEUTRAL".to_string(),
            price_token: "USDT".to_string(),
            grid_type: "ARITHMETIC".to_string(),
            mark_price: 50000.0,
            total_investment: 1000.0,
            pnl: 0.0,
            pnl_percentage: 0.0,
            leverage: 5,
            min_price: 40000.0,
            max_price: 60000.0,
            cell_num: 10,
            liq_price: 0.0,
            arbitrage_num: 0,
            total_apr: 0.0,
            entry_price: 0.0,
            current_price: 50000.0,
            running_duration: 60,
            close_detail: None,
            raw_data: json!({"gridId": grid_id}),
            last_synced_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn stored(id: i64, grid_id: &str) -> GridBot {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        GridBot::from_candidate(id, candidate(grid_id), created)
    }

    #[test]
    fn test_plan_against_empty_store_inserts_everything() {
        let plan = plan(&[], vec![candidate("a"), candidate("b")]).unwrap();
        assert_eq!(plan.inserts(), 2);
        assert_eq!(plan.updates(), 0);
        let ids: Vec<_> = plan.steps.iter().map(Step::grid_id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_plan_updates_keep_identity() {
        let existing = vec![stored(7, "a")];
        let mut fresh = candidate("a");
        fresh.pnl = 42.0;

        let plan = plan(&existing, vec![fresh, candidate("b")]).unwrap();
        assert_eq!(plan.updates(), 1);
        assert_eq!(plan.inserts(), 1);
        match &plan.steps[0] {
            Step::Update(row) => {
                assert_eq!(row.id, 7);
                assert_eq!(row.created_at, existing[0].created_at);
                assert_eq!(row.pnl, 42.0);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_candidates_last_wins() {
        let mut first = candidate("a");
        first.status = "RUNNING".to_string();
        let mut second = candidate("a");
        second.status = "COMPLETED".to_string();

        let plan = plan(&[], vec![first, candidate("b"), second]).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.duplicates, 1);
        match &plan.steps[0] {
            Step::Insert(bot) => assert_eq!(bot.status, "COMPLETED"),
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_of_existing_row_last_wins() {
        let mut first = candidate("a");
        first.pnl = 1.0;
        let mut second = candidate("a");
        second.pnl = 2.0;

        let plan = plan(&[stored(3, "a")], vec![first, second]).unwrap();
        assert_eq!(plan.steps.len(), 1);
        match &plan.steps[0] {
            Step::Update(row) => {
                assert_eq!(row.id, 3);
                assert_eq!(row.pnl, 2.0);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_staging_failures_are_skipped() {
        let mut high = candidate("high");
        high.leverage = 125;
        let mut negative = candidate("neg");
        negative.total_investment = -1.0;
        let mut infinite = candidate("inf");
        infinite.pnl = f64::INFINITY;

        let plan = plan(&[], vec![high, candidate("ok"), negative, infinite]).unwrap();
        assert_eq!(plan.skipped, 3);
        assert_eq!(plan.inserts(), 1);
    }

    #[test]
    fn test_stage_errors() {
        let mut bot = candidate(" ");
        assert_eq!(stage(&bot), Err(StageError::BlankGridId));

        bot.grid_id = "g".to_string();
        bot.leverage = 0;
        assert_eq!(stage(&bot), Err(StageError::LeverageOutOfRange(0)));

        bot.leverage = 100;
        bot.max_price = f64::NAN;
        assert_eq!(stage(&bot), Err(StageError::NonFinite("max_price")));

        bot.max_price = 1.0;
        assert_eq!(stage(&bot), Ok(()));
    }

    #[test]
    fn test_duplicate_stored_rows_refused() {
        let result = plan(&[stored(1, "a"), stored(2, "a")], vec![candidate("a")]);
        assert!(matches!(result, Err(ReconcileError::Internal(_))));
    }

    #[test]
    fn test_outcome_synced_counts_rows() {
        let outcome = ReconcileOutcome { inserted: 2, updated: 3, skipped: 1, duplicates: 4 };
        assert_eq!(outcome.synced(), 5);
    }
}
