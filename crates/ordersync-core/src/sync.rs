//! Sync bookkeeping: per-line outcomes, run statistics and the inventory
//! deduction decision.
//!
//! Pure logic only; the I/O-driving orchestrator lives in [`crate::pipeline`].

use serde::{Deserialize, Serialize};

use crate::models::{OrderStatus, UpsertOutcome};

/// Outcome of processing a single order line during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Line persisted (inserted or updated).
    Synced,
    /// Line could not be persisted; the run continued.
    Skipped,
}

/// Counters for one sync run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub synced: usize,
    pub skipped: usize,
    pub stock_deducted: usize,
    pub customers_matched: usize,
}

impl SyncStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a line outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: LineOutcome) {
        match outcome {
            LineOutcome::Synced => self.synced += 1,
            LineOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn record_deduction(&mut self) {
        self.stock_deducted += 1;
    }

    pub fn record_customer_match(&mut self) {
        self.customers_matched += 1;
    }
}

/// Summary of a finished run, serialized as the `data` object of the
/// trigger response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub orders_fetched: usize,
    pub orders_synced: usize,
    pub orders_skipped: usize,
    pub stock_deducted: usize,
    pub customers_matched: usize,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn new(orders_fetched: usize, stats: &SyncStats, duration_ms: u64) -> Self {
        Self {
            orders_fetched,
            orders_synced: stats.synced,
            orders_skipped: stats.skipped,
            stock_deducted: stats.stock_deducted,
            customers_matched: stats.customers_matched,
            duration_ms,
        }
    }

    /// Report of a run that found nothing to sync.
    pub fn empty(duration_ms: u64) -> Self {
        Self::new(0, &SyncStats::default(), duration_ms)
    }

    /// `success`, `partial` or `empty`, as recorded in the sync log.
    pub fn status_label(&self) -> &'static str {
        if self.orders_fetched == 0 {
            "empty"
        } else if self.orders_skipped > 0 {
            "partial"
        } else {
            "success"
        }
    }
}

/// When a persisted line is allowed to decrement stock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionPolicy {
    /// Only when the line enters a deduct-eligible status: it was inserted
    /// with one, or its stored status was not eligible before this upsert.
    #[default]
    OnTransition,
    /// Every successful upsert of a line in a deduct-eligible status.
    /// Re-syncing an unchanged paid line deducts again.
    OnEveryUpsert,
}

/// Result of the deduction eligibility check for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionDecision {
    pub deduct: bool,
    /// Human-readable reason for the decision
    pub reason: &'static str,
}

/// Decides whether an upserted line should decrement inventory.
///
/// # Arguments
/// * `policy` - Active deduction policy
/// * `outcome` - What the store reported for this upsert
/// * `status` - The status just written
pub fn deduction_decision(
    policy: DeductionPolicy,
    outcome: &UpsertOutcome,
    status: &OrderStatus,
) -> DeductionDecision {
    if !status.is_deduct_eligible() {
        return DeductionDecision {
            deduct: false,
            reason: "status not deduct-eligible",
        };
    }

    match (policy, outcome) {
        (DeductionPolicy::OnEveryUpsert, _) => DeductionDecision {
            deduct: true,
            reason: "eligible status upserted",
        },
        (DeductionPolicy::OnTransition, UpsertOutcome::Inserted) => DeductionDecision {
            deduct: true,
            reason: "new line in eligible status",
        },
        (DeductionPolicy::OnTransition, UpsertOutcome::Updated { previous_status })
            if previous_status.is_deduct_eligible() =>
        {
            DeductionDecision {
                deduct: false,
                reason: "already deducted in an earlier sync",
            }
        }
        (DeductionPolicy::OnTransition, UpsertOutcome::Updated { .. }) => DeductionDecision {
            deduct: true,
            reason: "transitioned into eligible status",
        },
    }
}

/// Stock after removing `quantity`, clamped at zero.
///
/// # Examples
///
/// ```
/// use ordersync_core::sync::deducted_stock;
///
/// assert_eq!(deducted_stock(10, 3), 7);
/// assert_eq!(deducted_stock(2, 5), 0);
/// ```
pub fn deducted_stock(current_stock: i64, quantity: i64) -> i64 {
    (current_stock - quantity).max(0)
}
