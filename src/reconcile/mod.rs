//! Snapshot reconciliation
//!
//! Diffs a locally replayed balance/order/trade snapshot against the
//! downstream store's view, field by field, classifying every key as
//! matched, mismatched, missing (local only) or extra (external only).

pub mod engine;
pub mod report;

pub use engine::{reconcile_balances, reconcile_orders, reconcile_trades};
pub use report::ReconcileReport;
