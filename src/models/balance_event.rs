//! Balance mutation events
//!
//! One event per fund mutation, produced by the matching/settlement engine.
//! Two independent version counters run per (user_id, asset_id): lock/unlock/
//! deposit events carry the lock_version counter, settle events carry the
//! settle_version counter.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::CsvLoad;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceEventType {
    /// Funds reserved against a pending order (avail -> frozen)
    Lock,
    /// Reservation released (frozen -> avail)
    Unlock,
    /// Trade-triggered transfer between counterparties
    Settle,
    /// External funds credited
    Deposit,
}

impl std::fmt::Display for BalanceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BalanceEventType::Lock => "lock",
            BalanceEventType::Unlock => "unlock",
            BalanceEventType::Settle => "settle",
            BalanceEventType::Deposit => "deposit",
        };
        write!(f, "{}", s)
    }
}

/// What caused a mutation. Deposits carry no source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Order,
    Trade,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Order => write!(f, "order"),
            SourceType::Trade => write!(f, "trade"),
        }
    }
}

/// CSV schema:
/// `event_type, user_id, asset_id, source_type, source_id, version, delta,
/// avail_after, frozen_after`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub event_type: BalanceEventType,
    pub user_id: u64,
    pub asset_id: u32,
    /// Empty column for deposits
    #[serde(default)]
    pub source_type: Option<SourceType>,
    /// The order_id or trade_id behind the mutation
    #[serde(default)]
    pub source_id: Option<u64>,
    /// lock_version or settle_version depending on event_type
    pub version: i64,
    /// Signed change in atomic units
    pub delta: i64,
    pub avail_after: i64,
    pub frozen_after: i64,
}

impl BalanceEvent {
    /// lock/unlock/deposit advance the lock_version counter
    pub fn is_lock_versioned(&self) -> bool {
        matches!(
            self.event_type,
            BalanceEventType::Lock | BalanceEventType::Unlock | BalanceEventType::Deposit
        )
    }
}

/// Canonical ordering for cross-run comparison. The producer interleaves
/// events non-deterministically, so row position carries no meaning.
pub fn sort_canonical(events: &mut [BalanceEvent]) {
    events.sort_by_key(|e| (e.event_type, e.source_id, e.user_id, e.asset_id));
}

pub fn load_balance_events(path: &Path) -> anyhow::Result<CsvLoad<BalanceEvent>> {
    super::read_csv(path)
}
