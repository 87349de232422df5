//! Symmetric-difference join and field-level comparison
//!
//! Field comparison is driven by a declarative `{local_field ->
//! external_field}` map per entity, because the two sides may name the same
//! logical column differently (the pipeline's `version` is the store's
//! `lock_version`). A field absent on either side is skipped, not a
//! mismatch. Both snapshots are already normalized to canonical enums
//! before they reach this module.

use std::collections::BTreeMap;

use super::report::ReconcileReport;
use crate::models::order_event::OrderStatus;
use crate::models::snapshot::{BalanceKey, BalanceRecord, FieldValue, OrderRecord, TradeRecord};

pub const BALANCE_FIELD_MAP: &[(&str, &str)] =
    &[("avail", "avail"), ("frozen", "frozen"), ("version", "lock_version")];

pub const ORDER_FIELD_MAP: &[(&str, &str)] = &[
    ("user_id", "user_id"),
    ("side", "side"),
    ("price", "price"),
    ("qty", "qty"),
    ("filled_qty", "filled_qty"),
    ("status", "status"),
];

pub const TRADE_FIELD_MAP: &[(&str, &str)] = &[
    ("maker_user", "maker_user"),
    ("taker_user", "taker_user"),
    ("price", "price"),
    ("qty", "qty"),
];

trait FieldAccess {
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl FieldAccess for BalanceRecord {
    fn field(&self, name: &str) -> Option<FieldValue> {
        BalanceRecord::field(self, name)
    }
}

impl FieldAccess for OrderRecord {
    fn field(&self, name: &str) -> Option<FieldValue> {
        OrderRecord::field(self, name)
    }
}

impl FieldAccess for TradeRecord {
    fn field(&self, name: &str) -> Option<FieldValue> {
        TradeRecord::field(self, name)
    }
}

fn reconcile_maps<K, V, F, T>(
    entity: &'static str,
    local: &BTreeMap<K, V>,
    external: &BTreeMap<K, V>,
    field_map: &[(&str, &str)],
    max_diff_lines: usize,
    fmt_key: F,
    tolerated: T,
) -> ReconcileReport
where
    K: Ord,
    V: FieldAccess,
    F: Fn(&K) -> String,
    T: Fn(&str, &V, &V) -> bool,
{
    let mut report = ReconcileReport::new(entity, max_diff_lines);

    for (key, local_rec) in local {
        match external.get(key) {
            None => {
                report.missing += 1;
                report.diffs.push(format!("{}: missing from external store", fmt_key(key)));
            }
            Some(external_rec) => {
                let mut field_diffs = Vec::new();
                for (local_field, external_field) in field_map {
                    let lv = local_rec.field(local_field);
                    let ev = external_rec.field(external_field);
                    if let (Some(lv), Some(ev)) = (lv, ev) {
                        if lv != ev && !tolerated(local_field, local_rec, external_rec) {
                            field_diffs.push(format!(
                                "{}: local={} external={}",
                                local_field, lv, ev
                            ));
                        }
                    }
                }
                if field_diffs.is_empty() {
                    report.matched += 1;
                } else {
                    report.mismatched += 1;
                    report
                        .diffs
                        .push(format!("{}: {}", fmt_key(key), field_diffs.join("; ")));
                }
            }
        }
    }

    for key in external.keys() {
        if !local.contains_key(key) {
            report.extra += 1;
            report.diffs.push(format!("{}: extra in external store", fmt_key(key)));
        }
    }

    report
}

pub fn reconcile_balances(
    local: &BTreeMap<BalanceKey, BalanceRecord>,
    external: &BTreeMap<BalanceKey, BalanceRecord>,
    max_diff_lines: usize,
) -> ReconcileReport {
    reconcile_maps(
        "balances",
        local,
        external,
        BALANCE_FIELD_MAP,
        max_diff_lines,
        |(user_id, asset_id)| format!("user={} asset={}", user_id, asset_id),
        |_, _, _| false,
    )
}

/// Two conventions exist for a resting partially-filled order: some
/// producers keep status NEW, others advance it to PARTIALLY_FILLED. The
/// pair is tolerated when the fill columns agree it really is mid-fill.
fn resting_partial_fill(field: &str, local: &OrderRecord, external: &OrderRecord) -> bool {
    field == "status"
        && matches!(
            (local.status, external.status),
            (OrderStatus::New, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::New)
        )
        && local.filled_qty > 0
        && local.filled_qty < local.qty
}

pub fn reconcile_orders(
    local: &BTreeMap<String, OrderRecord>,
    external: &BTreeMap<String, OrderRecord>,
    max_diff_lines: usize,
) -> ReconcileReport {
    reconcile_maps(
        "orders",
        local,
        external,
        ORDER_FIELD_MAP,
        max_diff_lines,
        |order_id| format!("order={}", order_id),
        resting_partial_fill,
    )
}

pub fn reconcile_trades(
    local: &BTreeMap<String, TradeRecord>,
    external: &BTreeMap<String, TradeRecord>,
    max_diff_lines: usize,
) -> ReconcileReport {
    reconcile_maps(
        "trades",
        local,
        external,
        TRADE_FIELD_MAP,
        max_diff_lines,
        |trade_id| format!("trade={}", trade_id),
        |_, _, _| false,
    )
}
