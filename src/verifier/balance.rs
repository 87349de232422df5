//! Ledger verifier: cross-cutting invariants of the balance event stream
//!
//! Four independent checks: cardinality against external counts, version
//! monotonicity per (user, asset), conservation per trade, and source-type
//! consistency. The producer interleaves events non-deterministically, so
//! every check groups and sorts rather than trusting row position.

use rustc_hash::FxHashMap;

use super::report::{CheckReport, VerifyConfig, VerifyReport};
use crate::models::balance_event::{BalanceEvent, BalanceEventType, SourceType};

/// Independently sourced counts for the cardinality check. A `None` skips
/// the corresponding comparison (no independent source available).
#[derive(Debug, Clone, Copy, Default)]
pub struct CardinalityInputs {
    pub accepted_orders: Option<u64>,
    pub trades: Option<u64>,
}

pub fn verify_balance_events(
    events: &[BalanceEvent],
    counts: &CardinalityInputs,
    config: &VerifyConfig,
) -> VerifyReport {
    VerifyReport {
        checks: vec![
            check_cardinality(events, counts, config),
            check_lock_version_monotonic(events, config),
            check_settle_version_monotonic(events, config),
            check_conservation(events, config),
            check_source_types(events, config),
        ],
    }
}

fn check_cardinality(
    events: &[BalanceEvent],
    counts: &CardinalityInputs,
    config: &VerifyConfig,
) -> CheckReport {
    let mut check = CheckReport::new("cardinality", config.max_violations);

    let lock_count = events
        .iter()
        .filter(|e| e.event_type == BalanceEventType::Lock)
        .count() as u64;
    let settle_count = events
        .iter()
        .filter(|e| e.event_type == BalanceEventType::Settle)
        .count() as u64;

    if let Some(accepted) = counts.accepted_orders {
        if lock_count != accepted {
            check.violations.push(format!(
                "lock events {} != accepted orders {}",
                lock_count, accepted
            ));
        }
    }
    if let Some(trades) = counts.trades {
        let expected = config.settle_events_per_trade * trades;
        if settle_count != expected {
            check.violations.push(format!(
                "settle events {} != {} x {} trades = {}",
                settle_count, config.settle_events_per_trade, trades, expected
            ));
        }
    }
    check
}

/// Collect versions per (user, asset) for events matching `pred`, in a
/// deterministic key order
fn group_versions<F>(events: &[BalanceEvent], pred: F) -> Vec<((u64, u32), Vec<(i64, Option<u64>)>)>
where
    F: Fn(&BalanceEvent) -> bool,
{
    let mut groups: FxHashMap<(u64, u32), Vec<(i64, Option<u64>)>> = FxHashMap::default();
    for e in events.iter().filter(|e| pred(e)) {
        groups
            .entry((e.user_id, e.asset_id))
            .or_default()
            .push((e.version, e.source_id));
    }
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by_key(|(key, _)| *key);
    groups
}

/// lock_version must be strictly increasing per (user, asset). After sorting
/// a group's versions, any duplicate is exactly the non-increase an
/// in-order scan of the producer's sequence would report.
fn check_lock_version_monotonic(events: &[BalanceEvent], config: &VerifyConfig) -> CheckReport {
    let mut check = CheckReport::new("lock_version monotonicity", config.max_violations);

    for ((user_id, asset_id), mut versions) in
        group_versions(events, |e| e.is_lock_versioned())
    {
        versions.sort_by_key(|(v, _)| *v);
        for pair in versions.windows(2) {
            let (prev, cur) = (pair[0].0, pair[1].0);
            if cur <= prev {
                check.violations.push(format!(
                    "user={} asset={}: lock_version did not increase: {} -> {}",
                    user_id, asset_id, prev, cur
                ));
            }
        }
    }
    check
}

/// settle_version is non-decreasing per (user, asset); equal versions are
/// legal only for settle events of the same trade (base and quote leg)
fn check_settle_version_monotonic(events: &[BalanceEvent], config: &VerifyConfig) -> CheckReport {
    let mut check = CheckReport::new("settle_version monotonicity", config.max_violations);

    for ((user_id, asset_id), mut versions) in
        group_versions(events, |e| e.event_type == BalanceEventType::Settle)
    {
        versions.sort_by_key(|(v, _)| *v);
        for pair in versions.windows(2) {
            let ((prev_v, prev_src), (cur_v, cur_src)) = (pair[0], pair[1]);
            if cur_v == prev_v && cur_src != prev_src {
                check.violations.push(format!(
                    "user={} asset={}: settle_version {} shared across trades {:?} and {:?}",
                    user_id, asset_id, cur_v, prev_src, cur_src
                ));
            }
        }
    }
    check
}

/// Money is neither created nor destroyed by a trade: settle deltas per
/// trade_id must sum to zero
fn check_conservation(events: &[BalanceEvent], config: &VerifyConfig) -> CheckReport {
    let mut check = CheckReport::new("conservation", config.max_violations);

    let mut sums: FxHashMap<Option<u64>, i64> = FxHashMap::default();
    for e in events.iter().filter(|e| e.event_type == BalanceEventType::Settle) {
        *sums.entry(e.source_id).or_insert(0) += e.delta;
    }
    let mut sums: Vec<_> = sums.into_iter().collect();
    sums.sort_by_key(|(key, _)| *key);

    for (trade_id, sum) in sums {
        if sum != 0 {
            check.violations.push(format!(
                "trade {:?}: settle deltas sum to {} (expected 0)",
                trade_id, sum
            ));
        }
    }
    check
}

/// lock events are caused by orders, settle events by trades, deposits by
/// nothing; anything else is a hard defect
fn check_source_types(events: &[BalanceEvent], config: &VerifyConfig) -> CheckReport {
    let mut check = CheckReport::new("source-type consistency", config.max_violations);

    for (i, e) in events.iter().enumerate() {
        match e.event_type {
            BalanceEventType::Lock => {
                if e.source_type != Some(SourceType::Order) {
                    check.violations.push(format!(
                        "event {}: lock with source_type {:?} (expected order)",
                        i, e.source_type
                    ));
                }
            }
            BalanceEventType::Settle => {
                if e.source_type != Some(SourceType::Trade) {
                    check.violations.push(format!(
                        "event {}: settle with source_type {:?} (expected trade)",
                        i, e.source_type
                    ));
                }
            }
            BalanceEventType::Deposit => {
                if e.source_type.is_some() {
                    check.violations.push(format!(
                        "event {}: deposit carries source_type {:?}",
                        i, e.source_type
                    ));
                }
            }
            BalanceEventType::Unlock => {}
        }
    }
    check
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(
        event_type: BalanceEventType,
        user_id: u64,
        asset_id: u32,
        source_type: Option<SourceType>,
        source_id: u64,
        version: i64,
        delta: i64,
    ) -> BalanceEvent {
        BalanceEvent {
            event_type,
            user_id,
            asset_id,
            source_type,
            source_id: Some(source_id),
            version,
            delta,
            avail_after: 0,
            frozen_after: 0,
        }
    }

    fn lock(user: u64, version: i64) -> BalanceEvent {
        event(BalanceEventType::Lock, user, 1, Some(SourceType::Order), 100, version, -10)
    }

    fn settle(user: u64, trade: u64, version: i64, delta: i64) -> BalanceEvent {
        event(BalanceEventType::Settle, user, 1, Some(SourceType::Trade), trade, version, delta)
    }

    fn find<'a>(report: &'a VerifyReport, name: &str) -> &'a CheckReport {
        report.checks.iter().find(|c| c.name == name).unwrap()
    }

    #[test]
    fn test_clean_stream_passes() {
        let events = vec![
            lock(1, 1),
            lock(1, 2),
            settle(1, 7, 1, 1000),
            settle(2, 7, 1, -1000),
        ];
        let counts = CardinalityInputs { accepted_orders: Some(2), trades: None };
        let report = verify_balance_events(&events, &counts, &VerifyConfig::default());
        assert!(report.passed(), "{:?}", report);
    }

    #[test]
    fn test_lock_version_repeat_flagged_once() {
        // Versions 1,2,2,3 for one (user, asset): exactly one non-increase
        let events = vec![lock(1, 1), lock(1, 2), lock(1, 2), lock(1, 3)];
        let report =
            verify_balance_events(&events, &CardinalityInputs::default(), &VerifyConfig::default());
        let check = find(&report, "lock_version monotonicity");
        assert_eq!(check.violations.total(), 1);
        assert!(check.violations.sample()[0].contains("2 -> 2"));
    }

    #[test]
    fn test_lock_version_check_is_order_insensitive() {
        let in_order = vec![lock(1, 1), lock(1, 2), lock(1, 2), lock(1, 3)];
        let shuffled = vec![lock(1, 2), lock(1, 3), lock(1, 1), lock(1, 2)];
        let cfg = VerifyConfig::default();
        let counts = CardinalityInputs::default();
        let a = verify_balance_events(&in_order, &counts, &cfg);
        let b = verify_balance_events(&shuffled, &counts, &cfg);
        assert_eq!(
            find(&a, "lock_version monotonicity").violations.total(),
            find(&b, "lock_version monotonicity").violations.total()
        );
    }

    #[test]
    fn test_settle_version_ties_within_trade_ok() {
        // Base and quote leg of one trade may share the settle_version
        let events = vec![settle(1, 7, 5, 1000), settle(1, 7, 5, -1000)];
        let report =
            verify_balance_events(&events, &CardinalityInputs::default(), &VerifyConfig::default());
        assert!(find(&report, "settle_version monotonicity").passed());
    }

    #[test]
    fn test_settle_version_ties_across_trades_flagged() {
        let events = vec![settle(1, 7, 5, 0), settle(1, 8, 5, 0)];
        let report =
            verify_balance_events(&events, &CardinalityInputs::default(), &VerifyConfig::default());
        let check = find(&report, "settle_version monotonicity");
        assert_eq!(check.violations.total(), 1);
    }

    #[test]
    fn test_conservation() {
        // Balanced trade passes, unbalanced is exactly one violation
        let events = vec![
            settle(1, 7, 1, 1000),
            settle(2, 7, 2, -1000),
            settle(1, 8, 3, 1000),
            settle(2, 8, 4, -999),
        ];
        let report =
            verify_balance_events(&events, &CardinalityInputs::default(), &VerifyConfig::default());
        let check = find(&report, "conservation");
        assert_eq!(check.violations.total(), 1);
        assert!(check.violations.sample()[0].contains("sum to 1"));
    }

    #[test]
    fn test_cardinality_settle_multiplier_configurable() {
        let events = vec![
            settle(1, 7, 1, 500),
            settle(1, 7, 1, -500),
            settle(2, 7, 1, 500),
            settle(2, 7, 1, -500),
        ];
        let counts = CardinalityInputs { accepted_orders: None, trades: Some(1) };

        let report = verify_balance_events(&events, &counts, &VerifyConfig::default());
        assert!(find(&report, "cardinality").passed());

        // A fee-leg world would expect 5 settles per trade
        let config = VerifyConfig { settle_events_per_trade: 5, ..VerifyConfig::default() };
        let report = verify_balance_events(&events, &counts, &config);
        assert_eq!(find(&report, "cardinality").violations.total(), 1);
    }

    #[test]
    fn test_source_type_defects() {
        let mut bad_lock = lock(1, 1);
        bad_lock.source_type = Some(SourceType::Trade);
        let mut bad_deposit =
            event(BalanceEventType::Deposit, 1, 1, Some(SourceType::Order), 1, 2, 10);
        bad_deposit.source_type = Some(SourceType::Order);

        let report = verify_balance_events(
            &[bad_lock, bad_deposit],
            &CardinalityInputs::default(),
            &VerifyConfig::default(),
        );
        assert_eq!(find(&report, "source-type consistency").violations.total(), 2);
    }

    #[test]
    fn test_checks_independent() {
        // A conservation failure must not hide a version failure
        let events = vec![lock(1, 3), lock(1, 3), settle(1, 9, 1, 42)];
        let report =
            verify_balance_events(&events, &CardinalityInputs::default(), &VerifyConfig::default());
        assert!(!find(&report, "conservation").passed());
        assert!(!find(&report, "lock_version monotonicity").passed());
        assert!(!report.passed());
    }
}
