//! Order lifecycle verifier
//!
//! Legal flow: NEW -> PARTIALLY_FILLED* -> FILLED | CANCELLED, with REJECTED
//! terminal before acceptance. Legality is judged purely from the observed
//! event sequence per order_id, in arrival order. Structural defects (an
//! event missing its order_id or user_id) are reported in their own
//! category, separate from lifecycle defects.

use rustc_hash::FxHashMap;

use super::report::{CheckReport, VerifyConfig, VerifyReport};
use crate::models::order_event::{OrderEvent, OrderEventType};

#[derive(Debug, Default)]
struct LifecycleState {
    filled: bool,
    cancelled: bool,
}

pub fn verify_order_events(events: &[OrderEvent], config: &VerifyConfig) -> VerifyReport {
    let mut structure = CheckReport::new("structure", config.max_violations);
    let mut lifecycle = CheckReport::new("lifecycle", config.max_violations);

    let mut states: FxHashMap<&str, LifecycleState> = FxHashMap::default();

    for (i, e) in events.iter().enumerate() {
        if e.order_id.is_empty() || e.user_id.is_empty() {
            structure.violations.push(format!(
                "event {}: missing {} ({})",
                i,
                if e.order_id.is_empty() { "order_id" } else { "user_id" },
                e.event_type
            ));
            continue;
        }

        let state = states.entry(e.order_id.as_str()).or_default();
        match e.event_type {
            OrderEventType::Filled | OrderEventType::PartialFilled => {
                if state.cancelled {
                    lifecycle.violations.push(format!(
                        "order {}: {} after cancellation",
                        e.order_id, e.event_type
                    ));
                } else if e.event_type == OrderEventType::Filled && state.filled {
                    lifecycle
                        .violations
                        .push(format!("order {}: filled more than once", e.order_id));
                }
                if e.event_type == OrderEventType::Filled {
                    state.filled = true;
                }
            }
            OrderEventType::Cancelled => {
                if state.filled {
                    lifecycle
                        .violations
                        .push(format!("order {}: cancelled after fill", e.order_id));
                } else if state.cancelled {
                    lifecycle
                        .violations
                        .push(format!("order {}: cancelled more than once", e.order_id));
                }
                state.cancelled = true;
            }
            OrderEventType::Accepted | OrderEventType::Rejected => {}
        }
    }

    VerifyReport { checks: vec![structure, lifecycle] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order_event::{OrderStatus, Side};

    fn event(event_type: OrderEventType, order_id: &str, user_id: &str) -> OrderEvent {
        OrderEvent {
            event_type,
            order_id: order_id.to_string(),
            user_id: user_id.to_string(),
            side: Side::Buy,
            price: 100,
            qty: 10,
            filled_qty: 0,
            status: OrderStatus::New,
        }
    }

    fn lifecycle_violations(events: &[OrderEvent]) -> u64 {
        let report = verify_order_events(events, &VerifyConfig::default());
        report.checks.iter().find(|c| c.name == "lifecycle").unwrap().violations.total()
    }

    #[test]
    fn test_legal_partial_fills_then_fill() {
        let events = vec![
            event(OrderEventType::Accepted, "1", "u1"),
            event(OrderEventType::PartialFilled, "1", "u1"),
            event(OrderEventType::PartialFilled, "1", "u1"),
            event(OrderEventType::Filled, "1", "u1"),
        ];
        assert_eq!(lifecycle_violations(&events), 0);
    }

    #[test]
    fn test_fill_after_cancel_illegal() {
        let events = vec![
            event(OrderEventType::Accepted, "1", "u1"),
            event(OrderEventType::Cancelled, "1", "u1"),
            event(OrderEventType::Filled, "1", "u1"),
        ];
        let report = verify_order_events(&events, &VerifyConfig::default());
        let check = report.checks.iter().find(|c| c.name == "lifecycle").unwrap();
        assert_eq!(check.violations.total(), 1);
        assert!(check.violations.sample()[0].contains("after cancellation"));
    }

    #[test]
    fn test_cancel_after_fill_illegal() {
        let events = vec![
            event(OrderEventType::Accepted, "1", "u1"),
            event(OrderEventType::Filled, "1", "u1"),
            event(OrderEventType::Cancelled, "1", "u1"),
        ];
        assert_eq!(lifecycle_violations(&events), 1);
    }

    #[test]
    fn test_terminal_states_at_most_once() {
        let double_fill = vec![
            event(OrderEventType::Filled, "1", "u1"),
            event(OrderEventType::Filled, "1", "u1"),
        ];
        assert_eq!(lifecycle_violations(&double_fill), 1);

        let double_cancel = vec![
            event(OrderEventType::Cancelled, "2", "u1"),
            event(OrderEventType::Cancelled, "2", "u1"),
        ];
        assert_eq!(lifecycle_violations(&double_cancel), 1);
    }

    #[test]
    fn test_orders_tracked_independently() {
        let events = vec![
            event(OrderEventType::Cancelled, "1", "u1"),
            event(OrderEventType::Filled, "2", "u2"),
        ];
        assert_eq!(lifecycle_violations(&events), 0);
    }

    #[test]
    fn test_missing_ids_are_structural_not_lifecycle() {
        let events = vec![
            event(OrderEventType::Accepted, "", "u1"),
            event(OrderEventType::Filled, "1", ""),
        ];
        let report = verify_order_events(&events, &VerifyConfig::default());
        let structure = report.checks.iter().find(|c| c.name == "structure").unwrap();
        let lifecycle = report.checks.iter().find(|c| c.name == "lifecycle").unwrap();
        assert_eq!(structure.violations.total(), 2);
        assert_eq!(lifecycle.violations.total(), 0);
        assert!(structure.violations.sample()[0].contains("order_id"));
        assert!(structure.violations.sample()[1].contains("user_id"));
    }
}
