//! Order lifecycle events and canonical side/status enums
//!
//! Producers disagree on encodings: side and status may arrive as strings
//! ("buy", "PARTIALLY_FILLED") or as small integer codes ("0", "1"). Both
//! are normalized to one canonical enum at ingestion; nothing downstream
//! ever compares raw representations.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::path::Path;

use super::CsvLoad;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    Accepted,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl std::fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderEventType::Accepted => "accepted",
            OrderEventType::PartialFilled => "partial_filled",
            OrderEventType::Filled => "filled",
            OrderEventType::Cancelled => "cancelled",
            OrderEventType::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Canonical side. Integer codes: Buy=0, Sell=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Accepts "buy"/"BUY"/"0" and "sell"/"SELL"/"1"
    pub fn parse(raw: &str) -> Option<Side> {
        match raw.to_ascii_lowercase().as_str() {
            "buy" | "b" | "0" => Some(Side::Buy),
            "sell" | "s" | "1" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Canonical order status. Integer codes: New=0, PartiallyFilled=1,
/// Filled=2, Cancelled=3, Rejected=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrderStatus {
    New = 0,
    PartiallyFilled = 1,
    Filled = 2,
    Cancelled = 3,
    Rejected = 4,
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Option<OrderStatus> {
        match raw.to_ascii_lowercase().as_str() {
            "new" | "0" => Some(OrderStatus::New),
            "partially_filled" | "partial_filled" | "1" => Some(OrderStatus::PartiallyFilled),
            "filled" | "2" => Some(OrderStatus::Filled),
            "cancelled" | "canceled" | "3" => Some(OrderStatus::Cancelled),
            "rejected" | "4" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

impl Serialize for Side {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Side::parse(&raw).ok_or_else(|| de::Error::custom(format!("unknown side: {:?}", raw)))
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OrderStatus::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown order status: {:?}", raw)))
    }
}

/// CSV schema:
/// `event_type, order_id, user_id, side, price, qty, filled_qty, status`
///
/// order_id and user_id stay string-typed so an empty id survives parsing
/// and can be reported as a structural defect instead of a row error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_type: OrderEventType,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    pub side: Side,
    pub price: i64,
    pub qty: i64,
    pub filled_qty: i64,
    pub status: OrderStatus,
}

pub fn load_order_events(path: &Path) -> anyhow::Result<CsvLoad<OrderEvent>> {
    super::read_csv(path)
}
