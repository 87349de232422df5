//! Snapshot records for reconciliation
//!
//! A snapshot is the final balance/order/trade state of one side of a
//! reconciliation: either replayed locally from the event log, or queried
//! from the downstream store. Keys: `(user_id, asset_id)` for balances,
//! `order_id` for orders, `trade_id` for trades.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

use super::balance_event::BalanceEvent;
use super::order_event::{OrderEvent, OrderStatus, Side};

pub type BalanceKey = (u64, u32);

/// A single comparable field value. Comparisons always happen on these
/// canonical values, never on raw producer representations.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Str(String),
    Side(Side),
    Status(OrderStatus),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Str(v) => write!(f, "{}", v),
            FieldValue::Side(v) => write!(f, "{}", v),
            FieldValue::Status(v) => write!(f, "{}", v),
        }
    }
}

/// Balance state for one (user_id, asset_id).
///
/// The local pipeline names its single counter `version`; the downstream
/// store splits it into `lock_version` and `settle_version`. A record keeps
/// whichever columns its source provided; the reconciliation field map
/// decides which local name lines up with which external name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub avail: i64,
    pub frozen: i64,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub lock_version: Option<i64>,
    #[serde(default)]
    pub settle_version: Option<i64>,
}

impl BalanceRecord {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "avail" => Some(FieldValue::Int(self.avail)),
            "frozen" => Some(FieldValue::Int(self.frozen)),
            "version" => self.version.map(FieldValue::Int),
            "lock_version" => self.lock_version.map(FieldValue::Int),
            "settle_version" => self.settle_version.map(FieldValue::Int),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BalanceRow {
    user_id: u64,
    asset_id: u32,
    avail: i64,
    frozen: i64,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    lock_version: Option<i64>,
    #[serde(default)]
    settle_version: Option<i64>,
}

impl BalanceRow {
    fn into_record(self) -> BalanceRecord {
        BalanceRecord {
            avail: self.avail,
            frozen: self.frozen,
            version: self.version,
            lock_version: self.lock_version,
            settle_version: self.settle_version,
        }
    }
}

/// Order state keyed by order_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub user_id: String,
    pub side: Side,
    pub price: i64,
    pub qty: i64,
    pub filled_qty: i64,
    pub status: OrderStatus,
}

impl OrderRecord {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "user_id" => Some(FieldValue::Str(self.user_id.clone())),
            "side" => Some(FieldValue::Side(self.side)),
            "price" => Some(FieldValue::Int(self.price)),
            "qty" => Some(FieldValue::Int(self.qty)),
            "filled_qty" => Some(FieldValue::Int(self.filled_qty)),
            "status" => Some(FieldValue::Status(self.status)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OrderRow {
    order_id: String,
    user_id: String,
    side: Side,
    price: i64,
    qty: i64,
    filled_qty: i64,
    status: OrderStatus,
}

impl OrderRow {
    fn into_record(self) -> OrderRecord {
        OrderRecord {
            user_id: self.user_id,
            side: self.side,
            price: self.price,
            qty: self.qty,
            filled_qty: self.filled_qty,
            status: self.status,
        }
    }
}

/// Maker/taker role of a trade leg. Integer codes: Maker=0, Taker=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TradeRole {
    Maker = 0,
    Taker = 1,
}

impl TradeRole {
    pub fn parse(raw: &str) -> Option<TradeRole> {
        match raw.to_ascii_lowercase().as_str() {
            "maker" | "m" | "0" => Some(TradeRole::Maker),
            "taker" | "t" | "1" => Some(TradeRole::Taker),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeRole::Maker => write!(f, "maker"),
            TradeRole::Taker => write!(f, "taker"),
        }
    }
}

impl Serialize for TradeRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TradeRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TradeRole::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown trade role: {:?}", raw)))
    }
}

/// One CSV row of a trade snapshot; every trade appears as an unordered
/// maker/taker pair of rows sharing (price, qty).
#[derive(Debug, Clone, Deserialize)]
pub struct TradeLegRow {
    pub trade_id: String,
    pub user_id: String,
    pub role: TradeRole,
    pub price: i64,
    pub qty: i64,
}

/// A trade folded from its two legs
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub maker_user: String,
    pub taker_user: String,
    pub price: i64,
    pub qty: i64,
}

impl TradeRecord {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "maker_user" => Some(FieldValue::Str(self.maker_user.clone())),
            "taker_user" => Some(FieldValue::Str(self.taker_user.clone())),
            "price" => Some(FieldValue::Int(self.price)),
            "qty" => Some(FieldValue::Int(self.qty)),
            _ => None,
        }
    }
}

/// A loaded snapshot: keyed records plus per-row/structural defects.
/// Defects are reported, never silently dropped.
#[derive(Debug)]
pub struct SnapshotLoad<K, V> {
    pub map: BTreeMap<K, V>,
    pub defects: Vec<String>,
}

pub fn load_balance_snapshot(path: &Path) -> anyhow::Result<SnapshotLoad<BalanceKey, BalanceRecord>> {
    let load = super::read_csv::<BalanceRow>(path)?;
    let mut map = BTreeMap::new();
    let mut defects = load.row_errors;
    for row in load.rows {
        let key = (row.user_id, row.asset_id);
        if map.insert(key, row.into_record()).is_some() {
            defects.push(format!("duplicate balance key user={} asset={}", key.0, key.1));
        }
    }
    Ok(SnapshotLoad { map, defects })
}

pub fn load_order_snapshot(path: &Path) -> anyhow::Result<SnapshotLoad<String, OrderRecord>> {
    let load = super::read_csv::<OrderRow>(path)?;
    let mut map = BTreeMap::new();
    let mut defects = load.row_errors;
    for row in load.rows {
        let order_id = row.order_id.clone();
        if map.insert(order_id.clone(), row.into_record()).is_some() {
            defects.push(format!("duplicate order key order_id={}", order_id));
        }
    }
    Ok(SnapshotLoad { map, defects })
}

/// Load trade legs and fold each maker/taker pair into one record.
/// A pair with a missing leg, a repeated role, or disagreeing (price, qty)
/// is a structural defect; the trade is dropped from the snapshot.
pub fn load_trade_snapshot(path: &Path) -> anyhow::Result<SnapshotLoad<String, TradeRecord>> {
    let load = super::read_csv::<TradeLegRow>(path)?;
    let mut defects = load.row_errors;

    let mut legs: BTreeMap<String, Vec<TradeLegRow>> = BTreeMap::new();
    for row in load.rows {
        legs.entry(row.trade_id.clone()).or_default().push(row);
    }

    let mut map = BTreeMap::new();
    for (trade_id, legs) in legs {
        match fold_trade_legs(&legs) {
            Ok(record) => {
                map.insert(trade_id, record);
            }
            Err(reason) => defects.push(format!("trade {}: {}", trade_id, reason)),
        }
    }
    Ok(SnapshotLoad { map, defects })
}

fn fold_trade_legs(legs: &[TradeLegRow]) -> Result<TradeRecord, String> {
    if legs.len() != 2 {
        return Err(format!("expected 2 legs, found {}", legs.len()));
    }
    let (a, b) = (&legs[0], &legs[1]);
    if a.role == b.role {
        return Err(format!("both legs carry role {}", a.role));
    }
    if a.price != b.price || a.qty != b.qty {
        return Err(format!(
            "legs disagree: price {} vs {}, qty {} vs {}",
            a.price, b.price, a.qty, b.qty
        ));
    }
    let (maker, taker) = if a.role == TradeRole::Maker { (a, b) } else { (b, a) };
    Ok(TradeRecord {
        maker_user: maker.user_id.clone(),
        taker_user: taker.user_id.clone(),
        price: a.price,
        qty: a.qty,
    })
}

/// Replay a balance event stream to its final balance snapshot.
///
/// avail/frozen come from the last event in stream order; the version
/// columns keep the max seen per counter. The local `version` column mirrors
/// the lock counter, matching what the pipeline exports.
pub fn replay_balance_events(events: &[BalanceEvent]) -> BTreeMap<BalanceKey, BalanceRecord> {
    let mut map: BTreeMap<BalanceKey, BalanceRecord> = BTreeMap::new();
    for e in events {
        let rec = map.entry((e.user_id, e.asset_id)).or_default();
        rec.avail = e.avail_after;
        rec.frozen = e.frozen_after;
        if e.is_lock_versioned() {
            let v = rec.lock_version.map_or(e.version, |cur| cur.max(e.version));
            rec.lock_version = Some(v);
            rec.version = Some(v);
        } else {
            rec.settle_version =
                Some(rec.settle_version.map_or(e.version, |cur| cur.max(e.version)));
        }
    }
    map
}

/// Replay an order event stream to its final order snapshot (last event per
/// order wins). Events with an empty order_id cannot be keyed and are
/// returned as defects.
pub fn replay_order_events(events: &[OrderEvent]) -> SnapshotLoad<String, OrderRecord> {
    let mut map = BTreeMap::new();
    let mut defects = Vec::new();
    for (i, e) in events.iter().enumerate() {
        if e.order_id.is_empty() {
            defects.push(format!("event {}: empty order_id, not replayable", i));
            continue;
        }
        map.insert(
            e.order_id.clone(),
            OrderRecord {
                user_id: e.user_id.clone(),
                side: e.side,
                price: e.price,
                qty: e.qty,
                filled_qty: e.filled_qty,
                status: e.status,
            },
        );
    }
    SnapshotLoad { map, defects }
}
