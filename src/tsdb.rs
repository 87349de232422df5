//! SQL-over-HTTP adapter for the downstream time-series store
//!
//! The store takes the SQL text as the POST body of a Basic-Auth request
//! and answers with `{code, column_meta, data}`; `code != 0` is a failed
//! query carrying the server's message. Aggregate columns come back named
//! `last(col)` and are un-prefixed so decoders can look fields up by their
//! plain names. Requests are synchronous with a hard timeout and no retry:
//! an unreachable store is a setup error, not a data mismatch.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::configure::TsdbSettings;
use crate::models::order_event::{OrderStatus, Side};
use crate::models::snapshot::{
    BalanceKey, BalanceRecord, OrderRecord, SnapshotLoad, TradeRecord, TradeRole,
};

const SLOW_QUERY_THRESHOLD_MS: u128 = 100;

// Last-value-wins snapshot queries
pub const SELECT_LATEST_BALANCES_SQL: &str = "
    SELECT user_id, asset_id,
           last(avail), last(frozen), last(lock_version), last(settle_version)
    FROM balances
    GROUP BY user_id, asset_id
";

pub const SELECT_LATEST_ORDERS_SQL: &str = "
    SELECT order_id, user_id,
           last(side), last(price), last(qty), last(filled_qty), last(status)
    FROM orders
    GROUP BY order_id, user_id
";

pub const SELECT_TRADE_LEGS_SQL: &str = "
    SELECT trade_id, user_id, last(role), last(price), last(qty)
    FROM trade_legs
    GROUP BY trade_id, user_id
";

#[derive(Debug, Deserialize)]
struct RawResponse {
    code: i64,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    column_meta: Vec<Vec<Value>>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

/// One decoded query result: un-prefixed column names plus row arrays
#[derive(Debug)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn col(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .with_context(|| format!("column {} not in result set {:?}", name, self.columns))
    }
}

/// Strip the last-value aggregation off a column name: `last(col)` -> `col`
pub fn unprefix_last(name: &str) -> &str {
    let bytes = name.as_bytes();
    if bytes.len() > 6 && bytes[..5].eq_ignore_ascii_case(b"last(") && name.ends_with(')') {
        &name[5..name.len() - 1]
    } else {
        name
    }
}

/// Bounds-checked cell access; a row shorter than column_meta promises is a
/// row defect, never a panic
fn cell<'a>(row: &'a [Value], i: usize) -> Result<&'a Value> {
    row.get(i)
        .with_context(|| format!("short row: {} cells, column {} missing", row.len(), i))
}

fn value_i64(v: &Value) -> Result<i64> {
    match v {
        Value::Number(n) => n.as_i64().with_context(|| format!("non-integer number {}", n)),
        Value::String(s) => s.parse().with_context(|| format!("non-integer string {:?}", s)),
        other => bail!("expected integer, got {}", other),
    }
}

fn value_u64(v: &Value) -> Result<u64> {
    let v = value_i64(v)?;
    u64::try_from(v).with_context(|| format!("negative id {}", v))
}

fn value_u32(v: &Value) -> Result<u32> {
    let v = value_i64(v)?;
    u32::try_from(v).with_context(|| format!("id {} out of range", v))
}

fn value_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct TsdbClient {
    http: reqwest::Client,
    url: String,
    user: String,
    pass: String,
}

impl TsdbClient {
    pub fn connect(settings: &TsdbSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            url: format!("http://{}:{}/rest/sql/{}", settings.host, settings.port, settings.database),
            user: settings.user.clone(),
            pass: settings.pass.clone(),
            http,
        })
    }

    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let started = std::time::Instant::now();
        let resp = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .body(sql.to_string())
            .send()
            .await
            .with_context(|| format!("Query to {} failed", self.url))?;

        let raw: RawResponse = resp.json().await.context("Unparseable store response")?;

        let elapsed_ms = started.elapsed().as_millis();
        if elapsed_ms > SLOW_QUERY_THRESHOLD_MS {
            log::warn!("Slow store query ({} ms): {}", elapsed_ms, sql.split_whitespace().collect::<Vec<_>>().join(" "));
        } else {
            log::debug!("Store query took {} ms", elapsed_ms);
        }

        if raw.code != 0 {
            bail!(
                "Store rejected query: code={} desc={}",
                raw.code,
                raw.desc.unwrap_or_default()
            );
        }

        let columns = raw
            .column_meta
            .iter()
            .map(|meta| {
                meta.first()
                    .and_then(Value::as_str)
                    .map(|name| unprefix_last(name).to_string())
                    .context("column_meta entry without a name")
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult { columns, rows: raw.data })
    }

    pub async fn latest_balances(&self) -> Result<SnapshotLoad<BalanceKey, BalanceRecord>> {
        balances_from_query(&self.query(SELECT_LATEST_BALANCES_SQL).await?)
    }

    pub async fn latest_orders(&self) -> Result<SnapshotLoad<String, OrderRecord>> {
        orders_from_query(&self.query(SELECT_LATEST_ORDERS_SQL).await?)
    }

    pub async fn latest_trades(&self) -> Result<SnapshotLoad<String, TradeRecord>> {
        trades_from_query(&self.query(SELECT_TRADE_LEGS_SQL).await?)
    }
}

// The decoders below fail only on a missing required column (a store schema
// problem). A malformed row is a per-row defect; the rest of the result set
// still decodes.

pub fn balances_from_query(qr: &QueryResult) -> Result<SnapshotLoad<BalanceKey, BalanceRecord>> {
    let user_id = qr.col("user_id")?;
    let asset_id = qr.col("asset_id")?;
    let avail = qr.col("avail")?;
    let frozen = qr.col("frozen")?;
    let lock_version = qr.col("lock_version").ok();
    let settle_version = qr.col("settle_version").ok();

    let mut map = BTreeMap::new();
    let mut defects = Vec::new();
    for (i, row) in qr.rows.iter().enumerate() {
        let decoded = (|| -> Result<(BalanceKey, BalanceRecord)> {
            let key = (value_u64(cell(row, user_id)?)?, value_u32(cell(row, asset_id)?)?);
            let record = BalanceRecord {
                avail: value_i64(cell(row, avail)?)?,
                frozen: value_i64(cell(row, frozen)?)?,
                version: None,
                lock_version: lock_version
                    .map(|i| cell(row, i).and_then(value_i64))
                    .transpose()?,
                settle_version: settle_version
                    .map(|i| cell(row, i).and_then(value_i64))
                    .transpose()?,
            };
            Ok((key, record))
        })();
        match decoded {
            Ok((key, record)) => {
                map.insert(key, record);
            }
            Err(e) => defects.push(format!("row {}: {:#}", i, e)),
        }
    }
    Ok(SnapshotLoad { map, defects })
}

pub fn orders_from_query(qr: &QueryResult) -> Result<SnapshotLoad<String, OrderRecord>> {
    let order_id = qr.col("order_id")?;
    let user_id = qr.col("user_id")?;
    let side = qr.col("side")?;
    let price = qr.col("price")?;
    let qty = qr.col("qty")?;
    let filled_qty = qr.col("filled_qty")?;
    let status = qr.col("status")?;

    let mut map = BTreeMap::new();
    let mut defects = Vec::new();
    for (i, row) in qr.rows.iter().enumerate() {
        let decoded = (|| -> Result<(String, OrderRecord)> {
            // Side/status may come back as strings or integer codes;
            // normalize here, never compare raw
            let raw_side = value_string(cell(row, side)?);
            let raw_status = value_string(cell(row, status)?);
            let record = OrderRecord {
                user_id: value_string(cell(row, user_id)?),
                side: Side::parse(&raw_side)
                    .with_context(|| format!("unknown side {:?}", raw_side))?,
                price: value_i64(cell(row, price)?)?,
                qty: value_i64(cell(row, qty)?)?,
                filled_qty: value_i64(cell(row, filled_qty)?)?,
                status: OrderStatus::parse(&raw_status)
                    .with_context(|| format!("unknown status {:?}", raw_status))?,
            };
            Ok((value_string(cell(row, order_id)?), record))
        })();
        match decoded {
            Ok((id, record)) => {
                map.insert(id, record);
            }
            Err(e) => defects.push(format!("row {}: {:#}", i, e)),
        }
    }
    Ok(SnapshotLoad { map, defects })
}

pub fn trades_from_query(qr: &QueryResult) -> Result<SnapshotLoad<String, TradeRecord>> {
    let trade_id = qr.col("trade_id")?;
    let user_id = qr.col("user_id")?;
    let role = qr.col("role")?;
    let price = qr.col("price")?;
    let qty = qr.col("qty")?;

    struct Leg {
        user_id: String,
        role: TradeRole,
        price: i64,
        qty: i64,
    }

    let mut legs: BTreeMap<String, Vec<Leg>> = BTreeMap::new();
    let mut defects = Vec::new();
    for (i, row) in qr.rows.iter().enumerate() {
        let decoded = (|| -> Result<(String, Leg)> {
            let raw_role = value_string(cell(row, role)?);
            let leg = Leg {
                user_id: value_string(cell(row, user_id)?),
                role: TradeRole::parse(&raw_role)
                    .with_context(|| format!("unknown trade role {:?}", raw_role))?,
                price: value_i64(cell(row, price)?)?,
                qty: value_i64(cell(row, qty)?)?,
            };
            Ok((value_string(cell(row, trade_id)?), leg))
        })();
        match decoded {
            Ok((id, leg)) => legs.entry(id).or_default().push(leg),
            Err(e) => defects.push(format!("row {}: {:#}", i, e)),
        }
    }

    let mut map = BTreeMap::new();
    for (trade_id, legs) in legs {
        if legs.len() != 2 || legs[0].role == legs[1].role {
            defects.push(format!("trade {}: malformed maker/taker pair", trade_id));
            continue;
        }
        let (maker, taker) = if legs[0].role == TradeRole::Maker {
            (&legs[0], &legs[1])
        } else {
            (&legs[1], &legs[0])
        };
        map.insert(
            trade_id,
            TradeRecord {
                maker_user: maker.user_id.clone(),
                taker_user: taker.user_id.clone(),
                price: maker.price,
                qty: maker.qty,
            },
        );
    }
    Ok(SnapshotLoad { map, defects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unprefix_last() {
        assert_eq!(unprefix_last("last(avail)"), "avail");
        assert_eq!(unprefix_last("LAST(frozen)"), "frozen");
        assert_eq!(unprefix_last("user_id"), "user_id");
        assert_eq!(unprefix_last("last("), "last(");
        assert_eq!(unprefix_last("lastcol)"), "lastcol)");
    }

    #[test]
    fn test_response_decoding() {
        let raw = json!({
            "code": 0,
            "column_meta": [
                ["user_id", "BIGINT", 8],
                ["asset_id", "INT", 4],
                ["last(avail)", "BIGINT", 8],
                ["last(frozen)", "BIGINT", 8],
                ["last(lock_version)", "BIGINT", 8],
                ["last(settle_version)", "BIGINT", 8]
            ],
            "data": [[1, 2, 500, 0, 3, 1]]
        });
        let raw: RawResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(raw.code, 0);

        let columns: Vec<String> = raw
            .column_meta
            .iter()
            .map(|m| unprefix_last(m[0].as_str().unwrap()).to_string())
            .collect();
        let qr = QueryResult { columns, rows: raw.data };

        let load = balances_from_query(&qr).unwrap();
        assert!(load.defects.is_empty());
        let rec = &load.map[&(1, 2)];
        assert_eq!(rec.avail, 500);
        assert_eq!(rec.lock_version, Some(3));
        assert_eq!(rec.settle_version, Some(1));
    }

    #[test]
    fn test_error_code_detected() {
        let raw: RawResponse = serde_json::from_value(json!({
            "code": 534,
            "desc": "table does not exist"
        }))
        .unwrap();
        assert_ne!(raw.code, 0);
        assert_eq!(raw.desc.as_deref(), Some("table does not exist"));
    }

    #[test]
    fn test_orders_from_query_integer_codes() {
        let qr = QueryResult {
            columns: vec![
                "order_id".into(),
                "user_id".into(),
                "side".into(),
                "price".into(),
                "qty".into(),
                "filled_qty".into(),
                "status".into(),
            ],
            rows: vec![vec![
                json!("101"),
                json!(1),
                json!(0),
                json!(50000),
                json!(10),
                json!(4),
                json!(1),
            ]],
        };
        let load = orders_from_query(&qr).unwrap();
        assert!(load.defects.is_empty());
        let rec = &load.map["101"];
        assert_eq!(rec.side, Side::Buy);
        assert_eq!(rec.status, OrderStatus::PartiallyFilled);
        assert_eq!(rec.user_id, "1");
    }

    #[test]
    fn test_trades_from_query_folds_legs() {
        let qr = QueryResult {
            columns: vec![
                "trade_id".into(),
                "user_id".into(),
                "role".into(),
                "price".into(),
                "qty".into(),
            ],
            rows: vec![
                vec![json!("7"), json!("2"), json!("taker"), json!(50000), json!(10)],
                vec![json!("7"), json!("1"), json!("maker"), json!(50000), json!(10)],
            ],
        };
        let load = trades_from_query(&qr).unwrap();
        assert!(load.defects.is_empty());
        assert_eq!(load.map["7"].maker_user, "1");
        assert_eq!(load.map["7"].taker_user, "2");
    }

    fn balance_columns() -> Vec<String> {
        vec!["user_id".into(), "asset_id".into(), "avail".into(), "frozen".into()]
    }

    #[test]
    fn test_short_row_is_defect_not_panic() {
        let qr = QueryResult {
            columns: balance_columns(),
            rows: vec![
                vec![json!(1), json!(2), json!(500), json!(0)],
                vec![json!(3), json!(4)],
            ],
        };
        let load = balances_from_query(&qr).unwrap();
        assert_eq!(load.map.len(), 1);
        assert_eq!(load.defects.len(), 1);
        assert!(load.defects[0].contains("short row"));
    }

    #[test]
    fn test_negative_id_is_defect() {
        let qr = QueryResult {
            columns: balance_columns(),
            rows: vec![vec![json!(-1), json!(2), json!(500), json!(0)]],
        };
        let load = balances_from_query(&qr).unwrap();
        assert!(load.map.is_empty());
        assert_eq!(load.defects.len(), 1);
        assert!(load.defects[0].contains("negative id -1"));
    }

    #[test]
    fn test_unknown_status_is_defect_remainder_decodes() {
        let columns: Vec<String> = [
            "order_id", "user_id", "side", "price", "qty", "filled_qty", "status",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let row = |id: &str, status: &str| {
            vec![json!(id), json!(1), json!("buy"), json!(100), json!(10), json!(0), json!(status)]
        };
        let qr = QueryResult {
            columns,
            rows: vec![row("101", "done"), row("102", "NEW")],
        };
        let load = orders_from_query(&qr).unwrap();
        assert_eq!(load.map.len(), 1);
        assert_eq!(load.map["102"].status, OrderStatus::New);
        assert_eq!(load.defects.len(), 1);
        assert!(load.defects[0].contains("unknown status"));
    }

    #[test]
    fn test_lone_trade_leg_is_defect() {
        let qr = QueryResult {
            columns: vec![
                "trade_id".into(),
                "user_id".into(),
                "role".into(),
                "price".into(),
                "qty".into(),
            ],
            rows: vec![vec![json!("9"), json!("5"), json!("maker"), json!(100), json!(1)]],
        };
        let load = trades_from_query(&qr).unwrap();
        assert!(load.map.is_empty());
        assert_eq!(load.defects.len(), 1);
        assert!(load.defects[0].contains("malformed maker/taker pair"));
    }
}
