pub mod balance_event;
pub mod order_event;
pub mod snapshot;

pub use balance_event::{BalanceEvent, BalanceEventType, SourceType};
pub use order_event::{OrderEvent, OrderEventType, OrderStatus, Side};
pub use snapshot::{BalanceKey, BalanceRecord, FieldValue, OrderRecord, TradeRecord, TradeRole};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Result of loading a CSV file: well-formed rows plus per-row parse errors.
/// A malformed row never halts the load.
#[derive(Debug)]
pub struct CsvLoad<T> {
    pub rows: Vec<T>,
    pub row_errors: Vec<String>,
}

/// Read a headered CSV file, collecting rows and row-level errors
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<CsvLoad<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            // Header row is line 1, first data row line 2
            Err(e) => row_errors.push(format!("row {}: {}", i + 2, e)),
        }
    }
    Ok(CsvLoad { rows, row_errors })
}
