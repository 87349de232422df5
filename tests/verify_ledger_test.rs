//! WAL decode + invariant verification over on-disk fixtures

use std::fs::{self, File};
use std::io::BufReader;

use tempfile::TempDir;

use ledger_audit::models::balance_event::load_balance_events;
use ledger_audit::verifier::report::VerifyConfig;
use ledger_audit::verifier::{verify_balance_events, CardinalityInputs};
use ledger_audit::wal::{EpochTracker, WalDecoder, WalEntry, WalEntryType, WalError};

fn write_wal(dir: &TempDir, name: &str, entries: &[WalEntry]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut bytes = Vec::new();
    for e in entries {
        bytes.extend_from_slice(&e.encode());
    }
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_wal_file_decode_and_sequence_check() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<WalEntry> = (1..=5u64)
        .map(|seq| {
            WalEntry::new(WalEntryType::BalanceSettle, 1, 1, seq, vec![seq as u8; 16]).unwrap()
        })
        .collect();
    let path = write_wal(&dir, "clean.wal", &entries);

    let decoder = WalDecoder::new(BufReader::new(File::open(&path).unwrap()));
    let mut tracker = EpochTracker::new();
    let mut decoded = 0;
    for result in decoder {
        let entry = result.unwrap();
        tracker.observe(&entry.header).unwrap();
        decoded += 1;
    }
    assert_eq!(decoded, 5);
}

#[test]
fn test_wal_file_with_corrupt_middle_entry() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<WalEntry> = (1..=3u64)
        .map(|seq| WalEntry::new(WalEntryType::Deposit, 1, 1, seq, vec![seq as u8; 8]).unwrap())
        .collect();
    let path = write_wal(&dir, "corrupt.wal", &entries);

    // Corrupt one payload byte of the second entry
    let mut bytes = fs::read(&path).unwrap();
    let second_payload = 20 + 8 + 20; // first entry + second header
    bytes[second_payload] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let decoder = WalDecoder::new(BufReader::new(File::open(&path).unwrap()));
    let results: Vec<_> = decoder.collect();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(WalError::ChecksumMismatch { .. })));
    // The corrupt record must not prevent recovery of the rest
    assert_eq!(results[2].as_ref().unwrap().header.seq_id, 3);
}

#[test]
fn test_wal_file_truncated_tail() {
    let dir = TempDir::new().unwrap();
    let entries = vec![
        WalEntry::new(WalEntryType::Order, 1, 1, 1, vec![1; 32]).unwrap(),
        WalEntry::new(WalEntryType::Trade, 1, 1, 2, vec![2; 32]).unwrap(),
    ];
    let path = write_wal(&dir, "truncated.wal", &entries);

    // Chop the file mid-payload of the last entry
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    let decoder = WalDecoder::new(BufReader::new(File::open(&path).unwrap()));
    let results: Vec<_> = decoder.collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(WalError::TruncatedPayload { want: 32, have: 22 })
    ));
}

#[test]
fn test_balance_event_csv_verification() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.csv");
    // Two accepted orders worth of locks, one balanced trade (4 settles:
    // base+quote leg per counterparty), one conservation bug on trade 8
    fs::write(
        &path,
        "event_type,user_id,asset_id,source_type,source_id,version,delta,avail_after,frozen_after\n\
         lock,1,200,order,101,1,-50000,50000,50000\n\
         lock,2,100,order,102,1,-1,9,1\n\
         settle,1,100,trade,7,1,1,1,0\n\
         settle,1,200,trade,7,1,-50000,50000,0\n\
         settle,2,200,trade,7,1,50000,50000,0\n\
         settle,2,100,trade,7,1,-1,9,0\n\
         settle,1,100,trade,8,2,1000,1001,0\n\
         settle,2,100,trade,8,2,-999,8,0\n",
    )
    .unwrap();

    let load = load_balance_events(&path).unwrap();
    assert!(load.row_errors.is_empty());

    let counts = CardinalityInputs { accepted_orders: Some(2), trades: Some(2) };
    let report = verify_balance_events(&load.rows, &counts, &VerifyConfig::default());

    let check = |name: &str| report.checks.iter().find(|c| c.name == name).unwrap();
    // Trade 8 only produced 2 of its 4 legs: 6 settles where 2 trades need 8
    assert!(!check("cardinality").passed());
    assert!(check("lock_version monotonicity").passed());
    assert_eq!(check("conservation").violations.total(), 1);
    assert!(check("conservation").violations.sample()[0].contains("sum to 1"));
    assert!(check("source-type consistency").passed());
    assert!(!report.passed());
}
