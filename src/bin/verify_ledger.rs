use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ledger_audit::common_utils::get_current_timestamp_ms;
use ledger_audit::configure::{load_config, AppConfig};
use ledger_audit::logger::setup_logger;
use ledger_audit::models::balance_event::load_balance_events;
use ledger_audit::models::order_event::{load_order_events, OrderEventType};
use ledger_audit::verifier::report::{verdict_mark, VerifyConfig, VerifyReport, ViolationList};
use ledger_audit::verifier::{verify_balance_events, verify_order_events, CardinalityInputs};
use ledger_audit::wal::{EpochTracker, WalDecoder};

#[derive(Parser)]
#[command(name = "verify_ledger")]
#[command(about = "Verify WAL integrity and balance/order ledger invariants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print per-entry progress detail
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Plain-text verdict markers
    #[arg(long, global = true)]
    no_color: bool,

    /// Detail lines kept per error category
    #[arg(long, global = true, default_value_t = 20)]
    max_errors: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a WAL file; check entry integrity and epoch/sequence order
    Wal {
        #[arg(long)]
        file: PathBuf,
    },
    /// Verify balance-event invariants
    Balances {
        /// Balance event CSV produced by the pipeline
        #[arg(short = 'p', long = "pipeline")]
        events: PathBuf,
        /// Order event CSV, the independent accepted-order count source
        #[arg(long)]
        orders: Option<PathBuf>,
        /// Independent trade count for the settle cardinality check
        #[arg(long)]
        trade_count: Option<u64>,
        /// Settle events expected per trade
        #[arg(long)]
        settles_per_trade: Option<u64>,
    },
    /// Verify order lifecycle legality
    Orders {
        #[arg(short = 'p', long = "pipeline")]
        events: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = setup_logger(&config) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let started = get_current_timestamp_ms();
    match run(&cli, &config) {
        Ok(code) => {
            log::info!(
                "verification finished in {} ms, exit code {}",
                get_current_timestamp_ms() - started,
                code
            );
            std::process::exit(code)
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(cli: &Cli, config: &AppConfig) -> Result<i32> {
    match &cli.command {
        Commands::Wal { file } => verify_wal(cli, file),
        Commands::Balances { events, orders, trade_count, settles_per_trade } => {
            verify_balances(cli, config, events, orders.as_deref(), *trade_count, *settles_per_trade)
        }
        Commands::Orders { events } => verify_orders(cli, events),
    }
}

fn verify_wal(cli: &Cli, path: &std::path::Path) -> Result<i32> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open WAL file {}", path.display()))?;
    let mut decoder = WalDecoder::new(BufReader::new(file));
    let mut tracker = EpochTracker::new();

    let mut structural = ViolationList::new(cli.max_errors);
    let mut sequence = ViolationList::new(cli.max_errors);

    for (i, result) in decoder.by_ref().enumerate() {
        match result {
            Ok(entry) => {
                if cli.verbose {
                    println!(
                        "entry {}: type={:?} epoch={} seq={} payload={}B",
                        i,
                        entry.header.entry_type,
                        entry.header.epoch,
                        entry.header.seq_id,
                        entry.header.payload_len
                    );
                }
                if let Err(e) = tracker.observe(&entry.header) {
                    sequence.push(format!("entry {}: {}", i, e));
                }
            }
            Err(e) => structural.push(format!("entry {}: {}", i, e)),
        }
    }

    let ok = structural.total() == 0 && sequence.total() == 0;
    println!("\n=== WAL Verification: {} ===", path.display());
    println!("entries decoded:     {}", decoder.entries_decoded());
    println!("bytes consumed:      {}", decoder.offset());
    println!("structural errors:   {}", structural.total());
    println!("sequence violations: {}", sequence.total());
    println!("verdict:             {}", verdict_mark(ok, cli.no_color));
    print_details("structural errors", &structural);
    print_details("sequence violations", &sequence);

    Ok(if ok { 0 } else { 1 })
}

fn verify_balances(
    cli: &Cli,
    config: &AppConfig,
    events_path: &std::path::Path,
    orders_path: Option<&std::path::Path>,
    trade_count: Option<u64>,
    settles_per_trade: Option<u64>,
) -> Result<i32> {
    let load = load_balance_events(events_path)?;
    if cli.verbose {
        println!("loaded {} balance events from {}", load.rows.len(), events_path.display());
    }

    let accepted_orders = match orders_path {
        Some(path) => {
            let orders = load_order_events(path)?;
            if !orders.row_errors.is_empty() {
                eprintln!("{} malformed rows in {}", orders.row_errors.len(), path.display());
            }
            Some(
                orders
                    .rows
                    .iter()
                    .filter(|e| e.event_type == OrderEventType::Accepted)
                    .count() as u64,
            )
        }
        None => None,
    };

    let verify_config = VerifyConfig {
        max_violations: cli.max_errors,
        settle_events_per_trade: settles_per_trade.unwrap_or(config.settle_events_per_trade),
    };
    let counts = CardinalityInputs { accepted_orders, trades: trade_count };
    let report = verify_balance_events(&load.rows, &counts, &verify_config);

    print_verify_report("Balance Ledger", &report, &load.row_errors, cli.no_color);
    Ok(if report.passed() && load.row_errors.is_empty() { 0 } else { 1 })
}

fn verify_orders(cli: &Cli, events_path: &std::path::Path) -> Result<i32> {
    let load = load_order_events(events_path)?;
    if cli.verbose {
        println!("loaded {} order events from {}", load.rows.len(), events_path.display());
    }

    let verify_config = VerifyConfig {
        max_violations: cli.max_errors,
        ..VerifyConfig::default()
    };
    let report = verify_order_events(&load.rows, &verify_config);

    print_verify_report("Order Lifecycle", &report, &load.row_errors, cli.no_color);
    Ok(if report.passed() && load.row_errors.is_empty() { 0 } else { 1 })
}

/// Summary block first, capped detail lists after
fn print_verify_report(
    title: &str,
    report: &VerifyReport,
    row_errors: &[String],
    no_color: bool,
) {
    println!("\n=== {} Verification ===", title);
    if !row_errors.is_empty() {
        println!("malformed rows: {}", row_errors.len());
    }
    for check in &report.checks {
        println!(
            "{:<28} {} ({} violations)",
            format!("{}:", check.name),
            verdict_mark(check.passed(), no_color),
            check.violations.total()
        );
    }
    println!(
        "overall:                     {}",
        verdict_mark(report.passed() && row_errors.is_empty(), no_color)
    );

    for line in row_errors.iter().take(20) {
        println!("  malformed {}", line);
    }
    for check in &report.checks {
        print_details(check.name, &check.violations);
    }
}

fn print_details(name: &str, violations: &ViolationList) {
    if violations.total() == 0 {
        return;
    }
    println!(
        "--- {} (showing {} of {}) ---",
        name,
        violations.sample().len(),
        violations.total()
    );
    for line in violations.sample() {
        println!("  {}", line);
    }
}
