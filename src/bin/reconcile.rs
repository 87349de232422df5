use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use ledger_audit::common_utils::get_current_timestamp_ms;
use ledger_audit::configure::{load_config, AppConfig};
use ledger_audit::logger::setup_logger;
use ledger_audit::models::balance_event::load_balance_events;
use ledger_audit::models::order_event::load_order_events;
use ledger_audit::models::snapshot::{
    load_balance_snapshot, load_order_snapshot, load_trade_snapshot, replay_balance_events,
    replay_order_events,
};
use ledger_audit::reconcile::{reconcile_balances, reconcile_orders, reconcile_trades};
use ledger_audit::tsdb::TsdbClient;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(about = "Reconcile pipeline snapshots against the downstream store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print row counts as sources load
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Plain-text verdict markers
    #[arg(long, global = true)]
    no_color: bool,

    /// Diff lines kept in the report
    #[arg(long, global = true, default_value_t = 20)]
    max_errors: usize,

    /// Live store host (used when --db is not given)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Live store port
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile balances keyed by (user_id, asset_id)
    Balances {
        /// Local snapshot CSV
        #[arg(short = 'p', long)]
        pipeline: PathBuf,
        /// External snapshot CSV; falls back to a live query when absent
        #[arg(short = 'd', long)]
        db: Option<PathBuf>,
        /// Treat the pipeline file as a balance-event log and replay it
        #[arg(long)]
        events: bool,
    },
    /// Reconcile orders keyed by order_id
    Orders {
        #[arg(short = 'p', long)]
        pipeline: PathBuf,
        #[arg(short = 'd', long)]
        db: Option<PathBuf>,
        /// Treat the pipeline file as an order-event log and replay it
        #[arg(long)]
        events: bool,
    },
    /// Reconcile trades keyed by trade_id (maker/taker leg pairs)
    Trades {
        #[arg(short = 'p', long)]
        pipeline: PathBuf,
        #[arg(short = 'd', long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
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
    match run(&cli, &config).await {
        Ok(code) => {
            log::info!(
                "reconciliation finished in {} ms, exit code {}",
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

fn client_for(cli: &Cli, config: &AppConfig) -> Result<TsdbClient> {
    let mut settings = config.tsdb.clone();
    if let Some(host) = &cli.host {
        settings.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    TsdbClient::connect(&settings)
}

fn source_name(db: &Option<PathBuf>) -> String {
    match db {
        Some(path) => path.display().to_string(),
        None => "downstream store".to_string(),
    }
}

fn report_defects(defects: &[String], source: impl std::fmt::Display) {
    if !defects.is_empty() {
        eprintln!("{} defective rows in {}:", defects.len(), source);
        for d in defects.iter().take(20) {
            eprintln!("  {}", d);
        }
    }
}

async fn run(cli: &Cli, config: &AppConfig) -> Result<i32> {
    let mut defect_count = 0usize;

    let report = match &cli.command {
        Commands::Balances { pipeline, db, events } => {
            let local = if *events {
                let load = load_balance_events(pipeline)?;
                report_defects(&load.row_errors, pipeline.display());
                defect_count += load.row_errors.len();
                replay_balance_events(&load.rows)
            } else {
                let load = load_balance_snapshot(pipeline)?;
                report_defects(&load.defects, pipeline.display());
                defect_count += load.defects.len();
                load.map
            };

            let external = {
                let load = match db {
                    Some(path) => load_balance_snapshot(path)?,
                    None => client_for(cli, config)?.latest_balances().await?,
                };
                report_defects(&load.defects, source_name(db));
                defect_count += load.defects.len();
                load.map
            };

            if cli.verbose {
                println!("local: {} keys, external: {} keys", local.len(), external.len());
            }
            reconcile_balances(&local, &external, cli.max_errors)
        }

        Commands::Orders { pipeline, db, events } => {
            let local = if *events {
                let load = load_order_events(pipeline)?;
                report_defects(&load.row_errors, pipeline.display());
                defect_count += load.row_errors.len();
                replay_order_events(&load.rows)
            } else {
                load_order_snapshot(pipeline)?
            };
            report_defects(&local.defects, pipeline.display());
            defect_count += local.defects.len();

            let external = {
                let load = match db {
                    Some(path) => load_order_snapshot(path)?,
                    None => client_for(cli, config)?.latest_orders().await?,
                };
                report_defects(&load.defects, source_name(db));
                defect_count += load.defects.len();
                load.map
            };

            if cli.verbose {
                println!("local: {} keys, external: {} keys", local.map.len(), external.len());
            }
            reconcile_orders(&local.map, &external, cli.max_errors)
        }

        Commands::Trades { pipeline, db } => {
            let local = load_trade_snapshot(pipeline)?;
            report_defects(&local.defects, pipeline.display());
            defect_count += local.defects.len();

            let external = {
                let load = match db {
                    Some(path) => load_trade_snapshot(path)?,
                    None => client_for(cli, config)?.latest_trades().await?,
                };
                report_defects(&load.defects, source_name(db));
                defect_count += load.defects.len();
                load.map
            };

            if cli.verbose {
                println!("local: {} keys, external: {} keys", local.map.len(), external.len());
            }
            reconcile_trades(&local.map, &external, cli.max_errors)
        }
    };

    report.print(cli.no_color);

    // Structural row defects are data problems, not setup problems
    if report.passed() && defect_count > 0 {
        return Ok(1);
    }
    Ok(report.exit_code())
}
