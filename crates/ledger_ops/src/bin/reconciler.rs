//! Ledger reconciler binary
//!
//! # Usage
//!
//! ```bash
//! # Read-only check; exits with status 1 when the ledger is inconsistent
//! ledger-reconciler verify
//!
//! # Preview, then apply, a reconciliation towards the posted lines
//! ledger-reconciler reconcile --strategy to_ledger --dry-run
//! ledger-reconciler reconcile --strategy to_ledger --account 1101 --account 1102
//!
//! # Periodic verify-then-repair until SIGINT/SIGTERM
//! ledger-reconciler --migrate watch
//! ```
//!
//! # Environment Variables
//!
//! * `LEDGER_DATABASE_URL` - PostgreSQL connection string
//! * `LEDGER_MAX_CONNECTIONS` - Pool size (default: 5)
//! * `LEDGER_RUN_MIGRATIONS` - Apply migrations on start (default: false)
//! * `LEDGER_LOG_LEVEL` - Default log filter (default: info); `RUST_LOG` wins
//! * `LEDGER_LOG_JSON` - Emit JSON log lines (default: false)
//! * `LEDGER_RECONCILIATION__TOLERANCE` - Mismatch tolerance (default: 0.01)
//! * `LEDGER_RECONCILIATION__INTERVAL_SECS` - Watch interval (default: 3600)

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_ledger::ReconcileStrategy;
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore};
use ledger_ops::{describe_report, LedgerOpsConfig, ReconcileRequest, Runner};

#[derive(Parser)]
#[command(name = "ledger-reconciler")]
#[command(about = "Verify and reconcile ledger balances")]
#[command(version)]
struct Cli {
    /// Apply database migrations before running
    #[arg(long)]
    migrate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare cached balances with the posted journal lines
    Verify {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Overwrite cached balances from an authoritative source
    Reconcile {
        /// to_ledger, to_subledger_transaction_sum or to_current_cached
        #[arg(long, default_value = "to_ledger")]
        strategy: ReconcileStrategy,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Limit to these account codes
        #[arg(long = "account")]
        accounts: Vec<String>,
    },

    /// Run periodic verify-then-repair passes until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = LedgerOpsConfig::from_env().context("loading configuration")?;
    init_tracing(&config.log_level, config.log_json);

    let db_config = DatabaseConfig::new(&config.database_url)
        .max_connections(config.max_connections)
        .application_name("ledger-reconciler");
    let pool = create_pool(db_config)
        .await
        .context("connecting to the database")?;
    if cli.migrate || config.run_migrations {
        run_migrations(&pool).await.context("running migrations")?;
    }

    let store = Arc::new(PostgresLedgerStore::new(pool, config.ledger.currency));
    let runner = Runner::new(store, &config);

    match cli.command {
        Command::Verify { json } => {
            let report = runner.verify().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for line in describe_report(&report) {
                    println!("{}", line);
                }
                println!(
                    "{} accounts checked, {} mismatches",
                    report.checked_accounts,
                    report.mismatches.len()
                );
            }
            Ok(if report.consistent { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Reconcile { strategy, dry_run, accounts } => {
            let request = ReconcileRequest {
                strategy,
                dry_run,
                account_codes: accounts,
            };
            let result = runner.reconcile(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch => {
            let (tx, rx) = watch::channel(false);
            let signal = tokio::spawn(async move {
                shutdown_signal().await;
                let _ = tx.send(true);
            });
            runner.watch(rx).await?;
            signal.abort();
            tracing::info!("reconciler shutdown complete");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping");
        }
    }
}
