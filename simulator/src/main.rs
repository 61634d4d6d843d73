//! Wallet Simulator
//!
//! Drives concurrent transactions against an in-memory coordinator, then
//! audits every account's ledger against its stored balance.

use std::time::Instant;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;

use controller::{SimulationController, Workload};
use wallet_coordinator::ServiceConfig;

/// Wallet Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Concurrent load generator and ledger auditor for the wallet coordinator")]
struct Args {
    /// Number of accounts to open
    #[arg(short, long, default_value = "10")]
    accounts: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Total transactions to issue
    #[arg(short, long, default_value = "10000")]
    transactions: usize,

    /// Opening balance of every account
    #[arg(long, default_value = "1000")]
    initial_balance: Decimal,

    /// Largest absolute amount per transaction
    #[arg(long, default_value = "250")]
    max_amount: Decimal,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wallet_coordinator=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting wallet simulator");
    info!("Accounts: {}", args.accounts);
    info!("Workers: {}", args.workers);
    info!("Seed: {}", seed);

    let workload = Workload {
        accounts: args.accounts,
        workers: args.workers,
        transactions: args.transactions,
        initial_balance: args.initial_balance,
        max_amount: args.max_amount,
        seed,
    };

    let mut controller = SimulationController::new(workload, ServiceConfig::from_env());
    controller.initialize().await?;

    let started = Instant::now();
    let metrics = controller.run().await?;
    let elapsed = started.elapsed().as_secs_f64();

    info!("Simulation complete");
    info!("Total transactions: {}", metrics.total_transactions);
    info!("Committed: {}", metrics.successful_transactions);
    info!("Insufficient balance: {}", metrics.insufficient_transactions);
    info!("Failed: {}", metrics.failed_transactions);
    info!("Success rate: {:.2}%", metrics.success_rate() * 100.0);
    info!("Throughput: {:.0} tx/s", metrics.throughput(elapsed));
    info!(
        "Latency avg/p50/p99: {}/{}/{}us",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );

    let report = controller.audit().await?;
    controller.shutdown().await?;

    if !report.is_clean() {
        for audit in &report.drifted {
            error!(
                account_id = %audit.account_id,
                cached = %audit.cached_balance,
                derived = %audit.derived_balance,
                "Ledger drift"
            );
        }
        for account_id in &report.negative {
            error!(account_id = %account_id, "Negative balance");
        }
        anyhow::bail!(
            "audit failed: {} drifted, {} negative of {} accounts",
            report.drifted.len(),
            report.negative.len(),
            report.audited
        );
    }

    info!("Audit clean across {} accounts", report.audited);
    Ok(())
}
