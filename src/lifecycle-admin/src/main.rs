//! Lifecycle Admin CLI — run the batch counter recalculation and inspect
//! the lifecycle reports from the terminal.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use storepulse_core::config::AppConfig;
use storepulse_datastore::MemoryDatastore;
use storepulse_lifecycle::{
    CohortAnalyzer, FunnelAggregator, InactivityDetector, ReactivationRecalculator,
};

#[derive(Parser)]
#[command(name = "lifecycle-admin")]
#[command(about = "StorePulse Lifecycle Administration Tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the full event history and rebuild the daily lifecycle
    /// counters
    Recalc,

    /// Compute and print the daily funnel snapshot
    Funnel {
        /// Snapshot date (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the installation cohort report
    Cohort {
        /// Base date (default: today)
        #[arg(long)]
        base_date: Option<NaiveDate>,
    },

    /// Print stores that ordered a week ago but not on the target date
    Inactivity {
        /// Target date (default: yesterday)
        #[arg(long)]
        target_date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifecycle_admin=info,storepulse_lifecycle=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().unwrap_or_else(|_| AppConfig::default());

    let today = Utc::now().date_naive();
    let datastore = Arc::new(MemoryDatastore::new());
    datastore.seed_demo_data(today);

    match cli.command {
        Commands::Recalc => cmd_recalc(&datastore).await,
        Commands::Funnel { date } => cmd_funnel(&datastore, date.unwrap_or(today)).await,
        Commands::Cohort { base_date } => {
            cmd_cohort(&datastore, &config, base_date.unwrap_or(today)).await
        }
        Commands::Inactivity { target_date } => {
            cmd_inactivity(
                &datastore,
                &config,
                target_date.unwrap_or(today - Duration::days(1)),
            )
            .await
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_recalc(datastore: &Arc<MemoryDatastore>) -> anyhow::Result<()> {
    let recalculator =
        ReactivationRecalculator::new(datastore.clone(), datastore.clone(), datastore.clone());
    let summary = recalculator.run().await?;

    println!("=== Lifecycle Counter Recalculation ===");
    println!();
    println!("  Dates written:          {}", summary.dates_written);
    println!(
        "  Cumulative installed:   {}",
        summary.final_cumulative_installed
    );
    println!(
        "  Cumulative churned:     {}",
        summary.final_cumulative_churned
    );
    Ok(())
}

async fn cmd_funnel(datastore: &Arc<MemoryDatastore>, date: NaiveDate) -> anyhow::Result<()> {
    let aggregator = FunnelAggregator::new(
        datastore.clone(),
        datastore.clone(),
        datastore.clone(),
        datastore.clone(),
    );
    let report = aggregator.run_daily(date, None).await?;
    let overall = &report.overall;

    println!("=== Daily Funnel — {date} ===");
    println!();
    println!("  Total stores:       {}", overall.total_stores);
    println!("  Registered:         {}", overall.funnel.registered);
    println!("  Install completed:  {}", overall.funnel.install_completed);
    println!("  Active:             {}", overall.funnel.active);
    println!("  Churned:            {}", overall.funnel.churned);
    println!();
    println!(
        "  Register -> install: {:>5.1}%",
        overall.conversion.register_to_install
    );
    println!(
        "  Install -> active:   {:>5.1}%",
        overall.conversion.install_to_active
    );

    println!();
    println!("  Stage counts:");
    for (stage, count) in &overall.stage_counts {
        println!("    {:<22} {}", stage, count);
    }

    println!();
    println!("  Per-owner funnels:");
    println!(
        "    {:<22} {:>8} {:>10} {:>8} {:>8}",
        "Scope", "Total", "Installed", "Active", "Churned"
    );
    for owner in &report.owners {
        println!(
            "    {:<22} {:>8} {:>10} {:>8} {:>8}",
            owner.scope,
            owner.total_stores,
            owner.funnel.install_completed,
            owner.funnel.active,
            owner.funnel.churned,
        );
    }
    Ok(())
}

async fn cmd_cohort(
    datastore: &Arc<MemoryDatastore>,
    config: &AppConfig,
    base_date: NaiveDate,
) -> anyhow::Result<()> {
    let analyzer = CohortAnalyzer::new(
        datastore.clone(),
        datastore.clone(),
        datastore.clone(),
        config.cohort.clone(),
        config.lookup.clone(),
    );
    let report = analyzer.analyze(base_date).await?;

    println!("=== Installation Cohorts — as of {base_date} ===");
    println!();
    println!(
        "  {:<10} {:>8} {:>8} {:>10} {:>8}",
        "Cohort", "Total", "Active", "Inactive", "Churned"
    );
    println!("  {}", "-".repeat(50));
    for bucket in &report.buckets {
        println!(
            "  {:<10} {:>8} {:>8} {:>10} {:>8}",
            bucket.month_key, bucket.total, bucket.active, bucket.inactive, bucket.churned,
        );
    }

    println!();
    println!("  Flow ({} links):", report.flow.links.len());
    for link in &report.flow.links {
        println!("    {:<10} -> {:<10} {}", link.source, link.target, link.value);
    }
    Ok(())
}

async fn cmd_inactivity(
    datastore: &Arc<MemoryDatastore>,
    config: &AppConfig,
    target_date: NaiveDate,
) -> anyhow::Result<()> {
    let detector = InactivityDetector::new(
        datastore.clone(),
        datastore.clone(),
        datastore.clone(),
        config.lookup.clone(),
    );
    let report = detector.detect(target_date).await?;

    println!(
        "=== Inactive Stores — {} vs {} ===",
        report.target_date, report.compared_to
    );
    println!();
    if report.stores.is_empty() {
        println!("  No newly inactive stores.");
        return Ok(());
    }
    println!(
        "  {:<10} {:<24} {:<12} {:>12} Installed",
        "Store", "Name", "Owner", "Last Week"
    );
    println!("  {}", "-".repeat(76));
    for inactive in &report.stores {
        let installed = inactive
            .first_install_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:<10} {:<24} {:<12} {:>12} {}",
            inactive.store_id,
            inactive.name,
            inactive.owner_id,
            inactive.last_week_order_count,
            installed,
        );
    }
    Ok(())
}
