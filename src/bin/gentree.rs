//! # Gentree Operator CLI
//!
//! `serve` runs the background loops; every other subcommand performs one
//! human-review or maintenance operation against the tree store and prints
//! its result as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gentree_core::compute::HttpComputeClient;
use gentree_core::config::ConfigManager;
use gentree_core::database::{DatabaseConnection, DatabaseMigrations, DbPool};
use gentree_core::logging::init_structured_logging;
use gentree_core::orchestration::{MaintenanceService, OrchestrationSystem};
use gentree_core::review::ReviewService;
use gentree_core::tournament::TournamentEngine;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "gentree")]
#[command(about = "Generation tree scheduler and review operations")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long, env = "GENTREE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (default: GENTREE_ENV, APP_ENV, then development)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the submitter, poller and reconcile loops until Ctrl-C
    Serve,

    /// Approve a step as a parent source
    Approve {
        run_id: i64,
        step_id: i64,
        #[arg(short = 'k', long, default_value_t = gentree_core::constants::DEFAULT_TOP_K_COUNT)]
        top_k: i64,
    },

    /// Change how many top-rated candidates pass a step's gate
    SetTopK { run_id: i64, step_id: i64, top_k: i64 },

    /// Withdraw a step's approval
    Revoke { run_id: i64, step_id: i64 },

    /// Record that one candidate beat another
    Vote { winner_id: i64, loser_id: i64 },

    /// Show the next unvoted pair (most advanced step first unless --step-id is given)
    NextPair {
        run_id: i64,
        #[arg(long)]
        step_id: Option<i64>,
    },

    /// Reject a candidate and print a navigation hint
    Reject { candidate_id: i64 },

    /// Mark the winner of a run and complete it
    MarkWinner { candidate_id: i64 },

    /// Clear a run's winner and reopen it
    UnmarkWinner { candidate_id: i64 },

    /// Count a failed child attempt against a parent candidate
    RecordFailure { candidate_id: i64 },

    /// Stop scheduling a pending or running run
    AbandonRun { run_id: i64 },

    /// Repair drifted child counts and reclaim stale jobs now
    Reconcile,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.environment {
        Some(environment) => ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment),
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("failed to load configuration")?;
    init_structured_logging(&manager.config().logging, manager.environment());

    let db = DatabaseConnection::new(&manager.config().database)
        .await
        .context("failed to open tree store")?;
    DatabaseMigrations::run_all(db.pool())
        .await
        .context("failed to apply migrations")?;
    let pool = db.pool().clone();

    let outcome = run_command(cli.command, &manager, pool).await;
    db.close().await;
    outcome
}

async fn run_command(command: Commands, manager: &ConfigManager, pool: DbPool) -> Result<()> {
    let review = ReviewService::new(pool.clone());

    match command {
        Commands::Serve => serve(manager, pool).await,
        Commands::Approve {
            run_id,
            step_id,
            top_k,
        } => print_json(&review.approve(run_id, step_id, top_k).await?),
        Commands::SetTopK {
            run_id,
            step_id,
            top_k,
        } => print_json(&review.set_top_k(run_id, step_id, top_k).await?),
        Commands::Revoke { run_id, step_id } => print_json(&review.revoke(run_id, step_id).await?),
        Commands::Vote { winner_id, loser_id } => {
            let tournament = TournamentEngine::new(pool);
            print_json(&tournament.record_vote(winner_id, loser_id).await?)
        }
        Commands::NextPair { run_id, step_id } => {
            let tournament = TournamentEngine::new(pool);
            let pair = match step_id {
                Some(step_id) => tournament.next_unvoted_pair(run_id, step_id).await?,
                None => tournament.next_pair_for_run(run_id).await?,
            };
            print_json(&pair)
        }
        Commands::Reject { candidate_id } => print_json(&review.reject(candidate_id).await?),
        Commands::MarkWinner { candidate_id } => print_json(&review.mark_winner(candidate_id).await?),
        Commands::UnmarkWinner { candidate_id } => {
            print_json(&review.unmark_winner(candidate_id).await?)
        }
        Commands::RecordFailure { candidate_id } => {
            print_json(&review.record_parent_failure(candidate_id).await?)
        }
        Commands::AbandonRun { run_id } => print_json(&review.abandon_run(run_id).await?),
        Commands::Reconcile => {
            let maintenance = MaintenanceService::new(pool, manager.config().poller.stale_job_timeout());
            let repaired = maintenance.reconcile_child_counts().await?;
            let reclaimed = maintenance.reclaim_stale_jobs().await?;
            print_json(&serde_json::json!({
                "repaired": repaired,
                "reclaimed": reclaimed.iter().map(|job| job.id).collect::<Vec<_>>(),
            }))
        }
    }
}

async fn serve(manager: &ConfigManager, pool: DbPool) -> Result<()> {
    let config = manager.config();
    let compute = HttpComputeClient::new(&config.compute).context("failed to build compute client")?;
    info!(
        base_url = compute.base_url(),
        client_id = compute.client_id(),
        environment = manager.environment(),
        "Compute service client ready"
    );

    let system = Arc::new(OrchestrationSystem::new(pool, Arc::new(compute), config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = system.start(shutdown_rx);

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Receivers may already be gone if every loop exited
    let _ = shutdown_tx.send(true);
    handles.join().await;
    info!("Shutdown complete");
    Ok(())
}
