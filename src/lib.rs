#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, ComfyUI in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Gentree Core
//!
//! Scheduler for branching image-generation runs.
//!
//! ## Overview
//!
//! Many runs are active at once, each one a pipeline of ordered steps. Step 1
//! produces base candidates; every later step refines a parent candidate from
//! the previous step. The crate decides which single unit of work to submit
//! next to an external asynchronous compute service, tracks that work to
//! completion, and turns results into new nodes of the run's generation tree.
//! Humans steer the tree by voting (ELO), approving steps and rejecting
//! branches.
//!
//! ## Architecture
//!
//! Two independent periodic loops drive the system:
//!
//! - **submitter**: [`orchestration::TreeScheduler`] selects the next unit,
//!   [`orchestration::JobLifecycleManager`] builds and submits its payload
//! - **poller**: advances in-flight jobs, ingests completed ones as
//!   candidates and reclaims stale jobs
//!
//! Review actions ([`tournament::TournamentEngine`], [`review::ReviewService`])
//! mutate the same store under their own transactions.
//!
//! ## Module Organization
//!
//! - [`models`] - Tree store rows and persistence operations
//! - [`database`] - SQLite pool and migrations
//! - [`state_machine`] - Job, candidate and run transition tables
//! - [`orchestration`] - Scheduler, job lifecycle, maintenance and the background loops
//! - [`compute`] - External compute service boundary and its HTTP client
//! - [`tournament`] - ELO voting and pair selection
//! - [`review`] - Approval gates, pruning and winner selection
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gentree_core::config::ConfigManager;
//! use gentree_core::database::{DatabaseConnection, DatabaseMigrations};
//! use gentree_core::tournament::TournamentEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let db = DatabaseConnection::new(&manager.config().database).await?;
//! DatabaseMigrations::run_all(db.pool()).await?;
//!
//! let tournament = TournamentEngine::new(db.pool().clone());
//! if let Some(pair) = tournament.next_pair_for_run(1).await? {
//!     tournament.record_vote(pair.a.id, pair.b.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod compute;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod review;
pub mod state_machine;
pub mod tournament;

pub use config::{ConfigManager, GentreeConfig};
pub use constants::{status_groups, CandidateStatus, JobStatus, RunStatus};
pub use database::{DatabaseConnection, DatabaseMigrations, DbPool};
pub use error::{GentreeError, Result};
pub use orchestration::{OrchestrationSystem, ScheduledUnit, SchedulingMode};
pub use review::{NavigationHint, ReviewService};
pub use tournament::TournamentEngine;
