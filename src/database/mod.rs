//! # Database Operations
//!
//! Tree store connection management and schema migrations.
//!
//! ## Key Components
//!
//! - [`connection`] - SQLite pool setup (WAL journal, busy timeout, foreign keys)
//! - [`migrations`] - Embedded schema migrations from `migrations/`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gentree_core::config::DatabaseConfig;
//! use gentree_core::database::{DatabaseConnection, DatabaseMigrations};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::new(&DatabaseConfig::default()).await?;
//! DatabaseMigrations::run_all(db.pool()).await?;
//! assert!(db.health_check().await?);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrations;

pub use connection::{DatabaseConnection, DbPool};
pub use migrations::DatabaseMigrations;
