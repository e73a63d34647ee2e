//! Shared integration test helpers: a temporary tree store per test, row
//! factories, and a scripted compute service.

#![allow(dead_code)]

pub mod factories;
pub mod mock_compute;
pub mod test_db;

pub use factories::*;
pub use mock_compute::*;
pub use test_db::*;
