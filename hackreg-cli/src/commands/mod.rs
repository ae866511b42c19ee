//! Command implementations for the hackreg CLI

pub mod access;
pub mod database;

pub use access::{run_authorize, run_matrix};
pub use database::{run_count, run_ping};
