//! hackreg-core: data access for the hackathon registration backend
//!
//! Two pieces every entity mapper is built on:
//!
//! - [`QueryEngine`] runs one statement inside a transaction on a pooled
//!   connection, optionally serving or populating a result cache, and
//!   classifies every storage failure into an [`ErrorKind`].
//! - [`PermissionRegistry`] answers whether a role may perform an
//!   [`Operation`] on an entity. Handlers ask it before any mapper runs.

pub mod cache;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod query;
pub mod rbac;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheKey, CacheStore, MemoryCache};
pub use config::HackregConfig;
pub use connection::{Connection, ConnectionProvider, Lease, PgProvider};
pub use engine::QueryEngine;
pub use error::{DataError, DataResult, ErrorKind, NativeError};
pub use mapper::{DataMapper, ReadOptions};
pub use query::{QueryRequest, RawResult, Row, Scalar};
pub use rbac::{AccessControlled, Operation, PermissionRegistry, PermissionRule, Principal, Role};
