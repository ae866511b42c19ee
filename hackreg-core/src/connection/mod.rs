//! Connection provider interfaces
//!
//! The engine never talks to a driver directly. It asks a
//! [`ConnectionProvider`] for an exclusive [`Connection`] and holds it in a
//! [`Lease`] so the connection goes back exactly once on every exit path,
//! including early returns, errors, and a dropped future.

pub mod postgres;

use async_trait::async_trait;

use crate::error::NativeError;
use crate::query::{RawResult, Scalar};

pub use postgres::PgProvider;

/// Source of pooled connections.
///
/// `get_connection` may wait for a free connection but must give up after the
/// provider's configured timeout with a connection-class [`NativeError`].
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn get_connection(&self) -> Result<Box<dyn Connection>, NativeError>;
}

/// An exclusively owned database connection.
#[async_trait]
pub trait Connection: Send {
    async fn begin_transaction(&mut self) -> Result<(), NativeError>;

    async fn query(
        &mut self,
        statement: &str,
        parameters: &[Scalar],
    ) -> Result<RawResult, NativeError>;

    async fn commit(&mut self) -> Result<(), NativeError>;

    async fn rollback(&mut self) -> Result<(), NativeError>;

    /// Hand the connection back to its pool. Consuming `self` makes a second
    /// release impossible.
    fn release(self: Box<Self>);
}

/// Scoped ownership of one connection.
///
/// Dropping the lease releases the connection. A lease dropped with a
/// transaction still open logs a warning; the connection implementation is
/// responsible for not returning a dirty connection to its pool.
pub struct Lease {
    conn: Option<Box<dyn Connection>>,
    in_transaction: bool,
}

impl Lease {
    pub fn new(conn: Box<dyn Connection>) -> Self {
        Self {
            conn: Some(conn),
            in_transaction: false,
        }
    }

    /// Acquire a connection from `provider` and wrap it.
    pub async fn acquire(provider: &dyn ConnectionProvider) -> Result<Self, NativeError> {
        provider.get_connection().await.map(Self::new)
    }

    fn conn(&mut self) -> Result<&mut Box<dyn Connection>, NativeError> {
        self.conn
            .as_mut()
            .ok_or_else(|| NativeError::symbol("LEASE_RELEASED", "connection already released"))
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub async fn begin(&mut self) -> Result<(), NativeError> {
        self.conn()?.begin_transaction().await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn query(
        &mut self,
        statement: &str,
        parameters: &[Scalar],
    ) -> Result<RawResult, NativeError> {
        self.conn()?.query(statement, parameters).await
    }

    pub async fn commit(&mut self) -> Result<(), NativeError> {
        self.conn()?.commit().await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back if a transaction is open. Failures are logged, not returned,
    /// because rollback only ever runs on a path that already has an error to
    /// report.
    pub async fn rollback(&mut self) {
        if !self.in_transaction {
            return;
        }
        match self.conn() {
            Ok(conn) => {
                if let Err(e) = conn.rollback().await {
                    tracing::error!(error = %e, "rollback failed");
                    return;
                }
                tracing::debug!("transaction rolled back");
                self.in_transaction = false;
            }
            Err(e) => tracing::error!(error = %e, "rollback on released lease"),
        }
    }

    /// Release now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.in_transaction {
                tracing::warn!("releasing connection with an open transaction");
            }
            conn.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ConnectionLog, ScriptedConnection};

    #[tokio::test]
    async fn dropping_lease_releases_once() {
        let log = ConnectionLog::default();
        let conn = ScriptedConnection::new(log.clone(), Vec::new());
        {
            let mut lease = Lease::new(Box::new(conn));
            lease.begin().await.unwrap();
            lease.commit().await.unwrap();
        }
        assert_eq!(log.releases(), 1);
        assert_eq!(log.commits(), 1);
    }

    #[tokio::test]
    async fn rollback_without_transaction_is_noop() {
        let log = ConnectionLog::default();
        let mut lease = Lease::new(Box::new(ScriptedConnection::new(log.clone(), Vec::new())));
        lease.rollback().await;
        lease.release();
        assert_eq!(log.rollbacks(), 0);
        assert_eq!(log.releases(), 1);
    }
}
