//! PostgreSQL connection provider backed by an sqlx pool

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Either, Executor, Postgres, Row as _, TypeInfo, ValueRef};

use super::{Connection, ConnectionProvider};
use crate::config::DatabaseConfig;
use crate::error::NativeError;
use crate::query::{RawResult, Row, Scalar};

/// Connection provider over a bounded `PgPool`.
///
/// Acquisition waits at most `acquire_timeout_ms`; an exhausted pool then
/// fails with `POOL_TIMED_OUT`. Every session runs with `statement_timeout`
/// set from `statement_timeout_ms`, so a runaway statement is cancelled by
/// the server with SQLSTATE 57014.
#[derive(Clone)]
pub struct PgProvider {
    pool: PgPool,
}

impl PgProvider {
    fn options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
    }

    fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, NativeError> {
        let options = PgConnectOptions::from_str(&config.url)?
            .options([("statement_timeout", config.statement_timeout_ms)]);
        Ok(options)
    }

    /// Connect eagerly, failing if the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, NativeError> {
        let pool = Self::options(config)
            .connect_with(Self::connect_options(config)?)
            .await
            .map_err(NativeError::from)?;
        tracing::info!(
            max_connections = config.max_connections,
            acquire_timeout_ms = config.acquire_timeout_ms,
            statement_timeout_ms = config.statement_timeout_ms,
            "database pool ready"
        );
        Ok(Self { pool })
    }

    /// Build the pool without opening a connection until first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, NativeError> {
        let pool = Self::options(config).connect_lazy_with(Self::connect_options(config)?);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionProvider for PgProvider {
    async fn get_connection(&self) -> Result<Box<dyn Connection>, NativeError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgConnection {
            conn,
            in_transaction: false,
        }))
    }
}

struct PgConnection {
    conn: PoolConnection<Postgres>,
    in_transaction: bool,
}

impl PgConnection {
    async fn control(&mut self, statement: &'static str) -> Result<(), NativeError> {
        sqlx::query(statement).execute(&mut *self.conn).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn begin_transaction(&mut self) -> Result<(), NativeError> {
        self.control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn query(
        &mut self,
        statement: &str,
        parameters: &[Scalar],
    ) -> Result<RawResult, NativeError> {
        let mut query = sqlx::query(statement);
        for param in parameters {
            query = match param {
                Scalar::Bool(b) => query.bind(*b),
                Scalar::Int(n) => query.bind(*n),
                Scalar::Float(x) => query.bind(*x),
                Scalar::Text(s) => query.bind(s.as_str()),
            };
        }

        let mut result = RawResult::default();
        let mut stream = (&mut *self.conn).fetch_many(query);
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => result.rows_affected += done.rows_affected(),
                Either::Right(row) => result.rows.push(decode_row(&row)),
            }
        }
        Ok(result)
    }

    async fn commit(&mut self) -> Result<(), NativeError> {
        self.control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), NativeError> {
        self.control("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    fn release(self: Box<Self>) {
        let this = *self;
        if this.in_transaction {
            // Never hand the pool a connection mid-transaction.
            drop(this.conn.detach());
        }
    }
}

/// Decode a row into a JSON object keyed by column name.
fn decode_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|col| {
            let value = decode_column(row, col.ordinal(), col.type_info().name());
            (col.name().to_owned(), value)
        })
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }

    let decoded = match type_name {
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::from),
        "INT2" => row.try_get::<i16, _>(idx).map(Value::from),
        "INT4" => row.try_get::<i32, _>(idx).map(Value::from),
        "INT8" => row.try_get::<i64, _>(idx).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|x| Value::from(f64::from(x))),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(Value::from),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(idx)
            .map(|u| Value::String(u.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|t| Value::String(t.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|t| Value::String(t.to_string())),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map(|d| Value::String(d.to_string())),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx),
        "NUMERIC" => row.try_get::<BigDecimal, _>(idx).map(numeric_value),
        "INTERVAL" => row.try_get::<PgInterval, _>(idx).map(interval_value),
        "BOOL[]" => row.try_get::<Vec<bool>, _>(idx).map(Value::from),
        "INT2[]" => row.try_get::<Vec<i16>, _>(idx).map(Value::from),
        "INT4[]" => row.try_get::<Vec<i32>, _>(idx).map(Value::from),
        "INT8[]" => row.try_get::<Vec<i64>, _>(idx).map(Value::from),
        "FLOAT8[]" => row.try_get::<Vec<f64>, _>(idx).map(Value::from),
        "TEXT[]" | "VARCHAR[]" => row.try_get::<Vec<String>, _>(idx).map(Value::from),
        _ => row.try_get::<String, _>(idx).map(Value::String),
    };

    decoded.unwrap_or_else(|e| {
        tracing::warn!(column = idx, type_name, error = %e, "column not decodable, using null");
        Value::Null
    })
}

/// Whole values that fit an `i64` become JSON numbers; anything else keeps
/// its exact decimal text.
fn numeric_value(n: BigDecimal) -> Value {
    match n.is_integer().then(|| n.to_i64()).flatten() {
        Some(whole) => Value::from(whole),
        None => Value::String(n.to_string()),
    }
}

fn interval_value(interval: PgInterval) -> Value {
    serde_json::json!({
        "months": interval.months,
        "days": interval.days,
        "microseconds": interval.microseconds,
    })
}
