//! Scripted connection and cache doubles
//!
//! `ScriptedProvider` hands out connections that answer statements from a
//! shared queue of replies and record everything done to them, so tests can
//! assert on acquisition, release, transaction and statement history without
//! a database.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::cache::{CacheError, CacheKey, CacheStore};
use crate::connection::{Connection, ConnectionProvider, Lease};
use crate::error::{NativeError, POOL_TIMED_OUT};
use crate::query::{RawResult, Row, Scalar};

/// Build a row from a JSON object literal. Non-objects give an empty row.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a scripted connection answers to the next statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Result(RawResult),
    Fail(NativeError),
}

#[derive(Debug, Default)]
struct Counters {
    acquisitions: usize,
    releases: usize,
    dirty_releases: usize,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    statements: Vec<(String, Vec<Scalar>)>,
}

/// Shared record of everything done through scripted connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLog {
    inner: Arc<Mutex<Counters>>,
}

impl ConnectionLog {
    fn with<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> R {
        f(&mut lock(&self.inner))
    }

    pub fn acquisitions(&self) -> usize {
        self.with(|c| c.acquisitions)
    }

    pub fn releases(&self) -> usize {
        self.with(|c| c.releases)
    }

    /// Releases that happened with a transaction still open.
    pub fn dirty_releases(&self) -> usize {
        self.with(|c| c.dirty_releases)
    }

    pub fn begins(&self) -> usize {
        self.with(|c| c.begins)
    }

    pub fn commits(&self) -> usize {
        self.with(|c| c.commits)
    }

    pub fn rollbacks(&self) -> usize {
        self.with(|c| c.rollbacks)
    }

    pub fn queries(&self) -> usize {
        self.with(|c| c.statements.len())
    }

    /// Every statement run, with its parameters, in order.
    pub fn statements(&self) -> Vec<(String, Vec<Scalar>)> {
        self.with(|c| c.statements.clone())
    }

    /// The most recent statement.
    pub fn last_statement(&self) -> Option<(String, Vec<Scalar>)> {
        self.with(|c| c.statements.last().cloned())
    }
}

type ReplyQueue = Arc<Mutex<VecDeque<Reply>>>;

/// Connection answering from a reply queue.
pub struct ScriptedConnection {
    log: ConnectionLog,
    replies: ReplyQueue,
    in_transaction: bool,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ScriptedConnection {
    pub fn new(log: ConnectionLog, replies: Vec<Reply>) -> Self {
        Self {
            log,
            replies: Arc::new(Mutex::new(replies.into())),
            in_transaction: false,
            _permit: None,
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn begin_transaction(&mut self) -> Result<(), NativeError> {
        self.log.with(|c| c.begins += 1);
        self.in_transaction = true;
        Ok(())
    }

    async fn query(
        &mut self,
        statement: &str,
        parameters: &[Scalar],
    ) -> Result<RawResult, NativeError> {
        self.log
            .with(|c| c.statements.push((statement.to_owned(), parameters.to_vec())));
        // An exhausted script answers with an empty result.
        match lock(&self.replies).pop_front() {
            Some(Reply::Result(raw)) => Ok(raw),
            Some(Reply::Fail(err)) => Err(err),
            None => Ok(RawResult::default()),
        }
    }

    async fn commit(&mut self) -> Result<(), NativeError> {
        self.log.with(|c| c.commits += 1);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), NativeError> {
        self.log.with(|c| c.rollbacks += 1);
        self.in_transaction = false;
        Ok(())
    }

    fn release(self: Box<Self>) {
        let dirty = self.in_transaction;
        self.log.with(|c| {
            c.releases += 1;
            if dirty {
                c.dirty_releases += 1;
            }
        });
    }
}

/// Provider of scripted connections, optionally bounded like a real pool.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    log: ConnectionLog,
    replies: ReplyQueue,
    pool: Option<(Arc<Semaphore>, Duration)>,
    refusal: Option<NativeError>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> ConnectionLog {
        self.log.clone()
    }

    pub fn reply(self, reply: Reply) -> Self {
        lock(&self.replies).push_back(reply);
        self
    }

    pub fn reply_rows(self, rows: Vec<Row>) -> Self {
        self.reply(Reply::Result(RawResult::from_rows(rows)))
    }

    pub fn reply_affected(self, rows_affected: u64) -> Self {
        self.reply(Reply::Result(RawResult::affected(rows_affected)))
    }

    pub fn reply_error(self, error: NativeError) -> Self {
        self.reply(Reply::Fail(error))
    }

    /// Allow at most `size` connections out at once; waiting longer than
    /// `timeout` fails with `POOL_TIMED_OUT`.
    pub fn with_pool(mut self, size: usize, timeout: Duration) -> Self {
        self.pool = Some((Arc::new(Semaphore::new(size)), timeout));
        self
    }

    /// Fail every acquisition with `error`.
    pub fn refusing(mut self, error: NativeError) -> Self {
        self.refusal = Some(error);
        self
    }

    /// Take a connection and keep it, to exhaust a bounded pool.
    pub async fn hold(&self) -> Result<Lease, NativeError> {
        Lease::acquire(self).await
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    async fn get_connection(&self) -> Result<Box<dyn Connection>, NativeError> {
        if let Some(err) = &self.refusal {
            return Err(err.clone());
        }

        let permit = match &self.pool {
            Some((semaphore, timeout)) => {
                let acquire = Arc::clone(semaphore).acquire_owned();
                match tokio::time::timeout(*timeout, acquire).await {
                    Ok(Ok(permit)) => Some(permit),
                    Ok(Err(_)) => {
                        return Err(NativeError::symbol(crate::error::POOL_CLOSED, "pool closed"))
                    }
                    Err(_) => {
                        return Err(NativeError::symbol(
                            POOL_TIMED_OUT,
                            "timed out waiting for a free connection",
                        ))
                    }
                }
            }
            None => None,
        };

        self.log.with(|c| c.acquisitions += 1);
        Ok(Box::new(ScriptedConnection {
            log: self.log.clone(),
            replies: Arc::clone(&self.replies),
            in_transaction: false,
            _permit: permit,
        }))
    }
}

/// In-memory cache that counts its traffic.
#[derive(Debug, Default)]
pub struct RecordingCache {
    entries: Mutex<HashMap<CacheKey, Arc<RawResult>>>,
    gets: Mutex<usize>,
    sets: Mutex<usize>,
}

impl RecordingCache {
    pub fn gets(&self) -> usize {
        *lock(&self.gets)
    }

    pub fn sets(&self) -> usize {
        *lock(&self.sets)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.entries).contains_key(key)
    }
}

#[async_trait]
impl CacheStore for RecordingCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<RawResult>>, CacheError> {
        *lock(&self.gets) += 1;
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: CacheKey, value: Arc<RawResult>) -> Result<(), CacheError> {
        *lock(&self.sets) += 1;
        lock(&self.entries).insert(key, value);
        Ok(())
    }
}

/// Cache whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Arc<RawResult>>, CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }

    async fn set(&self, _key: CacheKey, _value: Arc<RawResult>) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }
}

/// Cache that always misses and rejects every write.
#[derive(Debug, Default)]
pub struct WriteFailingCache {
    gets: Mutex<usize>,
    sets: Mutex<usize>,
}

impl WriteFailingCache {
    pub fn gets(&self) -> usize {
        *lock(&self.gets)
    }

    pub fn sets(&self) -> usize {
        *lock(&self.sets)
    }
}

#[async_trait]
impl CacheStore for WriteFailingCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Arc<RawResult>>, CacheError> {
        *lock(&self.gets) += 1;
        Ok(None)
    }

    async fn set(&self, _key: CacheKey, _value: Arc<RawResult>) -> Result<(), CacheError> {
        *lock(&self.sets) += 1;
        Err(CacheError::Unavailable("out of memory".into()))
    }
}
