//! Query execution engine
//!
//! Runs one statement per call:
//!
//! ```text
//! cache lookup ─hit──────────────────────────────────────────────► rows
//!      │miss
//!      ▼
//! acquire ─► BEGIN ─► query ─► empty? ─yes─► ROLLBACK ─► release ─► NotFound
//!                       │          │no
//!                       │err       ▼
//!                       ▼        COMMIT ─► release ─► cache write ─► rows
//!                  ROLLBACK ─► release ─► translate(err)
//! ```
//!
//! The connection lives in a [`Lease`], so it is released exactly once no
//! matter which arm is taken. There are no retries. The cache write finishes
//! before the rows are returned, so an identical read issued right after is a
//! hit. A failed write is logged and never reaches the caller.
//!
//! A statement that returns no rows and affects none is always `NotFound`,
//! including UPDATE and DELETE statements that matched nothing. Callers that
//! expect an empty result must check for that themselves.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{CacheKey, CacheStore};
use crate::connection::{ConnectionProvider, Lease};
use crate::error::{translate, DataError, DataResult};
use crate::query::{QueryRequest, RawResult, Row};

/// Executes statements against a [`ConnectionProvider`] with optional
/// result caching.
#[derive(Clone)]
pub struct QueryEngine {
    provider: Arc<dyn ConnectionProvider>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl QueryEngine {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            cache: None,
        }
    }

    /// Attach a cache store. Without one, `cacheable` requests run uncached.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Execute and return raw rows.
    pub async fn execute(&self, request: QueryRequest) -> DataResult<Vec<Row>> {
        self.execute_with(request, Ok).await
    }

    /// Execute and deserialize every row into `T`.
    pub async fn execute_as<T: DeserializeOwned>(&self, request: QueryRequest) -> DataResult<Vec<T>> {
        self.execute_with(request, |row| {
            serde_json::from_value(Value::Object(row)).map_err(DataError::from)
        })
        .await
    }

    /// Execute and deserialize the first row into `T`.
    pub async fn execute_one_as<T: DeserializeOwned>(&self, request: QueryRequest) -> DataResult<T> {
        self.execute_as(request)
            .await?
            .into_iter()
            .next()
            .ok_or(DataError::NotFound)
    }

    /// Execute and convert each row with `reader`.
    pub async fn execute_with<T, F>(&self, request: QueryRequest, reader: F) -> DataResult<Vec<T>>
    where
        F: Fn(Row) -> DataResult<T>,
    {
        let raw = self.execute_raw(&request).await?;
        raw.rows.iter().cloned().map(reader).collect()
    }

    /// Execute and return the store's full result, possibly shared with the
    /// cache.
    #[tracing::instrument(
        name = "query",
        level = "debug",
        skip_all,
        fields(
            statement = %request.statement,
            params = request.parameters.len(),
            cacheable = request.cacheable,
        )
    )]
    pub async fn execute_raw(&self, request: &QueryRequest) -> DataResult<Arc<RawResult>> {
        let cache = match (&self.cache, request.cacheable) {
            (Some(cache), true) => Some((cache, CacheKey::for_request(request))),
            _ => None,
        };

        if let Some((cache, key)) = &cache {
            if let Some(hit) = lookup(cache, key).await {
                return Ok(hit);
            }
        }

        let raw = Arc::new(self.run(request).await?);

        if let Some((cache, key)) = cache {
            store(cache, key, Arc::clone(&raw)).await;
        }
        Ok(raw)
    }

    async fn run(&self, request: &QueryRequest) -> DataResult<RawResult> {
        let mut lease = Lease::acquire(self.provider.as_ref())
            .await
            .map_err(translate)?;

        let outcome = transact(&mut lease, request).await;
        if outcome.is_err() {
            lease.rollback().await;
        }
        lease.release();
        outcome
    }
}

async fn transact(lease: &mut Lease, request: &QueryRequest) -> DataResult<RawResult> {
    lease.begin().await.map_err(translate)?;
    let raw = lease
        .query(&request.statement, &request.parameters)
        .await
        .map_err(translate)?;
    if raw.is_empty() {
        tracing::debug!("statement matched no rows");
        return Err(DataError::NotFound);
    }
    lease.commit().await.map_err(translate)?;
    Ok(raw)
}

/// Read-through. Cache failures fall back to the store.
async fn lookup(cache: &Arc<dyn CacheStore>, key: &CacheKey) -> Option<Arc<RawResult>> {
    match cache.get(key).await {
        Ok(Some(hit)) => {
            tracing::info!("served request from memory cache");
            Some(hit)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::error!(error = %e, "cache lookup failed, querying store");
            None
        }
    }
}

/// Write-through. Errors are logged and swallowed.
async fn store(cache: &Arc<dyn CacheStore>, key: CacheKey, raw: Arc<RawResult>) {
    if let Err(e) = cache.set(key, raw).await {
        tracing::error!(error = %e, "cache write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, NativeError};
    use crate::cache::MemoryCache;
    use crate::config::CacheConfig;
    use crate::testing::{row, FailingCache, RecordingCache, ScriptedProvider, WriteFailingCache};
    use serde::Deserialize;
    use serde_json::json;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    fn engine(provider: &ScriptedProvider) -> QueryEngine {
        QueryEngine::new(Arc::new(provider.clone()))
    }

    /// Formatted log output collected by a thread-local subscriber.
    #[derive(Clone, Default)]
    struct Logs(Arc<Mutex<Vec<u8>>>);

    impl Logs {
        fn capture() -> (Self, tracing::subscriber::DefaultGuard) {
            let logs = Self::default();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(logs.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .finish();
            (logs, tracing::subscriber::set_default(subscriber))
        }

        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Logs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Logs {
        type Writer = Logs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn success_commits_and_releases() {
        let provider = ScriptedProvider::new().reply_rows(vec![row(json!({"uid": "h1"}))]);
        let rows = engine(&provider)
            .execute(QueryRequest::new("SELECT uid FROM hackathon"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let log = provider.log();
        assert_eq!(log.acquisitions(), 1);
        assert_eq!(log.releases(), 1);
        assert_eq!(log.commits(), 1);
        assert_eq!(log.rollbacks(), 0);
    }

    #[tokio::test]
    async fn empty_result_is_not_found_and_rolled_back() {
        let provider = ScriptedProvider::new().reply_rows(Vec::new());
        let err = engine(&provider)
            .execute(QueryRequest::new("UPDATE hackathon SET active = false WHERE uid = $1").bind("nope"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        let log = provider.log();
        assert_eq!(log.rollbacks(), 1);
        assert_eq!(log.commits(), 0);
        assert_eq!(log.releases(), 1);
    }

    #[tokio::test]
    async fn write_without_returning_is_not_empty() {
        let provider = ScriptedProvider::new().reply_affected(1);
        let rows = engine(&provider)
            .execute(QueryRequest::new("DELETE FROM pre_registration WHERE uid = $1").bind("u1"))
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(provider.log().commits(), 1);
    }

    #[tokio::test]
    async fn duplicate_key_rolls_back_and_releases_once() {
        let provider = ScriptedProvider::new()
            .reply_error(NativeError::errno(1062, "Duplicate entry 'u1' for key 'PRIMARY'"));
        let err = engine(&provider)
            .execute(QueryRequest::new("INSERT INTO pre_registration (uid) VALUES ($1)").bind("u1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        let log = provider.log();
        assert_eq!(log.rollbacks(), 1);
        assert_eq!(log.acquisitions(), 1);
        assert_eq!(log.releases(), 1);
    }

    #[tokio::test]
    async fn every_outcome_releases_exactly_once() {
        let provider = ScriptedProvider::new()
            .reply_rows(vec![row(json!({"n": 1}))])
            .reply_rows(Vec::new())
            .reply_error(NativeError::sql_state("42601", "syntax error at or near \"SELEC\""))
            .reply_error(NativeError::errno(9999, "mystery"))
            .reply_affected(3);
        let engine = engine(&provider);

        for _ in 0..5 {
            let _ = engine.execute(QueryRequest::new("SELECT 1")).await;
        }

        let log = provider.log();
        assert_eq!(log.acquisitions(), 5);
        assert_eq!(log.releases(), 5);
        assert_eq!(log.dirty_releases(), 0);
    }

    #[tokio::test]
    async fn cached_read_hits_store_once() {
        let provider = ScriptedProvider::new().reply_rows(vec![row(json!({"uid": "h1", "name": "Fall"}))]);
        let cache = Arc::new(RecordingCache::default());
        let engine = engine(&provider).with_cache(cache.clone());
        let request = QueryRequest::new("SELECT * FROM hackathon WHERE uid = $1")
            .bind("h1")
            .cached();

        let first = engine.execute(request.clone()).await.unwrap();
        let second = engine.execute(request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.log().queries(), 1);
        assert_eq!(provider.log().acquisitions(), 1);
        assert_eq!(cache.sets(), 1);
    }

    #[tokio::test]
    async fn memory_cache_serves_the_next_identical_read() {
        let provider = ScriptedProvider::new()
            .reply_rows(vec![row(json!({"n": 7}))])
            .reply_rows(vec![row(json!({"n": 8}))]);
        let engine = engine(&provider).with_cache(Arc::new(MemoryCache::new(&CacheConfig::default())));
        let request = QueryRequest::new("SELECT COUNT(*) AS n FROM pre_registration").cached();

        let first = engine.execute(request.clone()).await.unwrap();
        let second = engine.execute(request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second[0]["n"], json!(7));
        assert_eq!(provider.log().queries(), 1);
    }

    #[tokio::test]
    async fn cache_is_not_consulted_for_uncached_requests() {
        let provider = ScriptedProvider::new()
            .reply_rows(vec![row(json!({"n": 1}))])
            .reply_rows(vec![row(json!({"n": 1}))]);
        let cache = Arc::new(RecordingCache::default());
        let engine = engine(&provider).with_cache(cache.clone());

        engine.execute(QueryRequest::new("SELECT 1 AS n")).await.unwrap();
        engine.execute(QueryRequest::new("SELECT 1 AS n")).await.unwrap();

        assert_eq!(provider.log().queries(), 2);
        assert_eq!(cache.gets(), 0);
        assert_eq!(cache.sets(), 0);
    }

    #[tokio::test]
    async fn cached_rows_stay_stale_after_writes() {
        let provider = ScriptedProvider::new()
            .reply_rows(vec![row(json!({"uid": "u1", "email": "old@psu.edu"}))])
            .reply_affected(1)
            .reply_rows(vec![row(json!({"uid": "u1", "email": "new@psu.edu"}))]);
        let cache = Arc::new(RecordingCache::default());
        let engine = engine(&provider).with_cache(cache);
        let read = QueryRequest::new("SELECT * FROM pre_registration WHERE uid = $1")
            .bind("u1")
            .cached();

        engine.execute(read.clone()).await.unwrap();
        engine
            .execute(
                QueryRequest::new("UPDATE pre_registration SET email = $1 WHERE uid = $2")
                    .bind("new@psu.edu")
                    .bind("u1"),
            )
            .await
            .unwrap();
        let again = engine.execute(read).await.unwrap();

        assert_eq!(again[0]["email"], json!("old@psu.edu"));
        assert_eq!(provider.log().queries(), 2);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let provider = ScriptedProvider::new()
            .reply_rows(Vec::new())
            .reply_rows(vec![row(json!({"id": 42}))]);
        let cache = Arc::new(RecordingCache::default());
        let engine = engine(&provider).with_cache(cache.clone());
        let request = QueryRequest::new("SELECT * FROM t WHERE id = $1").bind(42).cached();

        let err = engine.execute(request.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(cache.sets(), 0);

        let rows = engine.execute(request).await.unwrap();
        assert_eq!(rows[0]["id"], json!(42));
    }

    #[tokio::test]
    async fn failing_cache_is_not_fatal() {
        let (logs, _guard) = Logs::capture();
        let provider = ScriptedProvider::new()
            .reply_rows(vec![row(json!({"n": 1}))])
            .reply_rows(Vec::new());
        let engine = engine(&provider).with_cache(Arc::new(FailingCache));
        let request = QueryRequest::new("SELECT $1 AS n").bind(1).cached();

        let rows = engine.execute(request.clone()).await.unwrap();
        assert_eq!(rows.len(), 1);

        let err = engine.execute(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(provider.log().releases(), 2);

        let text = logs.text();
        assert!(text.contains("cache lookup failed"), "{text}");
        assert!(text.contains("cache write failed"), "{text}");
        assert!(text.contains("ERROR"), "{text}");
    }

    #[tokio::test]
    async fn rejected_cache_write_leaves_outcome_unchanged() {
        let (logs, _guard) = Logs::capture();
        let provider = ScriptedProvider::new().reply_rows(vec![row(json!({"uid": "h1"}))]);
        let cache = Arc::new(WriteFailingCache::default());
        let engine = engine(&provider).with_cache(cache.clone());

        let rows = engine
            .execute(QueryRequest::new("SELECT uid FROM hackathon WHERE active").cached())
            .await
            .unwrap();

        assert_eq!(rows, vec![row(json!({"uid": "h1"}))]);
        assert_eq!(cache.gets(), 1);
        assert_eq!(cache.sets(), 1);
        let log = provider.log();
        assert_eq!(log.acquisitions(), 1);
        assert_eq!(log.releases(), 1);
        assert_eq!(log.dirty_releases(), 0);
        assert_eq!(log.commits(), 1);
        assert_eq!(log.rollbacks(), 0);

        let text = logs.text();
        assert!(text.contains("cache write failed"), "{text}");
        assert!(!text.contains("cache lookup failed"), "{text}");
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let provider = ScriptedProvider::new()
            .refusing(NativeError::symbol(crate::error::CONNECTION_REFUSED, "connect ECONNREFUSED"));
        let err = engine(&provider)
            .execute(QueryRequest::new("SELECT 1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);
        assert_eq!(provider.log().releases(), 0);
        assert_eq!(provider.log().begins(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_times_out() {
        let provider = ScriptedProvider::new()
            .with_pool(1, Duration::from_millis(10))
            .reply_rows(vec![row(json!({"n": 1}))]);
        let engine = engine(&provider);

        let held = provider.hold().await.unwrap();
        let started = tokio::time::Instant::now();
        let err = engine.execute(QueryRequest::new("SELECT 1")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(started.elapsed() < Duration::from_secs(1));

        drop(held);
        assert!(engine.execute(QueryRequest::new("SELECT 1")).await.is_ok());
    }

    #[tokio::test]
    async fn reader_maps_rows() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Hackathon {
            uid: String,
            active: bool,
        }

        let provider = ScriptedProvider::new().reply_rows(vec![
            row(json!({"uid": "h1", "active": true})),
            row(json!({"uid": "h0", "active": false})),
        ]);
        let hackathons: Vec<Hackathon> = engine(&provider)
            .execute_as(QueryRequest::new("SELECT uid, active FROM hackathon"))
            .await
            .unwrap();
        assert_eq!(
            hackathons[0],
            Hackathon {
                uid: "h1".into(),
                active: true
            }
        );
        assert_eq!(hackathons.len(), 2);
    }

    #[tokio::test]
    async fn unreadable_row_is_decode_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Strict {
            uid: i64,
        }

        let provider = ScriptedProvider::new().reply_rows(vec![row(json!({"uid": "not a number"}))]);
        let err = engine(&provider)
            .execute_as::<Strict>(QueryRequest::new("SELECT uid FROM t"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Decode(_)));
        // The statement itself succeeded and was committed.
        assert_eq!(provider.log().commits(), 1);
    }
}
