//! Engine behaviour against a live PostgreSQL
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p hackreg-core -- --ignored

use std::sync::Arc;

use hackreg_core::config::DatabaseConfig;
use hackreg_core::{
    CacheStore, ConnectionProvider, ErrorKind, Lease, MemoryCache, PgProvider, QueryEngine,
    QueryRequest,
};
use serde_json::json;

fn database_config(max_connections: u32, acquire_timeout_ms: u64) -> DatabaseConfig {
    DatabaseConfig {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL required"),
        max_connections,
        acquire_timeout_ms,
        ..DatabaseConfig::default()
    }
}

/// Schema setup goes straight to the pool: DDL reports no rows, which the
/// engine would roll back as not found.
async fn scratch_table(provider: &PgProvider, name: &str) {
    let create = format!(
        "CREATE TABLE IF NOT EXISTS {} (id INT PRIMARY KEY, parent INT REFERENCES {}(id), label TEXT NOT NULL)",
        name, name
    );
    sqlx::query(&create).execute(provider.pool()).await.unwrap();
    sqlx::query(&format!("DELETE FROM {}", name))
        .execute(provider.pool())
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn select_returns_decoded_rows() {
    let provider = PgProvider::connect(&database_config(2, 1_000)).await.unwrap();
    let engine = QueryEngine::new(Arc::new(provider));

    let rows = engine
        .execute(
            QueryRequest::new("SELECT $1::int8 AS n, $2::text AS s, true AS b")
                .bind(7)
                .bind("x"),
        )
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], json!(7));
    assert_eq!(rows[0]["s"], json!("x"));
    assert_eq!(rows[0]["b"], json!(true));
}

#[tokio::test]
#[ignore = "requires database"]
async fn constraint_violations_are_classified() {
    let provider = PgProvider::connect(&database_config(2, 1_000)).await.unwrap();
    scratch_table(&provider, "hackreg_engine_it").await;
    let engine = QueryEngine::new(Arc::new(provider));

    engine
        .execute(QueryRequest::new("INSERT INTO hackreg_engine_it (id, label) VALUES (1, 'a')"))
        .await
        .unwrap();

    let dup = engine
        .execute(QueryRequest::new("INSERT INTO hackreg_engine_it (id, label) VALUES (1, 'b')"))
        .await
        .unwrap_err();
    assert_eq!(dup.kind(), ErrorKind::DuplicateKey);

    let missing = engine
        .execute(QueryRequest::new("INSERT INTO hackreg_engine_it (id, parent, label) VALUES (2, 99, 'c')"))
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::DependencyMissing);

    engine
        .execute(QueryRequest::new("INSERT INTO hackreg_engine_it (id, parent, label) VALUES (3, 1, 'd')"))
        .await
        .unwrap();
    let referenced = engine
        .execute(QueryRequest::new("DELETE FROM hackreg_engine_it WHERE id = 1"))
        .await
        .unwrap_err();
    assert_eq!(referenced.kind(), ErrorKind::ReferencedElsewhere);

    let null = engine
        .execute(QueryRequest::new("INSERT INTO hackreg_engine_it (id, label) VALUES (4, NULL)"))
        .await
        .unwrap_err();
    assert_eq!(null.kind(), ErrorKind::RequiredFieldNull);

    let syntax = engine
        .execute(QueryRequest::new("SELEC 1"))
        .await
        .unwrap_err();
    assert_eq!(syntax.kind(), ErrorKind::MalformedQuery);

    let none = engine
        .execute(QueryRequest::new("UPDATE hackreg_engine_it SET label = 'z' WHERE id = 404"))
        .await
        .unwrap_err();
    assert_eq!(none.kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires database"]
async fn exhausted_pool_fails_fast() {
    let provider = PgProvider::connect(&database_config(1, 10)).await.unwrap();
    let held = Lease::acquire(&provider).await.unwrap();
    let engine = QueryEngine::new(Arc::new(provider.clone()));

    let err = engine.execute(QueryRequest::new("SELECT 1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);

    drop(held);
    assert!(provider.get_connection().await.is_ok());
}

#[tokio::test]
#[ignore = "requires database"]
async fn cached_reads_skip_the_pool() {
    let provider = PgProvider::connect(&database_config(1, 50)).await.unwrap();
    let cache = Arc::new(MemoryCache::new(&Default::default()));
    let engine = QueryEngine::new(Arc::new(provider.clone())).with_cache(cache.clone());
    let request = QueryRequest::new("SELECT now() AS t").cached();

    let first = engine.execute(request.clone()).await.unwrap();
    assert!(cache.get(&hackreg_core::CacheKey::for_request(&request)).await.unwrap().is_some());

    // With the only connection held, a hit must not need the pool.
    let _held = Lease::acquire(&provider).await.unwrap();
    let second = engine.execute(request).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
#[ignore = "requires database"]
async fn numeric_and_interval_columns_are_decoded() {
    let provider = PgProvider::connect(&database_config(1, 1_000)).await.unwrap();
    let engine = QueryEngine::new(Arc::new(provider));

    let rows = engine
        .execute(QueryRequest::new(
            "SELECT SUM(x) AS total, AVG(x) AS mean, interval '1 day' AS span, ARRAY['a', 'b'] AS tags \
             FROM (VALUES (1::int8), (2::int8)) AS v(x)",
        ))
        .await
        .unwrap();
    assert_eq!(rows[0]["total"], json!(3));
    assert!(rows[0]["mean"].as_str().unwrap().starts_with("1.5"));
    assert_eq!(rows[0]["span"]["days"], json!(1));
    assert_eq!(rows[0]["tags"], json!(["a", "b"]));
}

#[tokio::test]
#[ignore = "requires database"]
async fn runaway_statement_is_cancelled() {
    let config = DatabaseConfig {
        statement_timeout_ms: 50,
        ..database_config(1, 1_000)
    };
    let provider = PgProvider::connect(&config).await.unwrap();
    let engine = QueryEngine::new(Arc::new(provider));

    let err = engine
        .execute(QueryRequest::new("SELECT pg_sleep(2)"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);
    assert_eq!(err.native().unwrap().code.to_string(), "sqlstate 57014");
}
