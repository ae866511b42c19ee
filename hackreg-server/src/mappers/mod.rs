//! Entity mappers over the query engine
//!
//! Each mapper owns a [`QueryEngine`] handle (cheap to clone) and declares
//! its access rules through [`AccessControlled`](hackreg_core::AccessControlled).

pub mod extra_credit;
pub mod hackathon;
pub mod pre_registration;
mod sql;

pub use extra_credit::ExtraCreditMapper;
pub use hackathon::HackathonMapper;
pub use pre_registration::PreRegistrationMapper;

use hackreg_core::{DataError, DataResult, QueryEngine};
use serde_json::Value;

use sql::Select;

/// Run a `COUNT(..) AS count` select and read the single value back.
async fn read_count(engine: &QueryEngine, select: Select) -> DataResult<i64> {
    let rows = engine.execute(select.build()).await?;
    rows.first()
        .and_then(|row| row.get("count"))
        .and_then(Value::as_i64)
        .ok_or_else(|| DataError::Decode("count column missing from result".into()))
}
