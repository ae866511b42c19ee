//! hackreg-server: entity mappers behind an authorization gate
//!
//! Handlers hold an [`AppState`], check the caller with
//! [`gate::authorize`] and only then call a mapper. Failures surface as
//! [`ApiError`], which renders the data layer's classification as an HTTP
//! response.

pub mod error;
pub mod gate;
pub mod mappers;
pub mod models;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{registry, AppState};
