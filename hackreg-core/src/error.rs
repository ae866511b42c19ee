//! Error taxonomy for the data-access layer
//!
//! Storage drivers report failures as [`NativeError`]s carrying the store's own
//! code. [`translate`] turns those into [`DataError`]s whose [`ErrorKind`] is a
//! closed set callers can match on without knowing which database is behind
//! the engine.

use std::fmt;

use thiserror::Error;

use crate::rbac::{Operation, Role};

/// Result alias used throughout the data layer.
pub type DataResult<T> = Result<T, DataError>;

/// Code reported by the storage driver for a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCode {
    /// MySQL-style numeric errno
    Errno(u32),
    /// Five character SQLSTATE (PostgreSQL)
    SqlState(String),
    /// Driver or socket level symbol such as `ECONNREFUSED`
    Symbol(&'static str),
}

impl fmt::Display for NativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Errno(n) => write!(f, "errno {}", n),
            Self::SqlState(s) => write!(f, "sqlstate {}", s),
            Self::Symbol(s) => f.write_str(s),
        }
    }
}

/// Connection refused by the server or socket.
pub const CONNECTION_REFUSED: &str = "ECONNREFUSED";
/// Socket level timeout.
pub const CONNECTION_TIMED_OUT: &str = "ETIMEDOUT";
/// No pooled connection became free before the acquire timeout.
pub const POOL_TIMED_OUT: &str = "POOL_TIMED_OUT";
/// The pool was closed while waiting.
pub const POOL_CLOSED: &str = "POOL_CLOSED";

/// Failure as reported by the storage driver, before classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct NativeError {
    pub code: NativeCode,
    pub message: String,
}

impl NativeError {
    pub fn new(code: NativeCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn errno(errno: u32, message: impl Into<String>) -> Self {
        Self::new(NativeCode::Errno(errno), message)
    }

    pub fn sql_state(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NativeCode::SqlState(state.into()), message)
    }

    pub fn symbol(symbol: &'static str, message: impl Into<String>) -> Self {
        Self::new(NativeCode::Symbol(symbol), message)
    }
}

impl From<sqlx::Error> for NativeError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => Self::sql_state(code.into_owned(), db.message()),
                None => Self::symbol("DATABASE", db.message()),
            },
            sqlx::Error::PoolTimedOut => Self::symbol(POOL_TIMED_OUT, e.to_string()),
            sqlx::Error::PoolClosed => Self::symbol(POOL_CLOSED, e.to_string()),
            sqlx::Error::Io(io) => match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    Self::symbol(CONNECTION_REFUSED, io.to_string())
                }
                std::io::ErrorKind::TimedOut => Self::symbol(CONNECTION_TIMED_OUT, io.to_string()),
                _ => Self::symbol("IO", io.to_string()),
            },
            _ => Self::symbol("DRIVER", e.to_string()),
        }
    }
}

/// Stable classification of every failure the data layer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedQuery,
    DuplicateKey,
    DependencyMissing,
    ReferencedElsewhere,
    ConnectionUnavailable,
    RequiredFieldNull,
    NotFound,
    UnsupportedOperation,
    Unauthorized,
    Unclassified,
}

impl ErrorKind {
    /// Message suitable for API consumers.
    pub fn message(self) -> &'static str {
        match self {
            Self::MalformedQuery => "the query was ill-formed",
            Self::DuplicateKey => "duplicate objects not allowed",
            Self::DependencyMissing => "object depends on non-existent dependency",
            Self::ReferencedElsewhere => "cannot delete as this object is referenced elsewhere",
            Self::ConnectionUnavailable => "could not connect to the database",
            Self::RequiredFieldNull => "a required property was found to be null",
            Self::NotFound => "no data was found for this query",
            Self::UnsupportedOperation => "this action is not supported",
            Self::Unauthorized => "insufficient permissions for this operation",
            Self::Unclassified => "an unexpected storage error occurred",
        }
    }

    /// Suggested HTTP status code.
    pub fn status(self) -> u16 {
        match self {
            Self::MalformedQuery | Self::ConnectionUnavailable | Self::Unclassified => 500,
            Self::DuplicateKey => 409,
            Self::DependencyMissing | Self::ReferencedElsewhere | Self::RequiredFieldNull => 400,
            Self::NotFound => 404,
            Self::UnsupportedOperation => 501,
            Self::Unauthorized => 403,
        }
    }

    /// Snake case identifier used in response bodies and logs.
    pub fn slug(self) -> &'static str {
        match self {
            Self::MalformedQuery => "malformed_query",
            Self::DuplicateKey => "duplicate_key",
            Self::DependencyMissing => "dependency_missing",
            Self::ReferencedElsewhere => "referenced_elsewhere",
            Self::ConnectionUnavailable => "connection_unavailable",
            Self::RequiredFieldNull => "required_field_null",
            Self::NotFound => "not_found",
            Self::UnsupportedOperation => "unsupported_operation",
            Self::Unauthorized => "unauthorized",
            Self::Unclassified => "unclassified",
        }
    }

    /// True when the fault lies with the server rather than the request.
    pub fn is_server_fault(self) -> bool {
        self.status() >= 500 && self != Self::UnsupportedOperation
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Data layer error.
#[derive(Debug, Error)]
pub enum DataError {
    /// A storage failure that matched a known native code.
    #[error("{}", kind.message())]
    Storage {
        kind: ErrorKind,
        #[source]
        source: NativeError,
    },

    /// The statement produced no rows and affected none.
    #[error("no data was found for this query")]
    NotFound,

    /// The mapper deliberately does not implement this operation.
    #[error("{operation} is not supported for {entity}")]
    UnsupportedOperation {
        entity: &'static str,
        operation: Operation,
    },

    /// The permission registry denied the operation.
    #[error("{role} is not permitted to {operation} {entity}")]
    Unauthorized {
        entity: String,
        operation: Operation,
        role: Role,
    },

    /// A storage failure with no known classification, kept verbatim.
    #[error(transparent)]
    Unclassified(NativeError),

    /// A row could not be turned into the requested entity.
    #[error("could not read row: {0}")]
    Decode(String),
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage { kind, .. } => *kind,
            Self::NotFound => ErrorKind::NotFound,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Unclassified(_) | Self::Decode(_) => ErrorKind::Unclassified,
        }
    }

    pub fn unsupported(entity: &'static str, operation: Operation) -> Self {
        Self::UnsupportedOperation { entity, operation }
    }

    /// The native error behind this failure, if any.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            Self::Storage { source, .. } | Self::Unclassified(source) => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Classify a native code. `None` means no known mapping.
pub fn classify(error: &NativeError) -> Option<ErrorKind> {
    match &error.code {
        NativeCode::Errno(errno) => match errno {
            1064 | 1149 => Some(ErrorKind::MalformedQuery),
            1062 => Some(ErrorKind::DuplicateKey),
            1216 | 1452 => Some(ErrorKind::DependencyMissing),
            1217 | 1451 => Some(ErrorKind::ReferencedElsewhere),
            1048 => Some(ErrorKind::RequiredFieldNull),
            404 => Some(ErrorKind::NotFound),
            _ => None,
        },
        NativeCode::SqlState(state) => match state.as_str() {
            "42601" => Some(ErrorKind::MalformedQuery),
            "23505" => Some(ErrorKind::DuplicateKey),
            "23503" if error.message.starts_with("update or delete") => {
                Some(ErrorKind::ReferencedElsewhere)
            }
            "23503" => Some(ErrorKind::DependencyMissing),
            "23502" => Some(ErrorKind::RequiredFieldNull),
            "57P03" | "57014" => Some(ErrorKind::ConnectionUnavailable),
            s if s.starts_with("08") => Some(ErrorKind::ConnectionUnavailable),
            _ => None,
        },
        NativeCode::Symbol(symbol) => match *symbol {
            CONNECTION_REFUSED | CONNECTION_TIMED_OUT | POOL_TIMED_OUT | POOL_CLOSED => {
                Some(ErrorKind::ConnectionUnavailable)
            }
            _ => None,
        },
    }
}

/// Convert a native failure into a [`DataError`].
///
/// Unknown codes come back as [`DataError::Unclassified`] with the native
/// error intact so the caller can log it.
pub fn translate(error: NativeError) -> DataError {
    tracing::error!(code = %error.code, message = %error.message, "storage error");
    match classify(&error) {
        Some(ErrorKind::NotFound) => DataError::NotFound,
        Some(kind) => DataError::Storage {
            kind,
            source: error,
        },
        None => DataError::Unclassified(error),
    }
}
