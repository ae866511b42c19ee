//! Statement inputs and raw results

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw row as returned by the store: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Positional statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for Scalar {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<u32> for Scalar {
    fn from(n: u32) -> Self {
        Self::Int(n.into())
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Everything the store reported for one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl RawResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            rows,
            rows_affected,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }

    /// No rows returned and none affected.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.rows_affected == 0
    }
}

/// One statement plus its positional parameters.
///
/// The parameter count must match the statement's placeholders; the engine
/// does not check this and a mismatch comes back as a storage error.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub statement: String,
    pub parameters: Vec<Scalar>,
    pub cacheable: bool,
}

impl QueryRequest {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: Vec::new(),
            cacheable: false,
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, value: impl Into<Scalar>) -> Self {
        self.parameters.push(value.into());
        self
    }

    /// Enable cache read-through and write-through for this request.
    pub fn cached(mut self) -> Self {
        self.cacheable = true;
        self
    }

    pub fn with_cache(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }
}
