//! Configuration: `~/.hackreg/config.toml` plus environment overrides
//!
//! ```toml
//! [database]
//! url = "postgres://localhost/hackreg"
//! max_connections = 56
//! acquire_timeout_ms = 10000
//!
//! [cache]
//! enabled = true
//! ttl_secs = 300
//! max_entries = 10000
//! ```
//!
//! Environment variables win over the file: `DATABASE_URL`,
//! `HACKREG_MAX_CONNECTIONS`, `HACKREG_ACQUIRE_TIMEOUT_MS`. `HACKREG_CONFIG`
//! points at a different file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HackregConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long to wait for a free pooled connection
    pub acquire_timeout_ms: u64,
    /// Server-side limit on a single statement; 0 disables it
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/hackreg".to_string(),
            max_connections: 56,
            acquire_timeout_ms: 10_000,
            statement_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entries expire this long after being written
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

impl HackregConfig {
    /// Default location: `~/.hackreg/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hackreg/config.toml")
    }

    /// Load configuration.
    ///
    /// An explicit `path` (or `HACKREG_CONFIG`) must exist. The default path
    /// is optional; defaults are used when it is missing. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("HACKREG_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid TOML")
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("HACKREG_MAX_CONNECTIONS") {
            self.database.max_connections = max
                .parse()
                .with_context(|| format!("HACKREG_MAX_CONNECTIONS is not a number: {}", max))?;
        }
        if let Some(timeout) = lookup("HACKREG_ACQUIRE_TIMEOUT_MS") {
            self.database.acquire_timeout_ms = timeout.parse().with_context(|| {
                format!("HACKREG_ACQUIRE_TIMEOUT_MS is not a number: {}", timeout)
            })?;
        }
        if let Some(timeout) = lookup("HACKREG_STATEMENT_TIMEOUT_MS") {
            self.database.statement_timeout_ms = timeout.parse().with_context(|| {
                format!("HACKREG_STATEMENT_TIMEOUT_MS is not a number: {}", timeout)
            })?;
        }
        Ok(())
    }
}
