//! Entity data mapper contract
//!
//! Every entity exposes the same six operations. An entity that does not
//! support one keeps the default body, which fails with
//! [`DataError::UnsupportedOperation`] instead of quietly doing nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};
use crate::rbac::{AccessControlled, Operation};

/// Options accepted by read operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Columns to select; all columns when empty
    pub fields: Vec<String>,
    /// Rows to skip
    pub start_at: Option<u32>,
    /// Maximum rows to return
    pub count: Option<u32>,
    /// Restrict to one hackathon instead of the active one
    pub by_hackathon: Option<String>,
}

impl ReadOptions {
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn start_at(mut self, offset: u32) -> Self {
        self.start_at = Some(offset);
        self
    }

    pub fn count(mut self, limit: u32) -> Self {
        self.count = Some(limit);
        self
    }

    pub fn by_hackathon(mut self, hackathon: impl Into<String>) -> Self {
        self.by_hackathon = Some(hackathon.into());
        self
    }
}

/// The six operations every entity mapper answers to.
#[async_trait]
pub trait DataMapper: AccessControlled + Send + Sync {
    type Entity: Send + Sync;
    type Id: Send + Sync + ?Sized;

    async fn get(&self, _id: &Self::Id, _opts: &ReadOptions) -> DataResult<Self::Entity> {
        Err(DataError::unsupported(Self::ENTITY, Operation::Read))
    }

    async fn get_all(&self, _opts: &ReadOptions) -> DataResult<Vec<Self::Entity>> {
        Err(DataError::unsupported(Self::ENTITY, Operation::ReadAll))
    }

    async fn get_count(&self, _opts: &ReadOptions) -> DataResult<i64> {
        Err(DataError::unsupported(Self::ENTITY, Operation::Count))
    }

    async fn insert(&self, _entity: Self::Entity) -> DataResult<Self::Entity> {
        Err(DataError::unsupported(Self::ENTITY, Operation::Create))
    }

    async fn update(&self, _entity: Self::Entity) -> DataResult<Self::Entity> {
        Err(DataError::unsupported(Self::ENTITY, Operation::Update))
    }

    async fn delete(&self, _id: &Self::Id) -> DataResult<()> {
        Err(DataError::unsupported(Self::ENTITY, Operation::Delete))
    }
}
