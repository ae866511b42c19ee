//! Hackathon mapper: read-only access to events and the active hackathon

use async_trait::async_trait;
use hackreg_core::rbac::EntityRules;
use hackreg_core::{
    AccessControlled, DataMapper, DataResult, Operation, PermissionRule, QueryEngine, ReadOptions,
    Role,
};

use super::read_count;
use super::sql::{Select, Table};
use crate::models::Hackathon;

pub(crate) const HACKATHONS: Table = Table {
    name: "hackathon",
    key: "uid",
    columns: &["uid", "name", "start_time", "end_time", "base_pin", "active"],
    required: &["uid", "name"],
};

#[derive(Clone)]
pub struct HackathonMapper {
    engine: QueryEngine,
}

impl HackathonMapper {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    /// The single active hackathon. Cached like every other read.
    pub async fn active(&self) -> DataResult<Hackathon> {
        let request = Select::columns(&HACKATHONS, &[])
            .filter("active", true)
            .build();
        self.engine.execute_one_as(request).await
    }

    /// Uid of the active hackathon.
    pub async fn active_uid(&self) -> DataResult<String> {
        Ok(self.active().await?.uid)
    }
}

impl AccessControlled for HackathonMapper {
    const ENTITY: &'static str = "hackathon";

    fn declare_rules(rules: &mut EntityRules<'_>) {
        rules.rule(PermissionRule::allow(
            [Operation::Read, Operation::ReadAll, Operation::Count],
            Role::ALL,
        ));
    }
}

#[async_trait]
impl DataMapper for HackathonMapper {
    type Entity = Hackathon;
    type Id = str;

    async fn get(&self, id: &str, opts: &ReadOptions) -> DataResult<Hackathon> {
        let request = Select::columns(&HACKATHONS, &opts.fields)
            .filter(HACKATHONS.key, id)
            .build();
        self.engine.execute_one_as(request).await
    }

    async fn get_all(&self, opts: &ReadOptions) -> DataResult<Vec<Hackathon>> {
        let request = Select::columns(&HACKATHONS, &opts.fields)
            .order_by("start_time")
            .page(opts)
            .build();
        self.engine.execute_as(request).await
    }

    async fn get_count(&self, _opts: &ReadOptions) -> DataResult<i64> {
        read_count(&self.engine, Select::count(&HACKATHONS)).await
    }
}
