//! Extra credit mapper: classes and participant assignments

use async_trait::async_trait;
use hackreg_core::rbac::EntityRules;
use hackreg_core::{
    AccessControlled, DataMapper, DataResult, Operation, PermissionRule, QueryEngine, ReadOptions,
    Role,
};

use super::hackathon::HackathonMapper;
use super::sql::{self, Select, Table};
use crate::models::{ExtraCreditAssignment, ExtraCreditClass};

const ASSIGNMENTS: Table = Table {
    name: "extra_credit_assignment",
    key: "uid",
    columns: &["uid", "user_uid", "class_uid", "hackathon"],
    required: &["uid", "user_uid", "class_uid"],
};

const CLASSES: Table = Table {
    name: "extra_credit_classes",
    key: "uid",
    columns: &["uid", "class_name"],
    required: &["uid", "class_name"],
};

#[derive(Clone)]
pub struct ExtraCreditMapper {
    engine: QueryEngine,
    hackathons: HackathonMapper,
}

impl ExtraCreditMapper {
    pub fn new(engine: QueryEngine, hackathons: HackathonMapper) -> Self {
        Self { engine, hackathons }
    }

    pub async fn get_all_classes(&self, opts: &ReadOptions) -> DataResult<Vec<ExtraCreditClass>> {
        let request = Select::columns(&CLASSES, &[])
            .order_by(CLASSES.key)
            .page(opts)
            .build();
        self.engine.execute_as(request).await
    }
}

impl AccessControlled for ExtraCreditMapper {
    const ENTITY: &'static str = "extra-credit";

    fn declare_rules(rules: &mut EntityRules<'_>) {
        let staff = [Role::Volunteer, Role::TeamMember, Role::Director, Role::Technology];
        rules
            // Participants may only sign themselves up.
            .rule(PermissionRule::allow([Operation::Create], [Role::Participant]).owner_only())
            .rule(PermissionRule::allow([Operation::Create], staff))
            .rule(PermissionRule::allow([Operation::ReadAll], staff))
            .rule(
                PermissionRule::allow([Operation::Delete], [Role::TeamMember, Role::Director, Role::Technology])
                    .deny([Role::Volunteer]),
            );
    }
}

#[async_trait]
impl DataMapper for ExtraCreditMapper {
    type Entity = ExtraCreditAssignment;
    type Id = i64;

    async fn get_all(&self, opts: &ReadOptions) -> DataResult<Vec<ExtraCreditAssignment>> {
        let request = Select::columns(&ASSIGNMENTS, &opts.fields)
            .order_by(ASSIGNMENTS.key)
            .page(opts)
            .build();
        self.engine.execute_as(request).await
    }

    /// Assigns the active hackathon and returns the stored row.
    async fn insert(&self, entity: ExtraCreditAssignment) -> DataResult<ExtraCreditAssignment> {
        let hackathon = self.hackathons.active_uid().await?;
        let request = sql::insert(
            &ASSIGNMENTS,
            vec![
                ("user_uid", entity.user_uid.as_str().into()),
                ("class_uid", entity.class_uid.into()),
                ("hackathon", hackathon.into()),
            ],
            true,
        );
        self.engine.execute_one_as(request).await
    }
}
