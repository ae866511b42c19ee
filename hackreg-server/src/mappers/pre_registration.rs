//! Pre-registration mapper

use async_trait::async_trait;
use hackreg_core::rbac::EntityRules;
use hackreg_core::{
    AccessControlled, DataMapper, DataResult, Operation, PermissionRule, QueryEngine, ReadOptions,
    Role,
};

use super::hackathon::HackathonMapper;
use super::read_count;
use super::sql::{self, Select, Table};
use crate::models::PreRegistration;

const PRE_REGISTRATIONS: Table = Table {
    name: "pre_registration",
    key: "uid",
    columns: &["uid", "email", "hackathon"],
    required: &["uid", "email"],
};

#[derive(Clone)]
pub struct PreRegistrationMapper {
    engine: QueryEngine,
    hackathons: HackathonMapper,
}

impl PreRegistrationMapper {
    pub fn new(engine: QueryEngine, hackathons: HackathonMapper) -> Self {
        Self { engine, hackathons }
    }

    async fn hackathon_for(&self, opts: &ReadOptions) -> DataResult<String> {
        match &opts.by_hackathon {
            Some(uid) => Ok(uid.clone()),
            None => self.hackathons.active_uid().await,
        }
    }
}

impl AccessControlled for PreRegistrationMapper {
    const ENTITY: &'static str = "pre-registration";

    fn declare_rules(rules: &mut EntityRules<'_>) {
        rules
            .rule(PermissionRule::allow(
                [Operation::Delete],
                [Role::Director, Role::Technology],
            ))
            .rule(PermissionRule::allow(
                [Operation::ReadAll],
                [Role::Volunteer, Role::TeamMember, Role::Director, Role::Technology],
            ))
            .rule(PermissionRule::allow(
                [Operation::Read, Operation::Update, Operation::Create],
                Role::ALL,
            ));
    }
}

#[async_trait]
impl DataMapper for PreRegistrationMapper {
    type Entity = PreRegistration;
    type Id = str;

    async fn get(&self, id: &str, opts: &ReadOptions) -> DataResult<PreRegistration> {
        let request = Select::columns(&PRE_REGISTRATIONS, &opts.fields)
            .filter(PRE_REGISTRATIONS.key, id)
            .build();
        self.engine.execute_one_as(request).await
    }

    /// Pre-registrations for `opts.by_hackathon`, or the active hackathon.
    async fn get_all(&self, opts: &ReadOptions) -> DataResult<Vec<PreRegistration>> {
        let hackathon = self.hackathon_for(opts).await?;
        let request = Select::columns(&PRE_REGISTRATIONS, &opts.fields)
            .filter("hackathon", hackathon)
            .page(opts)
            .build();
        self.engine.execute_as(request).await
    }

    /// Counts every hackathon unless `opts.by_hackathon` narrows it.
    async fn get_count(&self, opts: &ReadOptions) -> DataResult<i64> {
        let mut select = Select::count(&PRE_REGISTRATIONS);
        if let Some(hackathon) = &opts.by_hackathon {
            select = select.filter("hackathon", hackathon);
        }
        read_count(&self.engine, select).await
    }

    async fn insert(&self, mut entity: PreRegistration) -> DataResult<PreRegistration> {
        let hackathon = self.hackathons.active_uid().await?;
        let request = sql::insert(
            &PRE_REGISTRATIONS,
            vec![
                ("uid", entity.uid.as_str().into()),
                ("email", entity.email.as_str().into()),
                ("hackathon", hackathon.as_str().into()),
            ],
            false,
        );
        self.engine.execute(request).await?;
        tracing::info!(uid = %entity.uid, hackathon = %hackathon, "pre-registration added");
        entity.hackathon = Some(hackathon);
        Ok(entity)
    }

    /// Zero matching rows comes back as not found.
    async fn update(&self, entity: PreRegistration) -> DataResult<PreRegistration> {
        let request = sql::update(
            &PRE_REGISTRATIONS,
            vec![("email", entity.email.as_str().into())],
            entity.uid.as_str(),
        );
        self.engine.execute(request).await?;
        Ok(entity)
    }
}
