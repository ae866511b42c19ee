//! Permission registry
//!
//! Built once through [`RegistryBuilder`], then frozen into a
//! [`PermissionRegistry`] that is shared by reference. Decisions are pure
//! functions of the frozen table:
//!
//! 1. a role listed as denied for (entity, operation) is refused,
//! 2. otherwise a role named by a grant is allowed, provided that grant's
//!    ownership predicate (if any) holds for the principal and target,
//! 3. anything else, including an (entity, operation) with no rules, is
//!    refused.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{Operation, Principal, Role};
use crate::error::DataError;

/// Narrows a role grant to the principal's own records.
///
/// Called as `predicate(principal_id, target_owner_id)`.
pub type OwnershipPredicate = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// One access declaration: these roles may perform these operations.
#[derive(Clone)]
pub struct PermissionRule {
    operations: BTreeSet<Operation>,
    allowed: BTreeSet<Role>,
    denied: BTreeSet<Role>,
    ownership: Option<OwnershipPredicate>,
}

impl PermissionRule {
    pub fn allow(
        operations: impl IntoIterator<Item = Operation>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            allowed: roles.into_iter().collect(),
            denied: BTreeSet::new(),
            ownership: None,
        }
    }

    /// A rule that only denies.
    pub fn forbid(
        operations: impl IntoIterator<Item = Operation>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            allowed: BTreeSet::new(),
            denied: roles.into_iter().collect(),
            ownership: None,
        }
    }

    /// Refuse these roles for the rule's operations, whatever else allows them.
    pub fn deny(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.denied.extend(roles);
        self
    }

    /// Only allow when `predicate(principal_id, target_owner_id)` holds.
    pub fn owned_by<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.ownership = Some(Arc::new(predicate));
        self
    }

    /// Shorthand for an ownership predicate requiring identical ids.
    pub fn owner_only(self) -> Self {
        self.owned_by(|principal, target| principal == target)
    }
}

impl fmt::Debug for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionRule")
            .field("operations", &self.operations)
            .field("allowed", &self.allowed)
            .field("denied", &self.denied)
            .field("ownership", &self.ownership.is_some())
            .finish()
    }
}

#[derive(Clone)]
struct Grant {
    roles: BTreeSet<Role>,
    ownership: Option<OwnershipPredicate>,
}

#[derive(Clone, Default)]
struct AccessEntry {
    grants: Vec<Grant>,
    denied: BTreeSet<Role>,
}

impl AccessEntry {
    fn decide(&self, role: Role, principal_id: Option<&str>, target_owner_id: Option<&str>) -> bool {
        if self.denied.contains(&role) {
            return false;
        }
        self.grants
            .iter()
            .filter(|grant| grant.roles.contains(&role))
            .any(|grant| match &grant.ownership {
                None => true,
                Some(predicate) => match (principal_id, target_owner_id) {
                    (Some(principal), Some(target)) => predicate(principal, target),
                    _ => false,
                },
            })
    }
}

type Table = BTreeMap<String, BTreeMap<Operation, AccessEntry>>;

/// Collects rules before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    table: Table,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for `entity`. Rules are additive; denials from any rule
    /// override grants from every rule.
    pub fn register_rule(&mut self, entity: &str, rule: PermissionRule) -> &mut Self {
        let operations = self.table.entry(entity.to_owned()).or_default();
        for op in &rule.operations {
            let entry = operations.entry(*op).or_default();
            if !rule.allowed.is_empty() {
                entry.grants.push(Grant {
                    roles: rule.allowed.clone(),
                    ownership: rule.ownership.clone(),
                });
            }
            entry.denied.extend(rule.denied.iter().copied());
        }
        self
    }

    /// Let an entity declare its own rules.
    pub fn declare<E: AccessControlled>(&mut self) -> &mut Self {
        E::declare_rules(&mut EntityRules {
            builder: self,
            entity: E::ENTITY,
        });
        self
    }

    pub fn build(self) -> PermissionRegistry {
        tracing::debug!(entities = self.table.len(), "permission registry frozen");
        PermissionRegistry { table: self.table }
    }
}

/// Rules scoped to a single entity, handed to [`AccessControlled::declare_rules`].
pub struct EntityRules<'a> {
    builder: &'a mut RegistryBuilder,
    entity: &'static str,
}

impl EntityRules<'_> {
    pub fn rule(&mut self, rule: PermissionRule) -> &mut Self {
        self.builder.register_rule(self.entity, rule);
        self
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }
}

/// An entity with a statically declared access matrix.
pub trait AccessControlled {
    const ENTITY: &'static str;

    fn declare_rules(rules: &mut EntityRules<'_>);

    /// Permission string for `op` on this entity.
    fn permission(op: Operation) -> String {
        op.permission(Self::ENTITY)
    }
}

/// Immutable access table.
#[derive(Clone, Default)]
pub struct PermissionRegistry {
    table: Table,
}

impl PermissionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Decide whether `role` may perform `operation` on `entity`.
    ///
    /// `principal_id` and `target_owner_id` only matter for grants with an
    /// ownership predicate; when either is missing such a grant does not
    /// apply.
    pub fn is_authorized(
        &self,
        entity: &str,
        operation: Operation,
        role: Role,
        principal_id: Option<&str>,
        target_owner_id: Option<&str>,
    ) -> bool {
        let allowed = self
            .table
            .get(entity)
            .and_then(|ops| ops.get(&operation))
            .is_some_and(|entry| entry.decide(role, principal_id, target_owner_id));
        if !allowed {
            tracing::debug!(entity, %operation, %role, "access denied");
        }
        allowed
    }

    /// [`is_authorized`](Self::is_authorized) for a principal, as a `Result`.
    pub fn check(
        &self,
        entity: &str,
        operation: Operation,
        principal: &Principal,
        target_owner_id: Option<&str>,
    ) -> Result<(), DataError> {
        if self.is_authorized(
            entity,
            operation,
            principal.role,
            principal.id.as_deref(),
            target_owner_id,
        ) {
            Ok(())
        } else {
            Err(DataError::Unauthorized {
                entity: entity.to_owned(),
                operation,
                role: principal.role,
            })
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Every registered (entity, operation) with its effective roles.
    pub fn matrix(&self) -> Vec<MatrixEntry> {
        self.table
            .iter()
            .flat_map(|(entity, ops)| {
                ops.iter().map(move |(op, entry)| {
                    let granted = |gated: bool| -> Vec<Role> {
                        entry
                            .grants
                            .iter()
                            .filter(|g| g.ownership.is_some() == gated)
                            .flat_map(|g| g.roles.iter().copied())
                            .filter(|role| !entry.denied.contains(role))
                            .collect::<BTreeSet<_>>()
                            .into_iter()
                            .collect()
                    };
                    let allowed = granted(false);
                    let owner_gated = granted(true)
                        .into_iter()
                        .filter(|role| !allowed.contains(role))
                        .collect();
                    MatrixEntry {
                        entity: entity.clone(),
                        operation: *op,
                        allowed,
                        owner_gated,
                        denied: entry.denied.iter().copied().collect(),
                    }
                })
            })
            .collect()
    }
}

/// One row of the access matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    pub entity: String,
    pub operation: Operation,
    /// Roles allowed unconditionally
    pub allowed: Vec<Role>,
    /// Roles allowed only on their own records
    pub owner_gated: Vec<Role>,
    pub denied: Vec<Role>,
}
