//! Role-based access control
//!
//! Roles are a flat set with no hierarchy. Every entity declares which roles
//! may perform which [`Operation`]s once, when the
//! [`PermissionRegistry`](registry::PermissionRegistry) is built, and the
//! table never changes afterwards.

pub mod registry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use registry::{
    AccessControlled, EntityRules, MatrixEntry, OwnershipPredicate, PermissionRegistry,
    PermissionRule, RegistryBuilder,
};

/// Coarse permission level of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Participant,
    Volunteer,
    TeamMember,
    Director,
    Technology,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Participant,
        Role::Volunteer,
        Role::TeamMember,
        Role::Director,
        Role::Technology,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Volunteer => "volunteer",
            Self::TeamMember => "team_member",
            Self::Director => "director",
            Self::Technology => "technology",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "participant" => Ok(Self::Participant),
            "volunteer" => Ok(Self::Volunteer),
            "team_member" => Ok(Self::TeamMember),
            "director" => Ok(Self::Director),
            "technology" => Ok(Self::Technology),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Operation a mapper can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    ReadAll,
    Update,
    Delete,
    Count,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Create,
        Operation::Read,
        Operation::ReadAll,
        Operation::Update,
        Operation::Delete,
        Operation::Count,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::ReadAll => "readall",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Count => "count",
        }
    }

    /// Permission string for `entity`, e.g. `pre-registration:readall`.
    pub fn permission(self, entity: &str) -> String {
        format!("{}:{}", entity, self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "readall" => Ok(Self::ReadAll),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "count" => Ok(Self::Count),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// The authenticated actor behind a request.
///
/// A principal without an id never satisfies a rule limited to the caller's
/// own records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Option<String>,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: Some(id.into()),
            role,
        }
    }

    /// A caller known only by role.
    pub fn anonymous(role: Role) -> Self {
        Self { id: None, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!("TEAM-MEMBER".parse::<Role>(), Ok(Role::TeamMember));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn operation_parse_accepts_separators() {
        assert_eq!("read_all".parse::<Operation>(), Ok(Operation::ReadAll));
        assert_eq!("READALL".parse::<Operation>(), Ok(Operation::ReadAll));
        assert!("list".parse::<Operation>().is_err());
    }

    #[test]
    fn permission_string() {
        assert_eq!(
            Operation::ReadAll.permission("pre-registration"),
            "pre-registration:readall"
        );
    }
}
