//! Extra credit classes and the assignments linking participants to them

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// A class that awards extra credit for attending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCreditClass {
    pub uid: i64,
    pub class_name: String,
}

/// A participant asking for extra credit in one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCreditAssignment {
    /// Assigned by the database
    #[serde(default)]
    pub uid: Option<i64>,
    pub user_uid: String,
    pub class_uid: i64,
    #[serde(default)]
    pub hackathon: Option<String>,
}

impl ExtraCreditAssignment {
    pub fn new(user_uid: &str, class_uid: i64) -> Result<Self, ValidationError> {
        let user_uid = user_uid.trim();
        if user_uid.is_empty() {
            return Err(ValidationError::Empty { field: "user_uid" });
        }
        if class_uid < 0 {
            return Err(ValidationError::InvalidFormat {
                field: "class_uid",
                reason: "must not be negative",
            });
        }
        Ok(Self {
            uid: None,
            user_uid: user_uid.to_owned(),
            class_uid,
            hackathon: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_on_construction() {
        assert!(ExtraCreditAssignment::new("user-1", 3).is_ok());
        assert_eq!(
            ExtraCreditAssignment::new(" ", 3).unwrap_err(),
            ValidationError::Empty { field: "user_uid" }
        );
        assert!(ExtraCreditAssignment::new("user-1", -1).is_err());
    }
}
