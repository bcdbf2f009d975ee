//! Access Policy
//!
//! The fixed role/operation capability table. Every core operation checks
//! it; nothing else grants access.

use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Role of a resolved caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Auditor,
    Investigator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Auditor => "auditor",
            Role::Investigator => "investigator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "auditor" => Ok(Role::Auditor),
            "investigator" => Ok(Role::Investigator),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Operations gated by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Write,
    List,
    ExportMasked,
    ExportUnmasked,
    Verify,
    AccessReport,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Write,
        Operation::List,
        Operation::ExportMasked,
        Operation::ExportUnmasked,
        Operation::Verify,
        Operation::AccessReport,
    ];
}

/// Whether `role` may perform `operation`. An unresolved caller may do nothing.
pub fn authorize(role: Option<Role>, operation: Operation) -> bool {
    let Some(role) = role else {
        return false;
    };

    match (role, operation) {
        (Role::Admin | Role::Auditor, _) => true,
        (Role::Investigator, Operation::ExportUnmasked | Operation::AccessReport) => false,
        (Role::Investigator, _) => true,
    }
}

/// `authorize` as a `Result`, for use with `?`
pub fn require(role: Option<Role>, operation: Operation) -> Result<Role, AuditError> {
    match role {
        Some(role) if authorize(Some(role), operation) => Ok(role),
        _ => Err(AuditError::AuthorizationError),
    }
}
