use core::str::FromStr;

use serde::{Deserialize, Serialize};

use changeflow_core::DomainError;

/// Role of an identity. Closed set; authorization never compares role strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Manager,
    Admin,
    /// External client acting as auditor (read-only on decided requests).
    #[serde(alias = "client")]
    Auditor,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Employee, Role::Manager, Role::Admin, Role::Auditor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Auditor => "auditor",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Employee => "Submits change requests and manages their own pending requests",
            Role::Manager => "Approves or rejects pending requests and drives approved work",
            Role::Admin => "Manages identities, analytics and the audit log",
            Role::Auditor => "Reviews approved, completed and audited requests",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Role::Employee => "Employee",
            Role::Manager => "Manager",
            Role::Admin => "Admin",
            Role::Auditor => "Auditor",
        };
        f.write_str(label)
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            "auditor" | "client" => Ok(Role::Auditor),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_is_an_alias_for_auditor() {
        assert_eq!("Client".parse::<Role>().unwrap(), Role::Auditor);
        let role: Role = serde_json::from_str("\"client\"").unwrap();
        assert_eq!(role, Role::Auditor);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"auditor\"");
    }

    #[test]
    fn unknown_role_is_a_validation_error() {
        assert!(matches!("root".parse::<Role>(), Err(DomainError::Validation(_))));
    }
}
