use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use changeflow_auth::{Actor, Role};
use changeflow_core::{AggregateRoot, DomainError, DomainResult, IdentityId};
use changeflow_infra::{Document, FieldValue};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

const DISPLAY_NAME_MAX: usize = 100;

/// Payload for provisioning a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIdentity {
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Fields an administrator may change on an existing identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPatch {
    pub role: Option<Role>,
    pub display_name: Option<String>,
}

/// An actor known to the system.
///
/// Identities are created only through the directory's provisioning step,
/// which assigns the employee number. Credentials live upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    id: IdentityId,
    employee_number: u64,
    email: String,
    display_name: String,
    role: Role,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    version: u64,
}

impl Identity {
    pub(crate) fn provisioned(
        input: NewIdentity,
        employee_number: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: IdentityId::new(),
            employee_number,
            email: normalize_email(&input.email)?,
            display_name: display_name(&input.display_name)?,
            role: input.role,
            active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> IdentityId {
        self.id
    }

    pub fn employee_number(&self) -> u64 {
        self.employee_number
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The authorization view of this identity.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            active: self.active,
        }
    }

    pub(crate) fn apply_patch(&mut self, patch: IdentityPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if patch.role.is_none() && patch.display_name.is_none() {
            return Err(DomainError::validation("update contains no fields"));
        }
        let name = patch.display_name.as_deref().map(display_name).transpose()?;
        if let Some(name) = name {
            self.display_name = name;
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn deactivate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::invalid_transition(format!(
                "identity {} is already inactive",
                self.id
            )));
        }
        self.active = false;
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn touch_login(&mut self, now: DateTime<Utc>) {
        self.last_login_at = Some(now);
    }
}

pub(crate) fn normalize_email(email: &str) -> DomainResult<String> {
    let email = email.trim().to_lowercase();
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(DomainError::validation(format!("'{email}' is not a valid email address")));
    }
    Ok(email)
}

fn display_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("display name is required"));
    }
    if name.chars().count() > DISPLAY_NAME_MAX {
        return Err(DomainError::validation(format!(
            "display name must be at most {DISPLAY_NAME_MAX} characters"
        )));
    }
    Ok(name.to_string())
}

impl AggregateRoot for Identity {
    type Id = IdentityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Document for Identity {
    const COLLECTION: &'static str = "identity";

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "email" => Some(FieldValue::text(self.email.clone())),
            "role" => Some(FieldValue::text(self.role.as_str())),
            "active" => Some(FieldValue::Bool(self.active)),
            "employee_number" => Some(FieldValue::Int(self.employee_number as i64)),
            "created_at" => Some(FieldValue::Time(self.created_at)),
            _ => None,
        }
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewIdentity {
        NewIdentity {
            email: "  Dana.Reyes@Example.com ".into(),
            display_name: "Dana Reyes".into(),
            role: Role::Employee,
        }
    }

    #[test]
    fn provisioning_normalizes_email() {
        let identity = Identity::provisioned(input(), 1001, Utc::now()).unwrap();
        assert_eq!(identity.email(), "dana.reyes@example.com");
        assert_eq!(identity.employee_number(), 1001);
        assert!(identity.is_active());
        assert_eq!(identity.actor().role, Role::Employee);
    }

    #[test]
    fn invalid_email_and_blank_name_are_rejected() {
        let mut bad = input();
        bad.email = "not-an-email".into();
        assert!(Identity::provisioned(bad, 1, Utc::now()).is_err());

        let mut blank = input();
        blank.display_name = " ".into();
        assert!(Identity::provisioned(blank, 1, Utc::now()).is_err());
    }

    #[test]
    fn deactivation_is_one_way() {
        let mut identity = Identity::provisioned(input(), 1, Utc::now()).unwrap();
        identity.deactivate(Utc::now()).unwrap();
        assert!(!identity.actor().active);
        assert!(identity.deactivate(Utc::now()).is_err());
    }

    #[test]
    fn patch_changes_role_and_name() {
        let mut identity = Identity::provisioned(input(), 1, Utc::now()).unwrap();
        identity
            .apply_patch(
                IdentityPatch {
                    role: Some(Role::Manager),
                    display_name: Some("Dana R.".into()),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(identity.role(), Role::Manager);
        assert_eq!(identity.display_name(), "Dana R.");
        assert!(identity.apply_patch(IdentityPatch::default(), Utc::now()).is_err());
    }
}
