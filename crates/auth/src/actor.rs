use serde::{Deserialize, Serialize};

use changeflow_core::IdentityId;

use crate::Role;

/// The acting identity as supplied by the authentication layer.
///
/// Only what authorization needs: who, in which role, and whether the account
/// is still active. Every core operation receives it explicitly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: IdentityId,
    pub role: Role,
    pub active: bool,
}

impl Actor {
    pub fn new(id: IdentityId, role: Role) -> Self {
        Self {
            id,
            role,
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

/// An actor plus the network origin the call arrived from.
///
/// The origin is recorded verbatim on audit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    actor: Actor,
    origin: String,
}

impl Caller {
    pub const UNKNOWN_ORIGIN: &'static str = "unknown";

    pub fn new(actor: Actor, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        let origin = if origin.trim().is_empty() {
            Self::UNKNOWN_ORIGIN.to_string()
        } else {
            origin
        };
        Self { actor, origin }
    }

    pub fn from_actor(actor: Actor) -> Self {
        Self::new(actor, Self::UNKNOWN_ORIGIN)
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn id(&self) -> IdentityId {
        self.actor.id
    }

    pub fn role(&self) -> Role {
        self.actor.role
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}
