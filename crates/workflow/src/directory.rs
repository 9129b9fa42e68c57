//! Identity provisioning and administration.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::json;

use changeflow_audit::{AuditAction, AuditSink, NewAuditRecord};
use changeflow_auth::{Action, Actor, Caller, Role};
use changeflow_core::{AggregateRoot, DomainError, DomainResult, ExpectedVersion, IdentityId};
use changeflow_infra::{Collection, FieldValue, Filter, Page, Pagination, StoreError};

use crate::guard::{Attempt, authorize};
use crate::identity::{Identity, IdentityPatch, NewIdentity, normalize_email};
use crate::lifecycle::MAX_SAVE_ATTEMPTS;

/// Employee numbers start above this value.
pub const EMPLOYEE_NUMBER_BASE: u64 = 1000;

/// Why a login was refused. Recorded, never shown to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginFailure {
    UnknownIdentity,
    Inactive,
    BadCredentials,
    StorageFault,
}

impl LoginFailure {
    fn as_str(&self) -> &'static str {
        match self {
            LoginFailure::UnknownIdentity => "unknown_identity",
            LoginFailure::Inactive => "inactive",
            LoginFailure::BadCredentials => "bad_credentials",
            LoginFailure::StorageFault => "storage_fault",
        }
    }
}

/// Admin-facing identity management plus login bookkeeping.
///
/// Provisioning is an explicit step: the email is validated and checked for
/// duplicates and the next employee number is assigned before the identity
/// is inserted. Nothing happens implicitly on save.
#[derive(Debug)]
pub struct IdentityDirectory<I, A> {
    identities: I,
    audit: A,
    last_employee_number: AtomicU64,
}

impl<I, A> IdentityDirectory<I, A>
where
    I: Collection<Identity>,
    A: AuditSink,
{
    /// Build a directory, seeding the employee-number sequence from the
    /// highest number already stored.
    pub fn new(identities: I, audit: A) -> DomainResult<Self> {
        let highest = identities
            .aggregate_by_field(&Filter::new(), "employee_number")?
            .keys()
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(EMPLOYEE_NUMBER_BASE);
        Ok(Self {
            identities,
            audit,
            last_employee_number: AtomicU64::new(highest.max(EMPLOYEE_NUMBER_BASE)),
        })
    }

    pub fn provision(&self, caller: &Caller, input: NewIdentity) -> DomainResult<Identity> {
        let result = self.provision_inner(caller, input);
        let attempt = Attempt::new(caller, "provision_identity", AuditAction::IdentityCreated);
        let attempt = match &result {
            Ok(identity) => attempt.target(identity.id_typed()),
            Err(_) => attempt,
        };
        attempt.record(&self.audit, &result, |identity| {
            Some(json!({
                "email": identity.email(),
                "role": identity.role(),
                "employee_number": identity.employee_number(),
            }))
        });
        result
    }

    fn provision_inner(&self, caller: &Caller, input: NewIdentity) -> DomainResult<Identity> {
        authorize(caller, Action::ManageIdentities, None)?;

        let email = normalize_email(&input.email)?;
        let taken = self
            .identities
            .count_by_filter(&Filter::new().eq("email", email.as_str()))?;
        if taken > 0 {
            return Err(DomainError::validation(format!("email '{email}' is already registered")));
        }

        let number = self.last_employee_number.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = Identity::provisioned(input, number, Utc::now())?;
        let stored = self.identities.insert(identity)?;
        tracing::info!(
            identity_id = %stored.id_typed(),
            actor_id = %caller.id(),
            role = %stored.role(),
            employee_number = number,
            "identity provisioned"
        );
        Ok(stored)
    }

    /// Admins may read any identity; everyone may read their own.
    pub fn get(&self, caller: &Caller, id: IdentityId) -> DomainResult<Identity> {
        let allowed = if caller.id() == id && caller.actor().active {
            Ok(())
        } else {
            authorize(caller, Action::ManageIdentities, None)
        };
        if allowed.is_err() {
            Attempt::new(caller, "get_identity", AuditAction::AccessDenied)
                .target(id)
                .record(&self.audit, &allowed, |_| None);
        }
        allowed?;
        self.load(id)
    }

    /// Identities, newest first, optionally narrowed to one role. Admin only.
    pub fn list(&self, caller: &Caller, role: Option<Role>, pagination: Pagination) -> DomainResult<Page<Identity>> {
        let allowed = authorize(caller, Action::ManageIdentities, None);
        if allowed.is_err() {
            Attempt::new(caller, "list_identities", AuditAction::AccessDenied)
                .record(&self.audit, &allowed, |_| None);
        }
        allowed?;

        let filter = match role {
            Some(role) => Filter::new().eq("role", role.as_str()),
            None => Filter::new(),
        };
        Ok(self.identities.find(&filter, pagination)?)
    }

    pub fn update(&self, caller: &Caller, id: IdentityId, patch: IdentityPatch) -> DomainResult<Identity> {
        let changed = json!({
            "role": patch.role,
            "display_name": patch.display_name,
        });
        let result = authorize(caller, Action::ManageIdentities, None).and_then(|()| {
            self.modify(caller, id, |identity| identity.apply_patch(patch.clone(), Utc::now()))
        });
        Attempt::new(caller, "update_identity", AuditAction::IdentityUpdated)
            .target(id)
            .record(&self.audit, &result, |_| Some(changed));
        result
    }

    /// Role is checked before the self-check, so non-admins see the role denial.
    pub fn deactivate(&self, caller: &Caller, id: IdentityId) -> DomainResult<Identity> {
        let result = authorize(caller, Action::ManageIdentities, None)
            .and_then(|()| not_self(caller, id, "deactivate"))
            .and_then(|()| self.modify(caller, id, |identity| identity.deactivate(Utc::now())));
        Attempt::new(caller, "deactivate_identity", AuditAction::IdentityDeactivated)
            .target(id)
            .record(&self.audit, &result, |_| None);
        result
    }

    /// Remove an identity. Requests keep their references to it.
    pub fn delete(&self, caller: &Caller, id: IdentityId) -> DomainResult<()> {
        let result = authorize(caller, Action::ManageIdentities, None)
            .and_then(|()| not_self(caller, id, "delete"))
            .and_then(|()| self.delete_inner(caller, id));
        Attempt::new(caller, "delete_identity", AuditAction::IdentityDeleted)
            .target(id)
            .record(&self.audit, &result, |email| Some(json!({ "email": email })));
        result.map(|_| ())
    }

    fn delete_inner(&self, caller: &Caller, id: IdentityId) -> DomainResult<String> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let identity = self.load(id)?;
            match self
                .identities
                .delete_by_id(&id, ExpectedVersion::Exact(identity.version()))
            {
                Ok(()) => {
                    tracing::info!(identity_id = %id, actor_id = %caller.id(), "identity deleted");
                    return Ok(identity.email().to_string());
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(identity_id = %id, "identity delete lost a race, re-checking");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(contended(id))
    }

    /// Record a login attempt whose credentials were checked upstream.
    ///
    /// Unknown, inactive and badly-authenticated identities all fail with the
    /// same `Forbidden` message; the audit record carries the real cause.
    /// Every call writes exactly one `LOGIN_*` record.
    pub fn record_login(&self, id: IdentityId, origin: &str, credentials_verified: bool) -> DomainResult<Actor> {
        let origin = if origin.trim().is_empty() {
            Caller::UNKNOWN_ORIGIN
        } else {
            origin
        };

        let (failure, detail, err) = match self.stamp_login(id, credentials_verified) {
            Ok(Ok(identity)) => {
                tracing::info!(identity_id = %id, origin, role = %identity.role(), "login succeeded");
                let _ = self
                    .audit
                    .record(NewAuditRecord::new(id, AuditAction::LoginSucceeded, origin).target(id));
                return Ok(identity.actor());
            }
            Ok(Err(failure)) => (
                failure,
                json!({ "reason": failure.as_str() }),
                DomainError::forbidden("invalid credentials"),
            ),
            Err(err) => (
                LoginFailure::StorageFault,
                json!({
                    "reason": LoginFailure::StorageFault.as_str(),
                    "error_kind": err.kind(),
                    "message": err.message(),
                }),
                err,
            ),
        };

        tracing::warn!(identity_id = %id, origin, reason = failure.as_str(), "login failed");
        let _ = self.audit.record(
            NewAuditRecord::new(id, AuditAction::LoginFailed, origin)
                .target(id)
                .detail(detail),
        );
        Err(err)
    }

    /// Stamp the login time, re-reading on a lost compare-and-set.
    fn stamp_login(&self, id: IdentityId, credentials_verified: bool) -> DomainResult<Result<Identity, LoginFailure>> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let Some(mut identity) = self.identities.find_by_id(&id)? else {
                return Ok(Err(LoginFailure::UnknownIdentity));
            };
            if !identity.is_active() {
                return Ok(Err(LoginFailure::Inactive));
            }
            if !credentials_verified {
                return Ok(Err(LoginFailure::BadCredentials));
            }

            let expected = ExpectedVersion::Exact(identity.version());
            identity.touch_login(Utc::now());
            match self.identities.save(identity, expected) {
                Ok(saved) => return Ok(Ok(saved)),
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(identity_id = %id, "login stamp lost a race, re-checking");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(contended(id))
    }

    /// Load, apply and conditionally save, re-applying on conflict.
    /// Callers authorize first.
    fn modify<F>(&self, caller: &Caller, id: IdentityId, mut change: F) -> DomainResult<Identity>
    where
        F: FnMut(&mut Identity) -> DomainResult<()>,
    {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let current = self.load(id)?;
            let mut next = current.clone();
            change(&mut next)?;
            match self
                .identities
                .save(next, ExpectedVersion::Exact(current.version()))
            {
                Ok(saved) => {
                    tracing::info!(
                        identity_id = %id,
                        actor_id = %caller.id(),
                        role = %saved.role(),
                        active = saved.is_active(),
                        "identity changed"
                    );
                    return Ok(saved);
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(identity_id = %id, "identity save lost a race, re-checking");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(contended(id))
    }

    fn load(&self, id: IdentityId) -> DomainResult<Identity> {
        self.identities
            .find_by_id(&id)?
            .ok_or_else(|| DomainError::not_found(format!("identity {id}")))
    }

    /// Number of identities with the given role among active ones.
    pub fn count_active(&self, role: Role) -> DomainResult<u64> {
        let filter = Filter::new()
            .eq("role", role.as_str())
            .eq("active", FieldValue::Bool(true));
        Ok(self.identities.count_by_filter(&filter)?)
    }
}

fn contended(id: IdentityId) -> DomainError {
    DomainError::storage_unavailable(format!(
        "identity {id} kept changing; gave up after {MAX_SAVE_ATTEMPTS} attempts"
    ))
}

fn not_self(caller: &Caller, id: IdentityId, verb: &str) -> DomainResult<()> {
    if caller.id() == id {
        return Err(DomainError::forbidden(format!(
            "an administrator cannot {verb} their own identity"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use changeflow_audit::{AuditQuery, AuditRecord, AuditTrail};
    use changeflow_core::ErrorKind;
    use changeflow_infra::InMemoryCollection;
    use std::sync::Arc;

    type Trail = Arc<AuditTrail<InMemoryCollection<AuditRecord>>>;
    type Directory = IdentityDirectory<Arc<InMemoryCollection<Identity>>, Trail>;

    fn directory() -> (Directory, Trail) {
        let trail: Trail = Arc::new(AuditTrail::new(InMemoryCollection::new()));
        let directory =
            IdentityDirectory::new(Arc::new(InMemoryCollection::new()), trail.clone()).unwrap();
        (directory, trail)
    }

    fn admin() -> Caller {
        Caller::new(Actor::new(IdentityId::new(), Role::Admin), "10.0.0.1")
    }

    fn new_identity(email: &str, role: Role) -> NewIdentity {
        NewIdentity {
            email: email.into(),
            display_name: "Sam Okafor".into(),
            role,
        }
    }

    #[test]
    fn provision_assigns_increasing_numbers() {
        let (directory, trail) = directory();
        let admin = admin();
        let first = directory
            .provision(&admin, new_identity("a@example.com", Role::Employee))
            .unwrap();
        let second = directory
            .provision(&admin, new_identity("b@example.com", Role::Manager))
            .unwrap();
        assert_eq!(first.employee_number(), EMPLOYEE_NUMBER_BASE + 1);
        assert_eq!(second.employee_number(), EMPLOYEE_NUMBER_BASE + 2);

        let created = trail
            .query(&AuditQuery::by_actor(admin.id()).with_action(AuditAction::IdentityCreated))
            .unwrap();
        assert_eq!(created.total, 2);
        assert_eq!(created.items[0].target_identity(), Some(second.id_typed()));
    }

    #[test]
    fn sequence_is_seeded_from_stored_identities() {
        let store: Arc<InMemoryCollection<Identity>> = Arc::new(InMemoryCollection::new());
        let trail: Trail = Arc::new(AuditTrail::new(InMemoryCollection::new()));
        let first = IdentityDirectory::new(store.clone(), trail.clone()).unwrap();
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            first.provision(&admin(), new_identity(email, Role::Employee)).unwrap();
        }

        let reopened = IdentityDirectory::new(store, trail).unwrap();
        let next = reopened
            .provision(&admin(), new_identity("d@example.com", Role::Employee))
            .unwrap();
        assert_eq!(next.employee_number(), EMPLOYEE_NUMBER_BASE + 4);
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let (directory, _) = directory();
        directory
            .provision(&admin(), new_identity("ops@example.com", Role::Employee))
            .unwrap();
        let err = directory
            .provision(&admin(), new_identity(" OPS@Example.com", Role::Manager))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn only_admins_manage_identities() {
        let (directory, trail) = directory();
        let manager = Caller::new(Actor::new(IdentityId::new(), Role::Manager), "x");
        let err = directory
            .provision(&manager, new_identity("m@example.com", Role::Admin))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let denied = trail
            .query(&AuditQuery::by_actor(manager.id()).with_action(AuditAction::AccessDenied))
            .unwrap();
        assert_eq!(denied.total, 1);
    }

    #[test]
    fn admin_cannot_deactivate_or_delete_self() {
        let (directory, _) = directory();
        let admin = admin();
        let err = directory.deactivate(&admin, admin.id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = directory.delete(&admin, admin.id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn non_admin_self_management_gets_the_role_denial() {
        let (directory, _) = directory();
        let manager = directory
            .provision(&admin(), new_identity("lead@example.com", Role::Manager))
            .unwrap();
        let caller = Caller::new(manager.actor(), "x");

        for err in [
            directory.deactivate(&caller, caller.id()).unwrap_err(),
            directory.delete(&caller, caller.id()).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Forbidden);
            assert!(err.message().contains("requires Admin"), "{}", err.message());
        }
    }

    #[test]
    fn concurrent_logins_all_succeed_and_are_recorded() {
        let (directory, trail) = directory();
        let identity = directory
            .provision(&admin(), new_identity("busy@example.com", Role::Employee))
            .unwrap();
        let id = identity.id_typed();
        let rounds = 20;

        for _ in 0..rounds {
            let barrier = std::sync::Barrier::new(2);
            let (first, second) = std::thread::scope(|s| {
                let a = s.spawn(|| {
                    barrier.wait();
                    directory.record_login(id, "203.0.113.9", true)
                });
                let b = s.spawn(|| {
                    barrier.wait();
                    directory.record_login(id, "203.0.113.10", true)
                });
                (a.join().unwrap(), b.join().unwrap())
            });
            assert!(first.is_ok() && second.is_ok());
        }

        let recorded = trail
            .count(&AuditQuery::by_actor(id).with_action(AuditAction::LoginSucceeded))
            .unwrap();
        assert_eq!(recorded, 2 * rounds);
        let failed = trail
            .count(&AuditQuery::by_actor(id).with_action(AuditAction::LoginFailed))
            .unwrap();
        assert_eq!(failed, 0);
    }

    #[test]
    fn update_deactivate_and_delete() {
        let (directory, _) = directory();
        let admin = admin();
        let identity = directory
            .provision(&admin, new_identity("e@example.com", Role::Employee))
            .unwrap();
        let id = identity.id_typed();

        let promoted = directory
            .update(
                &admin,
                id,
                IdentityPatch {
                    role: Some(Role::Manager),
                    display_name: None,
                },
            )
            .unwrap();
        assert_eq!(promoted.role(), Role::Manager);
        assert_eq!(directory.count_active(Role::Manager).unwrap(), 1);

        let inactive = directory.deactivate(&admin, id).unwrap();
        assert!(!inactive.is_active());
        assert_eq!(directory.count_active(Role::Manager).unwrap(), 0);

        directory.delete(&admin, id).unwrap();
        let err = directory.get(&admin, id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn login_outcomes_are_recorded() {
        let (directory, trail) = directory();
        let admin = admin();
        let identity = directory
            .provision(&admin, new_identity("f@example.com", Role::Auditor))
            .unwrap();
        let id = identity.id_typed();

        let actor = directory.record_login(id, "192.0.2.4", true).unwrap();
        assert_eq!(actor.role, Role::Auditor);
        assert!(directory.get(&admin, id).unwrap().last_login_at().is_some());

        let err = directory.record_login(id, "192.0.2.4", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = directory.record_login(IdentityId::new(), "", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        directory.deactivate(&admin, id).unwrap();
        assert!(directory.record_login(id, "192.0.2.4", true).is_err());

        let failed = trail
            .query(&AuditQuery::default().with_action(AuditAction::LoginFailed))
            .unwrap();
        assert_eq!(failed.total, 3);
        let succeeded = trail
            .query(&AuditQuery::by_actor(id).with_action(AuditAction::LoginSucceeded))
            .unwrap();
        assert_eq!(succeeded.total, 1);
        assert_eq!(succeeded.items[0].origin(), "192.0.2.4");
    }

    #[test]
    fn identities_can_read_themselves() {
        let (directory, _) = directory();
        let identity = directory
            .provision(&admin(), new_identity("g@example.com", Role::Employee))
            .unwrap();
        let own = Caller::new(identity.actor(), "x");
        assert!(directory.get(&own, identity.id_typed()).is_ok());

        let other = Caller::new(Actor::new(IdentityId::new(), Role::Employee), "x");
        let err = directory.get(&other, identity.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
