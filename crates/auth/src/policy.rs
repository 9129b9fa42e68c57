//! Authorization policy: the capability matrix for change requests.
//!
//! - No IO
//! - No panics
//! - No side effects (callers record both allow and deny outcomes)

use serde::Serialize;

use changeflow_core::{DomainError, IdentityId, RequestStatus};

use crate::{Actor, Role};

/// Something an actor may attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateRequest,
    ReadRequest,
    UpdateRequest,
    ApproveRequest,
    RejectRequest,
    SendToAudit,
    StartRequest,
    CompleteRequest,
    ResolveRequest,
    CancelRequest,
    DeleteRequest,
    ManageIdentities,
    ViewAnalytics,
    ExportAuditLog,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::CreateRequest,
        Action::ReadRequest,
        Action::UpdateRequest,
        Action::ApproveRequest,
        Action::RejectRequest,
        Action::SendToAudit,
        Action::StartRequest,
        Action::CompleteRequest,
        Action::ResolveRequest,
        Action::CancelRequest,
        Action::DeleteRequest,
        Action::ManageIdentities,
        Action::ViewAnalytics,
        Action::ExportAuditLog,
    ];

    /// Human-readable verb phrase used in denial messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Action::CreateRequest => "create requests",
            Action::ReadRequest => "read this request",
            Action::UpdateRequest => "update this request",
            Action::ApproveRequest => "approve requests",
            Action::RejectRequest => "reject requests",
            Action::SendToAudit => "send requests to audit",
            Action::StartRequest => "start work on requests",
            Action::CompleteRequest => "complete requests",
            Action::ResolveRequest => "resolve audited requests",
            Action::CancelRequest => "cancel this request",
            Action::DeleteRequest => "delete this request",
            Action::ManageIdentities => "manage identities",
            Action::ViewAnalytics => "view analytics",
            Action::ExportAuditLog => "export the audit log",
        }
    }

    /// Roles that can perform the action on at least some requests.
    pub fn permitted_roles(&self) -> &'static [Role] {
        use Role::*;
        match self {
            Action::CreateRequest => &[Employee, Manager, Admin],
            Action::ReadRequest => &[Employee, Manager, Admin, Auditor],
            Action::UpdateRequest => &[Employee, Manager, Admin],
            Action::ApproveRequest | Action::RejectRequest => &[Manager],
            Action::SendToAudit | Action::StartRequest | Action::CompleteRequest => {
                &[Manager, Admin]
            }
            Action::ResolveRequest => &[Auditor, Manager, Admin],
            Action::CancelRequest | Action::DeleteRequest => &[Employee, Manager, Admin],
            Action::ManageIdentities | Action::ViewAnalytics | Action::ExportAuditLog => &[Admin],
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Action::ReadRequest)
    }
}

/// The slice of a request the policy looks at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Resource {
    pub creator: IdentityId,
    pub status: RequestStatus,
}

impl Resource {
    pub fn new(creator: IdentityId, status: RequestStatus) -> Self {
        Self { creator, status }
    }

    fn is_owned_by(&self, actor: &Actor) -> bool {
        self.creator == actor.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenialKind {
    NotAuthenticated,
    RoleNotPermitted,
    InvalidStateForAction,
    NotOwner,
}

/// Why a decision came out as deny.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub kind: DenialKind,
    pub action: Action,
    pub role: Role,
    pub message: String,
    pub current_status: Option<RequestStatus>,
    pub permitted_statuses: Vec<RequestStatus>,
}

impl Denial {
    fn not_authenticated(actor: &Actor, action: Action) -> Self {
        Self {
            kind: DenialKind::NotAuthenticated,
            action,
            role: actor.role,
            message: format!("identity {} is not active", actor.id),
            current_status: None,
            permitted_statuses: Vec::new(),
        }
    }

    fn role_not_permitted(actor: &Actor, action: Action, allowed: &[Role]) -> Self {
        let allowed = allowed
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            kind: DenialKind::RoleNotPermitted,
            action,
            role: actor.role,
            message: format!(
                "role {} may not {} (requires {allowed})",
                actor.role,
                action.describe()
            ),
            current_status: None,
            permitted_statuses: Vec::new(),
        }
    }

    fn not_owner(actor: &Actor, action: Action) -> Self {
        Self {
            kind: DenialKind::NotOwner,
            action,
            role: actor.role,
            message: format!(
                "only the creator, or a privileged role, may {}",
                action.describe()
            ),
            current_status: None,
            permitted_statuses: Vec::new(),
        }
    }

    fn invalid_state(
        actor: &Actor,
        action: Action,
        current: RequestStatus,
        permitted: &[RequestStatus],
        note: Option<&str>,
    ) -> Self {
        let expected = permitted
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        let mut message = format!(
            "cannot {} while status is {current} (requires {expected})",
            action.describe()
        );
        if let Some(note) = note {
            message.push_str(": ");
            message.push_str(note);
        }
        Self {
            kind: DenialKind::InvalidStateForAction,
            action,
            role: actor.role,
            message,
            current_status: Some(current),
            permitted_statuses: permitted.to_vec(),
        }
    }

    /// Map the denial onto the domain error taxonomy.
    ///
    /// Status preconditions surface as `InvalidTransition`, except for reads,
    /// where every denial is a plain `Forbidden`.
    pub fn into_error(self) -> DomainError {
        match self.kind {
            DenialKind::InvalidStateForAction if !self.action.is_read() => {
                DomainError::invalid_transition(self.message)
            }
            _ => DomainError::forbidden(self.message),
        }
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), Denial> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(d) => Err(d),
        }
    }
}

const AUDITOR_VISIBLE: &[RequestStatus] = &[
    RequestStatus::Approved,
    RequestStatus::Completed,
    RequestStatus::SentToAudit,
];

const CREATOR_EDITABLE: &[RequestStatus] = &[RequestStatus::Pending, RequestStatus::SentToAudit];

/// Statuses an auditor may read.
pub fn auditor_visible_statuses() -> &'static [RequestStatus] {
    AUDITOR_VISIBLE
}

/// Decide whether `actor` may perform `action` on `resource`.
///
/// Role is checked before status, so a role that can never perform an action
/// is denied with `RoleNotPermitted` regardless of the request's state.
/// Request-scoped actions evaluated without a resource skip status checks;
/// a read without a resource is a listing and is always allowed for active
/// actors, with visibility applied by the caller.
pub fn decide(actor: &Actor, action: Action, resource: Option<&Resource>) -> Decision {
    if !actor.active {
        return Decision::Deny(Denial::not_authenticated(actor, action));
    }

    match evaluate(actor, action, resource) {
        Ok(()) => Decision::Allow,
        Err(denial) => Decision::Deny(denial),
    }
}

fn evaluate(actor: &Actor, action: Action, resource: Option<&Resource>) -> Result<(), Denial> {
    use Role::*;

    let owned = resource.is_some_and(|r| r.is_owned_by(actor));

    match action {
        Action::CreateRequest
        | Action::ManageIdentities
        | Action::ViewAnalytics
        | Action::ExportAuditLog => require_role(actor, action),

        Action::ReadRequest => {
            let Some(r) = resource else {
                // Listing: the caller narrows results to what the actor may see.
                return Ok(());
            };
            if owned || matches!(actor.role, Manager | Admin) {
                return Ok(());
            }
            if actor.role == Auditor {
                require_status(actor, action, r, AUDITOR_VISIBLE, None)
            } else {
                Err(Denial::not_owner(actor, action))
            }
        }

        Action::UpdateRequest => {
            if matches!(actor.role, Manager | Admin) {
                return Ok(());
            }
            match resource {
                Some(r) if owned => require_status(actor, action, r, CREATOR_EDITABLE, None),
                _ if actor.role == Auditor => Err(Denial::role_not_permitted(
                    actor,
                    action,
                    &[Manager, Admin],
                )),
                _ => Err(Denial::not_owner(actor, action)),
            }
        }

        Action::ApproveRequest | Action::RejectRequest => {
            require_role(actor, action)?;
            require_resource_status(actor, action, resource, &[RequestStatus::Pending], None)
        }

        Action::SendToAudit | Action::StartRequest => {
            require_role(actor, action)?;
            require_resource_status(actor, action, resource, &[RequestStatus::Approved], None)
        }

        Action::CompleteRequest => {
            require_role(actor, action)?;
            require_resource_status(
                actor,
                action,
                resource,
                &[RequestStatus::Approved, RequestStatus::InProgress],
                None,
            )
        }

        Action::ResolveRequest => {
            require_role(actor, action)?;
            require_resource_status(actor, action, resource, &[RequestStatus::SentToAudit], None)
        }

        Action::CancelRequest => {
            if matches!(actor.role, Manager | Admin) {
                let active: Vec<RequestStatus> = RequestStatus::ALL
                    .into_iter()
                    .filter(RequestStatus::is_active)
                    .collect();
                return require_resource_status(actor, action, resource, &active, None);
            }
            match resource {
                Some(r) if owned => require_status(
                    actor,
                    action,
                    r,
                    &[RequestStatus::Pending],
                    Some("only pending requests may be cancelled by their creator"),
                ),
                _ if actor.role == Auditor => Err(Denial::role_not_permitted(
                    actor,
                    action,
                    &[Manager, Admin],
                )),
                _ => Err(Denial::not_owner(actor, action)),
            }
        }

        Action::DeleteRequest => {
            if actor.role == Admin {
                return Ok(());
            }
            match resource {
                Some(r) if owned => require_status(
                    actor,
                    action,
                    r,
                    &[RequestStatus::Pending],
                    Some("only pending requests deletable by non-admins"),
                ),
                _ if actor.role == Auditor => {
                    Err(Denial::role_not_permitted(actor, action, &[Admin]))
                }
                _ => Err(Denial::not_owner(actor, action)),
            }
        }
    }
}

fn require_role(actor: &Actor, action: Action) -> Result<(), Denial> {
    let allowed = action.permitted_roles();
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(Denial::role_not_permitted(actor, action, allowed))
    }
}

fn require_status(
    actor: &Actor,
    action: Action,
    resource: &Resource,
    permitted: &[RequestStatus],
    note: Option<&str>,
) -> Result<(), Denial> {
    if permitted.contains(&resource.status) {
        Ok(())
    } else {
        Err(Denial::invalid_state(
            actor,
            action,
            resource.status,
            permitted,
            note,
        ))
    }
}

fn require_resource_status(
    actor: &Actor,
    action: Action,
    resource: Option<&Resource>,
    permitted: &[RequestStatus],
    note: Option<&str>,
) -> Result<(), Denial> {
    match resource {
        Some(r) => require_status(actor, action, r, permitted, note),
        None => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability matrix (for display / audit)
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the capability matrix.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityRow {
    pub action: Action,
    pub roles: Vec<Role>,
    pub condition: &'static str,
}

/// The full capability matrix, one row per action.
pub fn capability_matrix() -> Vec<CapabilityRow> {
    Action::ALL
        .into_iter()
        .map(|action| CapabilityRow {
            action,
            roles: action.permitted_roles().to_vec(),
            condition: condition(action),
        })
        .collect()
}

fn condition(action: Action) -> &'static str {
    match action {
        Action::CreateRequest => "n/a",
        Action::ReadRequest => {
            "creator: any status; Manager/Admin: any; Auditor: Approved, Completed or Sent to Audit"
        }
        Action::UpdateRequest => {
            "creator: Pending or Sent to Audit; Manager/Admin: any status"
        }
        Action::ApproveRequest | Action::RejectRequest => "status = Pending",
        Action::SendToAudit | Action::StartRequest => "status = Approved",
        Action::CompleteRequest => "status = Approved or In Progress",
        Action::ResolveRequest => "status = Sent to Audit",
        Action::CancelRequest => "creator: Pending; Manager/Admin: any active status",
        Action::DeleteRequest => "creator: own and Pending; Admin: any",
        Action::ManageIdentities | Action::ViewAnalytics | Action::ExportAuditLog => "n/a",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn actor(role: Role) -> Actor {
        Actor::new(IdentityId::new(), role)
    }

    fn resource_of(creator: &Actor, status: RequestStatus) -> Resource {
        Resource::new(creator.id, status)
    }

    fn denial_kind(decision: Decision) -> DenialKind {
        match decision {
            Decision::Deny(d) => d.kind,
            Decision::Allow => panic!("expected deny"),
        }
    }

    #[test]
    fn only_managers_approve_pending_requests() {
        let creator = actor(Role::Employee);
        let pending = resource_of(&creator, RequestStatus::Pending);

        assert!(decide(&actor(Role::Manager), Action::ApproveRequest, Some(&pending)).is_allowed());
        assert_eq!(
            denial_kind(decide(&actor(Role::Admin), Action::ApproveRequest, Some(&pending))),
            DenialKind::RoleNotPermitted
        );
        assert_eq!(
            denial_kind(decide(&creator, Action::ApproveRequest, Some(&pending))),
            DenialKind::RoleNotPermitted
        );
    }

    #[test]
    fn send_to_audit_on_pending_names_the_status() {
        let creator = actor(Role::Employee);
        let pending = resource_of(&creator, RequestStatus::Pending);
        let decision = decide(&actor(Role::Manager), Action::SendToAudit, Some(&pending));

        let Decision::Deny(denial) = decision else {
            panic!("expected deny");
        };
        assert_eq!(denial.kind, DenialKind::InvalidStateForAction);
        assert_eq!(denial.current_status, Some(RequestStatus::Pending));
        let err = denial.into_error();
        assert!(matches!(err, DomainError::InvalidTransition(ref m) if m.contains("Pending")));
    }

    #[test]
    fn auditors_read_only_decided_requests() {
        let creator = actor(Role::Employee);
        let auditor = actor(Role::Auditor);
        for status in RequestStatus::ALL {
            let r = resource_of(&creator, status);
            let allowed = decide(&auditor, Action::ReadRequest, Some(&r)).is_allowed();
            assert_eq!(allowed, AUDITOR_VISIBLE.contains(&status), "{status}");
        }
    }

    #[test]
    fn read_denials_are_forbidden_not_invalid_transition() {
        let creator = actor(Role::Employee);
        let r = resource_of(&creator, RequestStatus::Pending);
        let Decision::Deny(denial) = decide(&actor(Role::Auditor), Action::ReadRequest, Some(&r))
        else {
            panic!("expected deny");
        };
        assert!(matches!(denial.into_error(), DomainError::Forbidden(_)));
    }

    #[test]
    fn listing_is_allowed_for_every_active_role() {
        for role in Role::ALL {
            assert!(decide(&actor(role), Action::ReadRequest, None).is_allowed());
        }
        assert_eq!(
            denial_kind(decide(&actor(Role::Employee).inactive(), Action::ReadRequest, None)),
            DenialKind::NotAuthenticated
        );
    }

    #[test]
    fn creators_edit_pending_or_audited_only() {
        let creator = actor(Role::Employee);
        for (status, allowed) in [
            (RequestStatus::Pending, true),
            (RequestStatus::SentToAudit, true),
            (RequestStatus::Approved, false),
            (RequestStatus::Rejected, false),
        ] {
            let r = resource_of(&creator, status);
            assert_eq!(
                decide(&creator, Action::UpdateRequest, Some(&r)).is_allowed(),
                allowed,
                "{status}"
            );
        }

        let other = actor(Role::Employee);
        let r = resource_of(&creator, RequestStatus::Pending);
        assert_eq!(
            denial_kind(decide(&other, Action::UpdateRequest, Some(&r))),
            DenialKind::NotOwner
        );
    }

    #[test]
    fn managers_and_admins_update_regardless_of_status() {
        let creator = actor(Role::Employee);
        for status in RequestStatus::ALL {
            let r = resource_of(&creator, status);
            assert!(decide(&actor(Role::Manager), Action::UpdateRequest, Some(&r)).is_allowed());
            assert!(decide(&actor(Role::Admin), Action::UpdateRequest, Some(&r)).is_allowed());
        }
    }

    #[test]
    fn delete_rules() {
        let creator = actor(Role::Employee);
        let approved = resource_of(&creator, RequestStatus::Approved);
        let pending = resource_of(&creator, RequestStatus::Pending);

        assert!(decide(&creator, Action::DeleteRequest, Some(&pending)).is_allowed());
        assert!(decide(&actor(Role::Admin), Action::DeleteRequest, Some(&approved)).is_allowed());

        let Decision::Deny(denial) = decide(&creator, Action::DeleteRequest, Some(&approved))
        else {
            panic!("expected deny");
        };
        assert!(denial.message.contains("only pending requests deletable by non-admins"));
        assert!(matches!(denial.into_error(), DomainError::InvalidTransition(_)));

        assert_eq!(
            denial_kind(decide(&actor(Role::Manager), Action::DeleteRequest, Some(&pending))),
            DenialKind::NotOwner
        );
    }

    #[test]
    fn admin_only_actions() {
        for action in [
            Action::ManageIdentities,
            Action::ViewAnalytics,
            Action::ExportAuditLog,
        ] {
            assert!(decide(&actor(Role::Admin), action, None).is_allowed());
            for role in [Role::Employee, Role::Manager, Role::Auditor] {
                assert_eq!(
                    denial_kind(decide(&actor(role), action, None)),
                    DenialKind::RoleNotPermitted
                );
            }
        }
    }

    #[test]
    fn auditors_cannot_create() {
        assert_eq!(
            denial_kind(decide(&actor(Role::Auditor), Action::CreateRequest, None)),
            DenialKind::RoleNotPermitted
        );
    }

    #[test]
    fn matrix_has_one_row_per_action() {
        let matrix = capability_matrix();
        assert_eq!(matrix.len(), Action::ALL.len());
        let approve = matrix
            .iter()
            .find(|row| row.action == Action::ApproveRequest)
            .unwrap();
        assert_eq!(approve.roles, vec![Role::Manager]);
    }

    fn any_status() -> impl Strategy<Value = RequestStatus> {
        (0..RequestStatus::ALL.len()).prop_map(|i| RequestStatus::ALL[i])
    }

    fn any_role() -> impl Strategy<Value = Role> {
        (0..Role::ALL.len()).prop_map(|i| Role::ALL[i])
    }

    fn any_action() -> impl Strategy<Value = Action> {
        (0..Action::ALL.len()).prop_map(|i| Action::ALL[i])
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: an Employee approving is denied by role, whatever the status.
        #[test]
        fn employee_never_approves(status in any_status(), own in any::<bool>()) {
            let employee = actor(Role::Employee);
            let creator = if own { employee } else { actor(Role::Employee) };
            let r = resource_of(&creator, status);
            let decision = decide(&employee, Action::ApproveRequest, Some(&r));
            prop_assert_eq!(denial_kind(decision), DenialKind::RoleNotPermitted);
        }

        /// Property: inactive identities are never allowed anything.
        #[test]
        fn inactive_is_never_allowed(role in any_role(), action in any_action(), status in any_status()) {
            let inactive = actor(role).inactive();
            let r = resource_of(&inactive, status);
            prop_assert_eq!(
                denial_kind(decide(&inactive, action, Some(&r))),
                DenialKind::NotAuthenticated
            );
        }

        /// Property: approve is allowed exactly for a Manager on a Pending request.
        #[test]
        fn approve_iff_manager_and_pending(role in any_role(), status in any_status()) {
            let creator = actor(Role::Employee);
            let r = resource_of(&creator, status);
            let allowed = decide(&actor(role), Action::ApproveRequest, Some(&r)).is_allowed();
            prop_assert_eq!(allowed, role == Role::Manager && status == RequestStatus::Pending);
        }

        /// Property: status-gated transitions only allow statuses that can reach the target.
        #[test]
        fn allowed_transitions_follow_the_graph(status in any_status()) {
            let manager = actor(Role::Manager);
            let creator = actor(Role::Employee);
            let r = resource_of(&creator, status);
            for (action, target) in [
                (Action::ApproveRequest, RequestStatus::Approved),
                (Action::RejectRequest, RequestStatus::Rejected),
                (Action::SendToAudit, RequestStatus::SentToAudit),
                (Action::StartRequest, RequestStatus::InProgress),
                (Action::CompleteRequest, RequestStatus::Completed),
                (Action::ResolveRequest, RequestStatus::Solved),
                (Action::CancelRequest, RequestStatus::Cancelled),
            ] {
                if decide(&manager, action, Some(&r)).is_allowed() {
                    prop_assert!(status.can_transition_to(target), "{:?} from {}", action, status);
                }
            }
        }
    }
}
