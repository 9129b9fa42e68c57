use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use changeflow_auth::Resource;
use changeflow_core::{AggregateRoot, DomainError, DomainResult, IdentityId, RequestId, RequestStatus};
use changeflow_infra::{Document, EngineConfig, FieldValue};

/// Kind of change being proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Standard,
    Normal,
    Emergency,
}

impl ChangeType {
    pub const ALL: [ChangeType; 3] = [ChangeType::Standard, ChangeType::Normal, ChangeType::Emergency];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Standard => "standard",
            ChangeType::Normal => "normal",
            ChangeType::Emergency => "emergency",
        }
    }
}

impl FromStr for ChangeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ChangeType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown change type '{s}'")))
    }
}

/// Assessed risk of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RiskLevel::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown risk level '{s}'")))
    }
}

/// Content supplied when a request is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub title: String,
    pub description: String,
    pub change_type: ChangeType,
    pub risk_level: RiskLevel,
}

/// Partial content update. Status and decision fields are not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub change_type: Option<ChangeType>,
    pub risk_level: Option<RiskLevel>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.change_type.is_none()
            && self.risk_level.is_none()
    }
}

/// Who decided a request and when. Present as a whole or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub approver: IdentityId,
    pub decided_at: DateTime<Utc>,
}

/// A change request.
///
/// Status, verdict and rejection reason are only written by the lifecycle
/// service through the crate-private mutators below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    id: RequestId,
    title: String,
    description: String,
    change_type: ChangeType,
    risk_level: RiskLevel,
    status: RequestStatus,
    created_by: IdentityId,
    verdict: Option<Verdict>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    version: u64,
}

impl Request {
    pub(crate) fn submit(
        creator: IdentityId,
        draft: RequestDraft,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let title = bounded_text("title", &draft.title, config.title_max)?;
        let description = bounded_text("description", &draft.description, config.description_max)?;
        Ok(Self {
            id: RequestId::new(),
            title,
            description,
            change_type: draft.change_type,
            risk_level: draft.risk_level,
            status: RequestStatus::Pending,
            created_by: creator,
            verdict: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> RequestId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn created_by(&self) -> IdentityId {
        self.created_by
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.verdict
    }

    pub fn approved_by(&self) -> Option<IdentityId> {
        self.verdict.map(|v| v.approver)
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.verdict.map(|v| v.decided_at)
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// What the authorization policy sees of this request.
    pub fn resource(&self) -> Resource {
        Resource::new(self.created_by, self.status)
    }

    /// Apply a content patch. Never touches status or verdict.
    pub(crate) fn apply_patch(
        &mut self,
        patch: RequestPatch,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if patch.is_empty() {
            return Err(DomainError::validation("update contains no fields"));
        }
        // Validate everything before writing anything.
        let title = patch
            .title
            .map(|t| bounded_text("title", &t, config.title_max))
            .transpose()?;
        let description = patch
            .description
            .map(|d| bounded_text("description", &d, config.description_max))
            .transpose()?;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(change_type) = patch.change_type {
            self.change_type = change_type;
        }
        if let Some(risk_level) = patch.risk_level {
            self.risk_level = risk_level;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Move to `to`, refusing edges outside the status graph.
    pub(crate) fn transition(&mut self, to: RequestStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::invalid_transition(format!(
                "cannot move request from {} to {to}",
                self.status
            )));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn approve(&mut self, approver: IdentityId, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(RequestStatus::Approved, now)?;
        self.verdict = Some(Verdict {
            approver,
            decided_at: now,
        });
        Ok(())
    }

    pub(crate) fn reject(
        &mut self,
        approver: IdentityId,
        reason: String,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.transition(RequestStatus::Rejected, now)?;
        self.verdict = Some(Verdict {
            approver,
            decided_at: now,
        });
        self.rejection_reason = Some(reason);
        Ok(())
    }
}

/// Trim and check a rejection reason against the configured bounds.
pub(crate) fn rejection_reason(reason: &str, config: &EngineConfig) -> DomainResult<String> {
    let reason = reason.trim();
    let len = reason.chars().count();
    let min = config.rejection_reason_floor();
    if len < min {
        return Err(DomainError::validation(format!(
            "rejection reason must be at least {min} characters (got {len})"
        )));
    }
    if len > config.rejection_reason_max {
        return Err(DomainError::validation(format!(
            "rejection reason must be at most {} characters (got {len})",
            config.rejection_reason_max
        )));
    }
    Ok(reason.to_string())
}

fn bounded_text(field: &str, value: &str, max: usize) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    let len = value.chars().count();
    if len > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters (got {len})"
        )));
    }
    Ok(value.to_string())
}

impl AggregateRoot for Request {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Document for Request {
    const COLLECTION: &'static str = "request";

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "status" => Some(FieldValue::text(self.status.as_str())),
            "created_by" => Some(FieldValue::id(self.created_by)),
            "approved_by" => Some(self.approved_by().map(FieldValue::id).into()),
            "change_type" => Some(FieldValue::text(self.change_type.as_str())),
            "risk_level" => Some(FieldValue::text(self.risk_level.as_str())),
            "title" => Some(FieldValue::text(self.title.clone())),
            "description" => Some(FieldValue::text(self.description.clone())),
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
    use proptest::prelude::*;

    fn draft() -> RequestDraft {
        RequestDraft {
            title: "  Rotate TLS certificates ".to_string(),
            description: "Replace the edge certificates before expiry".to_string(),
            change_type: ChangeType::Normal,
            risk_level: RiskLevel::Medium,
        }
    }

    fn pending() -> Request {
        Request::submit(IdentityId::new(), draft(), &EngineConfig::default(), Utc::now()).unwrap()
    }

    #[test]
    fn submit_starts_pending_and_trims() {
        let request = pending();
        assert_eq!(request.status(), RequestStatus::Pending);
        assert_eq!(request.title(), "Rotate TLS certificates");
        assert!(request.verdict().is_none());
        assert!(request.rejection_reason().is_none());
        assert_eq!(request.created_at(), request.updated_at());
    }

    #[test]
    fn submit_rejects_blank_and_oversized_fields() {
        let config = EngineConfig::default();
        let mut blank = draft();
        blank.title = "   ".into();
        let err = Request::submit(IdentityId::new(), blank, &config, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::validation("title is required"));

        let mut long = draft();
        long.description = "x".repeat(config.description_max + 1);
        assert!(Request::submit(IdentityId::new(), long, &config, Utc::now()).is_err());
    }

    #[test]
    fn patch_is_all_or_nothing() {
        let mut request = pending();
        let before = request.clone();
        let patch = RequestPatch {
            title: Some("New title".into()),
            description: Some("".into()),
            ..RequestPatch::default()
        };
        assert!(request.apply_patch(patch, &EngineConfig::default(), Utc::now()).is_err());
        assert_eq!(request, before);

        let err = request
            .apply_patch(RequestPatch::default(), &EngineConfig::default(), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), changeflow_core::ErrorKind::ValidationError);
    }

    #[test]
    fn approve_sets_verdict_together() {
        let mut request = pending();
        let manager = IdentityId::new();
        let now = Utc::now();
        request.approve(manager, now).unwrap();
        assert_eq!(request.status(), RequestStatus::Approved);
        assert_eq!(request.approved_by(), Some(manager));
        assert_eq!(request.decided_at(), Some(now));
        assert!(request.decided_at().unwrap() >= request.created_at());
    }

    #[test]
    fn reject_stores_reason_and_second_decision_fails() {
        let mut request = pending();
        request
            .reject(IdentityId::new(), "No rollback plan".into(), Utc::now())
            .unwrap();
        assert_eq!(request.status(), RequestStatus::Rejected);
        assert_eq!(request.rejection_reason(), Some("No rollback plan"));

        let err = request.approve(IdentityId::new(), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), changeflow_core::ErrorKind::InvalidTransition);
        assert!(err.message().contains("Rejected"));
    }

    #[test]
    fn rejection_reason_bounds() {
        let config = EngineConfig::default();
        assert!(rejection_reason("too short", &config).is_err());
        assert!(rejection_reason("  padded  ", &config).is_err());
        assert_eq!(
            rejection_reason("  risk not assessed  ", &config).unwrap(),
            "risk not assessed"
        );
        assert!(rejection_reason(&"r".repeat(config.rejection_reason_max + 1), &config).is_err());
    }

    #[test]
    fn short_reasons_fail_even_with_a_lowered_minimum() {
        let config = EngineConfig {
            rejection_reason_min: 1,
            ..EngineConfig::default()
        };
        let err = rejection_reason("nope", &config).unwrap_err();
        assert_eq!(err.kind(), changeflow_core::ErrorKind::ValidationError);
        assert!(err.message().contains("at least 10"));
        assert!(rejection_reason("ten chars!", &config).is_ok());
    }

    #[test]
    fn indexed_fields() {
        let request = pending();
        assert_eq!(request.field("status"), Some(FieldValue::text("Pending")));
        assert_eq!(request.field("approved_by"), Some(FieldValue::Null));
        assert_eq!(request.field("risk_level"), Some(FieldValue::text("medium")));
        assert_eq!(request.field("unknown"), None);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("Emergency".parse::<ChangeType>().unwrap(), ChangeType::Emergency);
        assert_eq!(" HIGH ".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert!("urgent".parse::<RiskLevel>().is_err());
    }

    fn any_status() -> impl Strategy<Value = RequestStatus> {
        proptest::sample::select(RequestStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn verdict_and_reason_track_status(steps in proptest::collection::vec(any_status(), 0..12)) {
            let mut request = pending();
            for to in steps {
                let now = Utc::now();
                let _ = match to {
                    RequestStatus::Approved => request.approve(IdentityId::new(), now),
                    RequestStatus::Rejected => {
                        request.reject(IdentityId::new(), "insufficient testing".into(), now)
                    }
                    other => request.transition(other, now),
                };
                prop_assert_eq!(request.rejection_reason().is_some(), request.status() == RequestStatus::Rejected);
                prop_assert_eq!(request.approved_by().is_some(), request.decided_at().is_some());
            }
        }
    }
}
