use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use changeflow_audit::{AuditAction, AuditSink};
use changeflow_auth::{Action, Caller};
use changeflow_core::{DomainResult, RequestStatus};
use changeflow_infra::{Collection, Filter};

use crate::guard::{Attempt, authorize};
use crate::request::{ChangeType, Request, RiskLevel};

/// Request counts over an optional creation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub total: u64,
    /// Every status appears, with zero when nothing matched.
    pub by_status: BTreeMap<String, u64>,
    pub by_risk_level: BTreeMap<String, u64>,
    pub by_change_type: BTreeMap<String, u64>,
}

/// Aggregate views over requests. Admin only.
#[derive(Debug)]
pub struct Analytics<R, A> {
    requests: R,
    audit: A,
}

impl<R, A> Analytics<R, A>
where
    R: Collection<Request>,
    A: AuditSink,
{
    pub fn new(requests: R, audit: A) -> Self {
        Self { requests, audit }
    }

    pub fn summary(
        &self,
        caller: &Caller,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DomainResult<Summary> {
        let result = self.summarize(caller, from, to);
        Attempt::new(caller, "view_analytics", AuditAction::AnalyticsViewed).record(
            &self.audit,
            &result,
            |summary| Some(json!({ "from": summary.from, "to": summary.to, "total": summary.total })),
        );
        result
    }

    fn summarize(
        &self,
        caller: &Caller,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DomainResult<Summary> {
        authorize(caller, Action::ViewAnalytics, None)?;

        let filter = Filter::new().between("created_at", from, to);
        let total = self.requests.count_by_filter(&filter)?;
        let by_status = with_zeros(
            self.requests.aggregate_by_field(&filter, "status")?,
            RequestStatus::ALL.iter().map(|s| s.as_str()),
        );
        let by_risk_level = with_zeros(
            self.requests.aggregate_by_field(&filter, "risk_level")?,
            RiskLevel::ALL.iter().map(|r| r.as_str()),
        );
        let by_change_type = with_zeros(
            self.requests.aggregate_by_field(&filter, "change_type")?,
            ChangeType::ALL.iter().map(|t| t.as_str()),
        );

        tracing::debug!(actor_id = %caller.id(), total, "analytics summary computed");
        Ok(Summary {
            from,
            to,
            total,
            by_status,
            by_risk_level,
            by_change_type,
        })
    }
}

fn with_zeros<'a>(
    mut counts: BTreeMap<String, u64>,
    keys: impl Iterator<Item = &'a str>,
) -> BTreeMap<String, u64> {
    for key in keys {
        counts.entry(key.to_string()).or_insert(0);
    }
    counts
}
