use std::sync::Arc;

use serde_json::json;

use changeflow_audit::{AuditAction, AuditExport, AuditQuery, AuditRecord, AuditTrail};
use changeflow_auth::{Action, Caller};
use changeflow_core::DomainResult;
use changeflow_infra::{Collection, EngineConfig, Page, Pagination};

use crate::guard::{Attempt, authorize};

/// Admin access to the audit trail.
///
/// Reports read the same trail they write their own records to.
#[derive(Debug)]
pub struct AuditReports<C> {
    trail: Arc<AuditTrail<C>>,
    export_limit: u32,
    default_page_size: u32,
    max_page_size: u32,
}

impl<C> AuditReports<C>
where
    C: Collection<AuditRecord>,
{
    pub fn new(trail: Arc<AuditTrail<C>>, config: &EngineConfig) -> Self {
        Self {
            trail,
            export_limit: u32::try_from(config.audit_export_limit).unwrap_or(u32::MAX),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Page through records, newest first. Allowed queries are not audited.
    ///
    /// The page size is clamped to the configured maximum.
    pub fn query(&self, caller: &Caller, query: &AuditQuery) -> DomainResult<Page<AuditRecord>> {
        let allowed = authorize(caller, Action::ExportAuditLog, None);
        if allowed.is_err() {
            Attempt::new(caller, "query_audit_log", AuditAction::AccessDenied).record(
                self.trail.as_ref(),
                &allowed,
                |_| None,
            );
        }
        allowed?;
        let bounded = AuditQuery {
            pagination: Pagination::bounded(
                Some(query.pagination.limit),
                Some(query.pagination.offset),
                self.default_page_size,
                self.max_page_size,
            ),
            ..query.clone()
        };
        self.trail.query(&bounded)
    }

    /// Flattened export, capped at the configured row limit.
    pub fn export(&self, caller: &Caller, query: &AuditQuery) -> DomainResult<AuditExport> {
        let result = authorize(caller, Action::ExportAuditLog, None)
            .and_then(|()| self.trail.export(query, self.export_limit));
        Attempt::new(caller, "export_audit_log", AuditAction::AuditExported).record(
            self.trail.as_ref(),
            &result,
            |export| {
                Some(json!({
                    "rows": export.rows.len(),
                    "total_matching": export.total_matching,
                    "truncated": export.truncated,
                }))
            },
        );
        if let Ok(export) = &result {
            tracing::info!(
                actor_id = %caller.id(),
                rows = export.rows.len(),
                truncated = export.truncated,
                "audit log exported"
            );
        }
        result
    }
}
