use std::sync::Arc;

use changeflow_audit::{AuditRecord, AuditTrail};
use changeflow_core::DomainResult;
use changeflow_infra::{EngineConfig, InMemoryCollection};

use crate::analytics::Analytics;
use crate::directory::IdentityDirectory;
use crate::identity::Identity;
use crate::lifecycle::RequestLifecycle;
use crate::reports::AuditReports;
use crate::request::Request;

pub type MemoryTrail = Arc<AuditTrail<InMemoryCollection<AuditRecord>>>;
pub type MemoryRequests = Arc<InMemoryCollection<Request>>;
pub type MemoryIdentities = Arc<InMemoryCollection<Identity>>;

/// Every service wired to in-memory collections sharing one audit trail.
///
/// All collections use the configured storage timeout.
#[derive(Debug)]
pub struct Engine {
    pub requests: RequestLifecycle<MemoryRequests, MemoryTrail>,
    pub identities: IdentityDirectory<MemoryIdentities, MemoryTrail>,
    pub analytics: Analytics<MemoryRequests, MemoryTrail>,
    pub reports: AuditReports<InMemoryCollection<AuditRecord>>,
    pub trail: MemoryTrail,
}

impl Engine {
    pub fn in_memory(config: EngineConfig) -> DomainResult<Self> {
        config
            .validate()
            .map_err(|e| changeflow_core::DomainError::validation(format!("{e:#}")))?;

        let timeout = config.storage_timeout;
        let trail: MemoryTrail = Arc::new(AuditTrail::new(InMemoryCollection::with_timeout(timeout)));
        let requests: MemoryRequests = Arc::new(InMemoryCollection::with_timeout(timeout));
        let identities: MemoryIdentities = Arc::new(InMemoryCollection::with_timeout(timeout));

        tracing::info!(
            storage_timeout_ms = timeout.as_millis() as u64,
            audit_export_limit = config.audit_export_limit,
            "engine initialized"
        );

        Ok(Self {
            identities: IdentityDirectory::new(identities, trail.clone())?,
            analytics: Analytics::new(requests.clone(), trail.clone()),
            reports: AuditReports::new(trail.clone(), &config),
            requests: RequestLifecycle::new(requests, trail.clone(), config),
            trail,
        })
    }
}
