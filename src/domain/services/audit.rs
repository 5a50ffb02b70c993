use std::sync::Arc;

use tracing::warn;

use crate::domain::entities::AuditEntry;
use crate::domain::repositories::AuditRepository;
use crate::domain::services::TokenClaims;

/// Who performed an action, as far as the audit log is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub impersonator_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl From<&TokenClaims> for Actor {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            impersonator_id: claims.impersonator_id.clone(),
            tenant_id: claims.tenant_id.clone(),
        }
    }
}

impl Actor {
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            impersonator_id: None,
            tenant_id: None,
        }
    }

    pub fn entry(&self, action: &str, resource_type: &str) -> AuditEntry {
        AuditEntry::new(&self.user_id, action, resource_type)
            .impersonator(self.impersonator_id.as_deref())
            .tenant(self.tenant_id.as_deref())
    }
}

#[derive(Clone)]
pub struct AuditLog {
    repository: Arc<dyn AuditRepository>,
}

impl AuditLog {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    /// Audit failures are logged, never surfaced to the caller
    pub async fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.repository.record(&entry).await {
            warn!(
                action = %entry.action,
                resource_type = %entry.resource_type,
                "Failed to write audit entry: {}",
                e
            );
        }
    }

    pub fn repository(&self) -> &Arc<dyn AuditRepository> {
        &self.repository
    }
}
