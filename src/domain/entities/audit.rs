use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of a mutation or security-relevant event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub impersonator_id: Option<String>,
    pub tenant_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor_id: &str, action: &str, resource_type: &str) -> Self {
        Self {
            id: crate::shared::utils::generate_id(),
            actor_id: actor_id.to_string(),
            impersonator_id: None,
            tenant_id: None,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: None,
            metadata: serde_json::Value::Null,
            created_at: crate::shared::utils::now(),
        }
    }

    pub fn resource(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn tenant(mut self, tenant_id: Option<&str>) -> Self {
        self.tenant_id = tenant_id.map(str::to_string);
        self
    }

    pub fn impersonator(mut self, impersonator_id: Option<&str>) -> Self {
        self.impersonator_id = impersonator_id.map(str::to_string);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An admin acting as another user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationSession {
    pub id: String,
    pub admin_id: String,
    pub target_user_id: String,
    /// Home tenant of the target user
    pub tenant_id: Option<String>,
    pub reason: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImpersonationSession {
    pub fn new(admin_id: String, target_user_id: String, reason: String) -> Self {
        Self {
            id: crate::shared::utils::generate_id(),
            admin_id,
            target_user_id,
            tenant_id: None,
            reason,
            ip_address: None,
            user_agent: None,
            started_at: crate::shared::utils::now(),
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}
