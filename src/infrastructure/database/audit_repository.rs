use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, bson_date_opt, chrono_date, collect};
use crate::domain::entities::{AuditEntry, ImpersonationSession};
use crate::domain::repositories::{AuditFilter, AuditRepository, ImpersonationRepository};
use crate::shared::types::Pagination;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub actor_id: String,
    pub impersonator_id: Option<String>,
    pub tenant_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// JSON metadata as stored BSON
    pub metadata: bson::Bson,
    pub created_at: bson::DateTime,
}

impl TryFrom<&AuditEntry> for AuditDocument {
    type Error = TimeChatError;

    fn try_from(e: &AuditEntry) -> Result<Self> {
        Ok(Self {
            id: e.id.clone(),
            actor_id: e.actor_id.clone(),
            impersonator_id: e.impersonator_id.clone(),
            tenant_id: e.tenant_id.clone(),
            action: e.action.clone(),
            resource_type: e.resource_type.clone(),
            resource_id: e.resource_id.clone(),
            metadata: bson::to_bson(&e.metadata)?,
            created_at: bson_date(e.created_at),
        })
    }
}

impl TryFrom<AuditDocument> for AuditEntry {
    type Error = TimeChatError;

    fn try_from(d: AuditDocument) -> Result<Self> {
        Ok(AuditEntry {
            id: d.id,
            actor_id: d.actor_id,
            impersonator_id: d.impersonator_id,
            tenant_id: d.tenant_id,
            action: d.action,
            resource_type: d.resource_type,
            resource_id: d.resource_id,
            metadata: d.metadata.into_relaxed_extjson(),
            created_at: chrono_date(d.created_at),
        })
    }
}

fn audit_filter(filter: &AuditFilter) -> Document {
    let mut query = Document::new();
    if let Some(actor_id) = &filter.actor_id {
        query.insert("actor_id", actor_id.as_str());
    }
    if let Some(action) = &filter.action {
        query.insert("action", action.as_str());
    }
    if let Some(tenant_id) = &filter.tenant_id {
        query.insert("tenant_id", tenant_id.as_str());
    }
    query
}

/// Append-only; entries are never updated or deleted
pub struct MongoAuditRepository {
    collection: Collection<AuditDocument>,
}

impl MongoAuditRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("audit_log"),
        }
    }
}

#[async_trait]
impl AuditRepository for MongoAuditRepository {
    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        self.collection
            .insert_one(AuditDocument::try_from(entry)?, None)
            .await?;
        Ok(())
    }

    async fn list(&self, filter: &AuditFilter, pagination: &Pagination) -> Result<Vec<AuditEntry>> {
        let options = FindOptions::builder()
            .sort(doc! {"created_at": -1})
            .skip(pagination.skip())
            .limit(pagination.limit() as i64)
            .build();
        collect(self.collection.find(audit_filter(filter), options).await?).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub admin_id: String,
    pub target_user_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub reason: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: bson::DateTime,
    pub ended_at: Option<bson::DateTime>,
}

impl From<&ImpersonationSession> for SessionDocument {
    fn from(s: &ImpersonationSession) -> Self {
        Self {
            id: s.id.clone(),
            admin_id: s.admin_id.clone(),
            target_user_id: s.target_user_id.clone(),
            tenant_id: s.tenant_id.clone(),
            reason: s.reason.clone(),
            ip_address: s.ip_address.clone(),
            user_agent: s.user_agent.clone(),
            started_at: bson_date(s.started_at),
            ended_at: bson_date_opt(s.ended_at),
        }
    }
}

impl TryFrom<SessionDocument> for ImpersonationSession {
    type Error = TimeChatError;

    fn try_from(d: SessionDocument) -> Result<Self> {
        Ok(ImpersonationSession {
            id: d.id,
            admin_id: d.admin_id,
            target_user_id: d.target_user_id,
            tenant_id: d.tenant_id,
            reason: d.reason,
            ip_address: d.ip_address,
            user_agent: d.user_agent,
            started_at: chrono_date(d.started_at),
            ended_at: d.ended_at.map(chrono_date),
        })
    }
}

pub struct MongoImpersonationRepository {
    collection: Collection<SessionDocument>,
}

impl MongoImpersonationRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("impersonation_sessions"),
        }
    }
}

#[async_trait]
impl ImpersonationRepository for MongoImpersonationRepository {
    async fn create(&self, session: &ImpersonationSession) -> Result<()> {
        self.collection
            .insert_one(SessionDocument::from(session), None)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ImpersonationSession>> {
        self.collection
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(ImpersonationSession::try_from)
            .transpose()
    }

    async fn end(&self, id: &str, ended_at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.collection
            .update_one(
                doc! {"_id": id, "ended_at": null},
                doc! {"$set": {"ended_at": bson_date(ended_at)}},
                None,
            )
            .await?;
        Ok(())
    }

    async fn list(&self, tenant_id: Option<String>, pagination: &Pagination) -> Result<Vec<ImpersonationSession>> {
        let filter = tenant_id.map(|tenant_id| doc! {"tenant_id": tenant_id});
        let options = FindOptions::builder()
            .sort(doc! {"started_at": -1})
            .skip(pagination.skip())
            .limit(pagination.limit() as i64)
            .build();
        collect(self.collection.find(filter, options).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_survives_bson_conversion() {
        let entry = AuditEntry::new("u1", "user.created", "user")
            .resource("u2")
            .metadata(json!({"roles": ["user"], "count": 2}));
        let restored = AuditEntry::try_from(AuditDocument::try_from(&entry).unwrap()).unwrap();
        assert_eq!(restored.metadata["roles"][0], "user");
        assert_eq!(restored.resource_id.as_deref(), Some("u2"));
    }

    #[test]
    fn filter_only_includes_given_fields() {
        let query = audit_filter(&AuditFilter {
            action: Some("user.created".into()),
            ..Default::default()
        });
        assert_eq!(query.len(), 1);
        assert_eq!(query.get_str("action").unwrap(), "user.created");
    }
}
