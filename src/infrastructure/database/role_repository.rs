use async_trait::async_trait;
use bson::doc;
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, chrono_date, collect};
use crate::domain::entities::{Role, UserRole};
use crate::domain::repositories::RoleRepository;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    pub is_system: bool,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl From<&Role> for RoleDocument {
    fn from(r: &Role) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            description: r.description.clone(),
            capabilities: r.capabilities.clone(),
            is_system: r.is_system,
            created_at: bson_date(r.created_at),
            updated_at: bson_date(r.updated_at),
        }
    }
}

impl TryFrom<RoleDocument> for Role {
    type Error = TimeChatError;

    fn try_from(d: RoleDocument) -> Result<Self> {
        Ok(Role {
            id: d.id,
            name: d.name,
            description: d.description,
            capabilities: d.capabilities,
            is_system: d.is_system,
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRoleDocument {
    pub user_id: String,
    pub role_id: String,
    pub assigned_at: bson::DateTime,
}

impl From<&UserRole> for UserRoleDocument {
    fn from(ur: &UserRole) -> Self {
        Self {
            user_id: ur.user_id.clone(),
            role_id: ur.role_id.clone(),
            assigned_at: bson_date(ur.assigned_at),
        }
    }
}

/// Roles plus the `user_roles` join collection
pub struct MongoRoleRepository {
    roles: Collection<RoleDocument>,
    assignments: Collection<UserRoleDocument>,
}

impl MongoRoleRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            roles: database.collection("roles"),
            assignments: database.collection("user_roles"),
        }
    }
}

#[async_trait]
impl RoleRepository for MongoRoleRepository {
    async fn create(&self, role: &Role) -> Result<()> {
        self.roles
            .insert_one(RoleDocument::from(role), None)
            .await
            .map_err(|e| {
                if crate::shared::errors::is_duplicate_key(&e) {
                    TimeChatError::conflict("role", format!("Role {} already exists", role.name))
                } else {
                    TimeChatError::from(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Role>> {
        self.roles
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(Role::try_from)
            .transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.roles
            .find_one(doc! {"name": name}, None)
            .await?
            .map(Role::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Role>> {
        let options = FindOptions::builder().sort(doc! {"name": 1}).build();
        collect(self.roles.find(None, options).await?).await
    }

    async fn update(&self, role: &Role) -> Result<()> {
        let result = self
            .roles
            .replace_one(doc! {"_id": &role.id}, RoleDocument::from(role), None)
            .await?;
        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("Role with id: {}", role.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self.roles.delete_one(doc! {"_id": id}, None).await?;
        if result.deleted_count == 0 {
            return Err(TimeChatError::not_found(format!("Role with id: {}", id)));
        }
        self.assignments.delete_many(doc! {"role_id": id}, None).await?;
        Ok(())
    }

    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<Role>> {
        let assignments: Vec<UserRoleDocument> = self
            .assignments
            .find(doc! {"user_id": user_id}, None)
            .await?
            .try_collect()
            .await?;
        if assignments.is_empty() {
            return Ok(Vec::new());
        }

        let role_ids: Vec<&str> = assignments.iter().map(|a| a.role_id.as_str()).collect();
        collect(self.roles.find(doc! {"_id": {"$in": role_ids}}, None).await?).await
    }

    async fn set_user_roles(&self, user_id: &str, role_ids: &[String]) -> Result<()> {
        self.assignments
            .delete_many(doc! {"user_id": user_id}, None)
            .await?;
        if role_ids.is_empty() {
            return Ok(());
        }

        let now = crate::shared::utils::now();
        let docs: Vec<UserRoleDocument> = role_ids
            .iter()
            .map(|role_id| {
                UserRoleDocument::from(&UserRole {
                    user_id: user_id.to_string(),
                    role_id: role_id.clone(),
                    assigned_at: now,
                })
            })
            .collect();
        self.assignments.insert_many(docs, None).await?;
        Ok(())
    }
}
