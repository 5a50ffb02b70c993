use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, bson_date_opt, chrono_date, collect, escape_regex};
use crate::domain::entities::{TwoFactorState, User};
use crate::domain::repositories::{UserFilter, UserRepository};
use crate::shared::types::{Email, Pagination, PhoneNumber};
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub tenant_id: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub two_factor: TwoFactorState,
    pub last_login_at: Option<bson::DateTime>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub deleted_at: Option<bson::DateTime>,
}

impl From<&User> for UserDocument {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.as_str().to_string(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.as_ref().map(|p| p.as_str().to_string()),
            tenant_id: user.tenant_id.clone(),
            is_active: user.is_active,
            two_factor: user.two_factor.clone(),
            last_login_at: bson_date_opt(user.last_login_at),
            created_at: bson_date(user.created_at),
            updated_at: bson_date(user.updated_at),
            deleted_at: bson_date_opt(user.deleted_at),
        }
    }
}

impl TryFrom<UserDocument> for User {
    type Error = TimeChatError;

    fn try_from(doc: UserDocument) -> Result<Self> {
        Ok(User {
            id: doc.id,
            email: Email::new(&doc.email)?,
            password_hash: doc.password_hash,
            first_name: doc.first_name,
            last_name: doc.last_name,
            phone: doc.phone.as_deref().map(PhoneNumber::new).transpose()?,
            tenant_id: doc.tenant_id,
            is_active: doc.is_active,
            two_factor: doc.two_factor,
            last_login_at: doc.last_login_at.map(chrono_date),
            created_at: chrono_date(doc.created_at),
            updated_at: chrono_date(doc.updated_at),
            deleted_at: doc.deleted_at.map(chrono_date),
        })
    }
}

fn list_filter(filter: &UserFilter) -> Document {
    let mut query = Document::new();
    if let Some(tenant_id) = &filter.tenant_id {
        query.insert("tenant_id", tenant_id);
    }
    if !filter.include_inactive {
        query.insert("deleted_at", bson::Bson::Null);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = escape_regex(search);
        query.insert(
            "$or",
            vec![
                doc! {"email": {"$regex": &pattern, "$options": "i"}},
                doc! {"first_name": {"$regex": &pattern, "$options": "i"}},
                doc! {"last_name": {"$regex": &pattern, "$options": "i"}},
            ],
        );
    }
    query
}

pub struct MongoUserRepository {
    collection: Collection<UserDocument>,
}

impl MongoUserRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("users"),
        }
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn create(&self, user: &User) -> Result<()> {
        self.collection
            .insert_one(UserDocument::from(user), None)
            .await
            .map_err(|e| {
                if crate::shared::errors::is_duplicate_key(&e) {
                    TimeChatError::conflict("user", "Email already registered")
                } else {
                    TimeChatError::from(e)
                }
            })?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        self.collection
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>> {
        self.collection
            .find_one(doc! {"email": email.as_str()}, None)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list(&self, filter: &UserFilter, pagination: &Pagination) -> Result<(Vec<User>, u64)> {
        let query = list_filter(filter);
        let total = self.collection.count_documents(query.clone(), None).await?;

        let options = FindOptions::builder()
            .sort(doc! {"created_at": -1})
            .skip(pagination.skip())
            .limit(pagination.limit() as i64)
            .build();
        let users = collect(self.collection.find(query, options).await?).await?;
        Ok((users, total))
    }

    async fn update(&self, user: &User) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! {"_id": &user.id}, UserDocument::from(user), None)
            .await?;

        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("User with id: {}", user.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listing_hides_soft_deleted() {
        let query = list_filter(&UserFilter {
            tenant_id: Some("t1".into()),
            include_inactive: false,
            search: None,
        });
        assert_eq!(query.get_str("tenant_id").unwrap(), "t1");
        assert_eq!(query.get("deleted_at"), Some(&bson::Bson::Null));

        let query = list_filter(&UserFilter {
            include_inactive: true,
            search: Some("  ".into()),
            ..Default::default()
        });
        assert!(query.is_empty());
    }

    #[test]
    fn document_keeps_user_fields() {
        let mut user = User::new(
            Email::new("a@example.com").unwrap(),
            "hash".into(),
            "Ada".into(),
            "L".into(),
            None,
        );
        user.two_factor.enabled = true;
        let restored = User::try_from(UserDocument::from(&user)).unwrap();
        assert_eq!(restored.email, user.email);
        assert!(restored.two_factor.enabled);
        assert_eq!(restored.created_at.timestamp_millis(), user.created_at.timestamp_millis());
    }
}
