use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, bson_date_opt, chrono_date, collect};
use crate::domain::entities::Tenant;
use crate::domain::repositories::TenantRepository;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TenantDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: String,
    pub tenant_key: String,
    pub database_name: String,
    pub is_active: bool,
    pub invoice_prefix: String,
    pub default_tax_rate_bps: u32,
    pub payment_terms_days: u32,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub deleted_at: Option<bson::DateTime>,
}

impl From<&Tenant> for TenantDocument {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            slug: t.slug.clone(),
            tenant_key: t.tenant_key.clone(),
            database_name: t.database_name.clone(),
            is_active: t.is_active,
            invoice_prefix: t.invoice_prefix.clone(),
            default_tax_rate_bps: t.default_tax_rate_bps,
            payment_terms_days: t.payment_terms_days,
            created_at: bson_date(t.created_at),
            updated_at: bson_date(t.updated_at),
            deleted_at: bson_date_opt(t.deleted_at),
        }
    }
}

impl TryFrom<TenantDocument> for Tenant {
    type Error = TimeChatError;

    fn try_from(d: TenantDocument) -> Result<Self> {
        Ok(Tenant {
            id: d.id,
            name: d.name,
            slug: d.slug,
            tenant_key: d.tenant_key,
            database_name: d.database_name,
            is_active: d.is_active,
            invoice_prefix: d.invoice_prefix,
            default_tax_rate_bps: d.default_tax_rate_bps,
            payment_terms_days: d.payment_terms_days,
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
            deleted_at: d.deleted_at.map(chrono_date),
        })
    }
}

pub struct MongoTenantRepository {
    collection: Collection<TenantDocument>,
}

impl MongoTenantRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("tenants"),
        }
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Tenant>> {
        self.collection
            .find_one(filter, None)
            .await?
            .map(Tenant::try_from)
            .transpose()
    }
}

#[async_trait]
impl TenantRepository for MongoTenantRepository {
    async fn create(&self, tenant: &Tenant) -> Result<()> {
        self.collection
            .insert_one(TenantDocument::from(tenant), None)
            .await
            .map_err(|e| {
                if crate::shared::errors::is_duplicate_key(&e) {
                    TimeChatError::conflict("tenant", "Tenant slug or key already exists")
                } else {
                    TimeChatError::from(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>> {
        self.find_one(doc! {"_id": id}).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        self.find_one(doc! {"slug": slug}).await
    }

    async fn find_by_key(&self, tenant_key: &str) -> Result<Option<Tenant>> {
        self.find_one(doc! {"tenant_key": tenant_key}).await
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Tenant>> {
        let filter = if include_inactive {
            doc! {}
        } else {
            doc! {"deleted_at": null, "is_active": true}
        };
        let options = FindOptions::builder().sort(doc! {"name": 1}).build();
        collect(self.collection.find(filter, options).await?).await
    }

    async fn update(&self, tenant: &Tenant) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! {"_id": &tenant.id}, TenantDocument::from(tenant), None)
            .await?;
        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("Tenant with id: {}", tenant.id)));
        }
        Ok(())
    }
}
