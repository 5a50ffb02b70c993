use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer organization; its data lives in its own database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub tenant_key: String,
    pub database_name: String,
    pub is_active: bool,
    pub invoice_prefix: String,
    pub default_tax_rate_bps: u32,
    pub payment_terms_days: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new(
        name: String,
        slug: String,
        database_name: String,
        invoice_prefix: String,
        default_tax_rate_bps: u32,
        payment_terms_days: u32,
    ) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            name,
            slug,
            tenant_key: crate::shared::utils::generate_tenant_key(),
            database_name,
            is_active: true,
            invoice_prefix,
            default_tax_rate_bps,
            payment_terms_days,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    pub fn deactivate(&mut self) {
        let now = crate::shared::utils::now();
        self.is_active = false;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}
