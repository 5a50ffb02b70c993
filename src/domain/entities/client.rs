use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A billable customer of a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub hourly_rate_cents: i64,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Client {
    pub fn new(name: String, email: Option<String>, hourly_rate_cents: i64, currency: String) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            name,
            email,
            hourly_rate_cents,
            currency,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn deactivate(&mut self) {
        let now = crate::shared::utils::now();
        self.is_active = false;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}
