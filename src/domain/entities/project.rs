use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_billable: bool,
    /// Overrides the client's hourly rate when set
    pub hourly_rate_cents: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(client_id: String, name: String, is_billable: bool) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            client_id,
            name,
            description: None,
            is_billable,
            hourly_rate_cents: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn effective_rate_cents(&self, client: &Client) -> i64 {
        self.hourly_rate_cents.unwrap_or(client.hourly_rate_cents)
    }

    pub fn deactivate(&mut self) {
        let now = crate::shared::utils::now();
        self.is_active = false;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}
