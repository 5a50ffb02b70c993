use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    /// Seeded roles; cannot be deleted
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: String, description: Option<String>, capabilities: Vec<String>) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            name,
            description,
            capabilities,
            is_system: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn system(name: &str, description: &str, capabilities: Vec<String>) -> Self {
        let mut role = Self::new(name.to_string(), Some(description.to_string()), capabilities);
        role.is_system = true;
        role
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: String,
    pub role_id: String,
    pub assigned_at: DateTime<Utc>,
}
