use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: String, title: String) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            user_id,
            title,
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: ChatRole,
    pub content: String,
    /// Position within the conversation, starting at 1
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(conversation_id: String, role: ChatRole, content: String, sequence: u32) -> Self {
        Self {
            id: crate::shared::utils::generate_id(),
            conversation_id,
            role,
            content,
            sequence,
            created_at: crate::shared::utils::now(),
        }
    }
}
