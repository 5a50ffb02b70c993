use async_trait::async_trait;
use bson::doc;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, chrono_date, collect};
use crate::domain::entities::{ChatMessage, ChatRole, Conversation};
use crate::domain::repositories::ChatRepository;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message_count: u32,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl From<&Conversation> for ConversationDocument {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.id.clone(),
            user_id: c.user_id.clone(),
            title: c.title.clone(),
            message_count: c.message_count,
            created_at: bson_date(c.created_at),
            updated_at: bson_date(c.updated_at),
        }
    }
}

impl TryFrom<ConversationDocument> for Conversation {
    type Error = TimeChatError;

    fn try_from(d: ConversationDocument) -> Result<Self> {
        Ok(Conversation {
            id: d.id,
            user_id: d.user_id,
            title: d.title,
            message_count: d.message_count,
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub role: ChatRole,
    pub content: String,
    pub sequence: u32,
    pub created_at: bson::DateTime,
}

impl From<&ChatMessage> for MessageDocument {
    fn from(m: &ChatMessage) -> Self {
        Self {
            id: m.id.clone(),
            conversation_id: m.conversation_id.clone(),
            role: m.role,
            content: m.content.clone(),
            sequence: m.sequence,
            created_at: bson_date(m.created_at),
        }
    }
}

impl TryFrom<MessageDocument> for ChatMessage {
    type Error = TimeChatError;

    fn try_from(d: MessageDocument) -> Result<Self> {
        Ok(ChatMessage {
            id: d.id,
            conversation_id: d.conversation_id,
            role: d.role,
            content: d.content,
            sequence: d.sequence,
            created_at: chrono_date(d.created_at),
        })
    }
}

pub struct MongoChatRepository {
    conversations: Collection<ConversationDocument>,
    messages: Collection<MessageDocument>,
}

impl MongoChatRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            conversations: database.collection("conversations"),
            messages: database.collection("chat_messages"),
        }
    }
}

#[async_trait]
impl ChatRepository for MongoChatRepository {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .insert_one(ConversationDocument::from(conversation), None)
            .await?;
        Ok(())
    }

    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.conversations
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let options = FindOptions::builder().sort(doc! {"updated_at": -1}).build();
        collect(
            self.conversations
                .find(doc! {"user_id": user_id}, options)
                .await?,
        )
        .await
    }

    /// The conversation's `message_count` doubles as the sequence counter
    async fn next_message_sequence(&self, conversation_id: &str) -> Result<u32> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .conversations
            .find_one_and_update(
                doc! {"_id": conversation_id},
                doc! {
                    "$inc": {"message_count": 1},
                    "$set": {"updated_at": bson_date(crate::shared::utils::now())},
                },
                options,
            )
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("Conversation with ID: {}", conversation_id)))?;
        Ok(updated.message_count)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<()> {
        self.messages
            .insert_one(MessageDocument::from(message), None)
            .await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let options = FindOptions::builder().sort(doc! {"sequence": 1}).build();
        collect(
            self.messages
                .find(doc! {"conversation_id": conversation_id}, options)
                .await?,
        )
        .await
    }
}
