use std::sync::Arc;

use crate::domain::entities::{ChatMessage, ChatRole, Conversation};
use crate::domain::repositories::ChatRepository;
use crate::shared::{Result, TimeChatError};

pub const MAX_MESSAGE_CHARS: usize = 4000;
const MAX_TITLE_CHARS: usize = 200;
const DEFAULT_TITLE: &str = "New conversation";

pub fn validate_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_MESSAGE_CHARS {
        return Err(TimeChatError::validation(
            "content",
            format!("Must be 1-{} characters", MAX_MESSAGE_CHARS),
        ));
    }
    Ok(trimmed.to_string())
}

/// Stored chat threads. Replies are not generated here; clients post both sides.
#[derive(Clone)]
pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
}

impl ChatService {
    pub fn new(chats: Arc<dyn ChatRepository>) -> Self {
        Self { chats }
    }

    pub async fn create_conversation(&self, user_id: &str, title: Option<String>) -> Result<Conversation> {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(TimeChatError::validation("title", "Must be at most 200 characters"));
        }

        let conversation = Conversation::new(user_id.to_string(), title);
        self.chats.create_conversation(&conversation).await?;
        Ok(conversation)
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        self.chats.list_conversations(user_id).await
    }

    /// Conversations of other users look exactly like missing ones
    pub async fn get_conversation(&self, user_id: &str, id: &str) -> Result<Conversation> {
        self.chats
            .find_conversation(id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| TimeChatError::not_found(format!("Conversation with ID: {}", id)))
    }

    pub async fn post_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let content = validate_content(content)?;
        let conversation = self.get_conversation(user_id, conversation_id).await?;

        let sequence = self.chats.next_message_sequence(&conversation.id).await?;
        let message = ChatMessage::new(conversation.id, role, content, sequence);
        self.chats.append_message(&message).await?;
        Ok(message)
    }

    pub async fn list_messages(&self, user_id: &str, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let conversation = self.get_conversation(user_id, conversation_id).await?;
        self.chats.list_messages(&conversation.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockChatRepository;

    #[test]
    fn content_length_bounds() {
        assert!(validate_content("   ").is_err());
        assert!(validate_content(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
        assert_eq!(validate_content(" hi ").unwrap(), "hi");
        assert!(validate_content(&"é".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[tokio::test]
    async fn other_users_conversations_are_not_found() {
        let conversation = Conversation::new("owner".into(), "Plans".into());
        let mut chats = MockChatRepository::new();
        chats
            .expect_find_conversation()
            .returning(move |_| Ok(Some(conversation.clone())));
        chats.expect_append_message().never();

        let service = ChatService::new(Arc::new(chats));
        let err = service
            .post_message("intruder", "c1", ChatRole::User, "hello")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);

        let err = service.list_messages("intruder", "c1").await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn messages_take_the_next_sequence() {
        let conversation = Conversation::new("owner".into(), "Plans".into());
        let mut chats = MockChatRepository::new();
        chats
            .expect_find_conversation()
            .returning(move |_| Ok(Some(conversation.clone())));
        chats.expect_next_message_sequence().returning(|_| Ok(3));
        chats
            .expect_append_message()
            .withf(|m| m.sequence == 3 && m.content == "hello")
            .times(1)
            .returning(|_| Ok(()));

        let service = ChatService::new(Arc::new(chats));
        let message = service
            .post_message("owner", "c1", ChatRole::User, " hello ")
            .await
            .unwrap();
        assert_eq!(message.sequence, 3);
    }

    #[tokio::test]
    async fn blank_title_gets_default() {
        let mut chats = MockChatRepository::new();
        chats.expect_create_conversation().returning(|_| Ok(()));
        let service = ChatService::new(Arc::new(chats));

        let conversation = service
            .create_conversation("owner", Some("  ".into()))
            .await
            .unwrap();
        assert_eq!(conversation.title, DEFAULT_TITLE);
    }
}
