use axum::{extract::Path, http::StatusCode, response::Json, Json as JsonExtractor};
use serde::Deserialize;
use validator::Validate;

use crate::domain::entities::{ChatMessage, ChatRole, Conversation};
use crate::domain::services::rbac::capabilities;
use crate::presentation::middleware::TenantContext;
use crate::shared::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateConversationRequest {
    #[validate(length(max = 200, message = "Title is too long"))]
    pub title: Option<String>,
}

/// Content length is checked after trimming by the chat service
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

pub async fn list_conversations(ctx: TenantContext) -> Result<Json<Vec<Conversation>>> {
    ctx.user.require(capabilities::CHAT_USE)?;
    Ok(Json(ctx.handle.chat().list_conversations(ctx.user.user_id()).await?))
}

pub async fn create_conversation(
    ctx: TenantContext,
    JsonExtractor(request): JsonExtractor<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>)> {
    ctx.user.require(capabilities::CHAT_USE)?;
    request.validate()?;

    let conversation = ctx
        .handle
        .chat()
        .create_conversation(ctx.user.user_id(), request.title)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Conversation>> {
    ctx.user.require(capabilities::CHAT_USE)?;
    Ok(Json(ctx.handle.chat().get_conversation(ctx.user.user_id(), &id).await?))
}

pub async fn list_messages(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Vec<ChatMessage>>> {
    ctx.user.require(capabilities::CHAT_USE)?;
    Ok(Json(ctx.handle.chat().list_messages(ctx.user.user_id(), &id).await?))
}

pub async fn post_message(
    ctx: TenantContext,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<PostMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>)> {
    ctx.user.require(capabilities::CHAT_USE)?;

    let message = ctx
        .handle
        .chat()
        .post_message(ctx.user.user_id(), &id, ChatRole::User, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
