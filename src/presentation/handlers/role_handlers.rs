use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::domain::entities::Role;
use crate::domain::services::rbac::capabilities;
use crate::presentation::middleware::AuthenticatedUser;
use crate::shared::{AppState, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 2, max = 64, message = "Role name must be 2-64 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 2, max = 64, message = "Role name must be 2-64 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,
    pub capabilities: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CapabilityCatalogue {
    pub capabilities: Vec<&'static str>,
}

pub async fn list_roles(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Role>>> {
    user.require(capabilities::ROLES_READ)?;
    Ok(Json(app_state.role_service.list().await?))
}

pub async fn list_capabilities(user: AuthenticatedUser) -> Result<Json<CapabilityCatalogue>> {
    user.require(capabilities::ROLES_READ)?;
    Ok(Json(CapabilityCatalogue {
        capabilities: capabilities::ALL.to_vec(),
    }))
}

pub async fn get_role(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Role>> {
    user.require(capabilities::ROLES_READ)?;
    Ok(Json(app_state.role_service.get(&id).await?))
}

pub async fn create_role(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonExtractor(request): JsonExtractor<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>)> {
    user.require(capabilities::ROLES_WRITE)?;
    request.validate()?;

    let role = app_state
        .role_service
        .create(user.claims(), &request.name, request.description, &request.capabilities)
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn update_role(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateRoleRequest>,
) -> Result<Json<Role>> {
    user.require(capabilities::ROLES_WRITE)?;
    request.validate()?;

    let role = app_state
        .role_service
        .update(
            user.claims(),
            &id,
            request.name.as_deref(),
            request.description,
            request.capabilities.as_deref(),
        )
        .await?;
    Ok(Json(role))
}

pub async fn delete_role(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    user.require(capabilities::ROLES_WRITE)?;
    app_state.role_service.delete(user.claims(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
