use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::domain::entities::{Role, User};
use crate::domain::services::rbac::capabilities;
use crate::domain::services::user_service::{NewUser, UserUpdate};
use crate::presentation::middleware::AuthenticatedUser;
use crate::shared::types::{Page, Pagination};
use crate::shared::{AppState, Result};

/// Public view of a user; never carries credentials
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub tenant_id: Option<String>,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.as_str().to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.as_ref().map(|p| p.as_str().to_string()),
            tenant_id: user.tenant_id.clone(),
            is_active: user.is_active,
            two_factor_enabled: user.two_factor.enabled,
            last_login_at: user.last_login_at.map(|t| t.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
            deleted_at: user.deleted_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub include_inactive: bool,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(max = 100, message = "Last name is too long"))]
    pub last_name: String,
    pub phone: Option<String>,
    /// Only honoured for callers holding `tenants:switch`
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "First name cannot be empty"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100, message = "Last name is too long"))]
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRolesRequest {
    #[validate(length(max = 20, message = "Too many roles"))]
    pub roles: Vec<String>,
}

pub async fn list_users(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Page<UserResponse>>> {
    user.require(capabilities::USERS_READ)?;

    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let page = app_state
        .user_service
        .list_users(user.claims(), query.include_inactive, query.search, &pagination)
        .await?;

    Ok(Json(Page {
        items: page.items.iter().map(UserResponse::from).collect(),
        page: page.page,
        limit: page.limit,
        total: page.total,
    }))
}

pub async fn create_user(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonExtractor(request): JsonExtractor<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    user.require(capabilities::USERS_WRITE)?;
    request.validate()?;

    let tenant_id = if user.capabilities().allows(capabilities::TENANTS_SWITCH) {
        request.tenant_id.or_else(|| user.claims().tenant_id.clone())
    } else {
        user.claims().tenant_id.clone()
    };
    if !request.roles.is_empty() {
        user.require(capabilities::ROLES_WRITE)?;
        app_state
            .user_service
            .assignable_roles(user.claims(), &request.roles)
            .await?;
    }

    let created = app_state
        .user_service
        .create_user(
            &user.actor(),
            NewUser {
                email: request.email,
                password: request.password,
                first_name: request.first_name,
                last_name: request.last_name,
                phone: request.phone,
                tenant_id,
                role_names: request.roles,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&created))))
}

pub async fn get_user(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>> {
    if id != user.user_id() {
        user.require(capabilities::USERS_READ)?;
    }
    let found = app_state.user_service.get_user(user.claims(), &id).await?;
    Ok(Json(UserResponse::from(&found)))
}

pub async fn update_user(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateUserRequest>,
) -> Result<Json<UserResponse>> {
    // Users may edit their own profile, but not their own activation state.
    if id != user.user_id() || request.is_active.is_some() {
        user.require(capabilities::USERS_WRITE)?;
    }
    request.validate()?;

    let updated = app_state
        .user_service
        .update_user(
            user.claims(),
            &id,
            UserUpdate {
                first_name: request.first_name,
                last_name: request.last_name,
                phone: request.phone,
                is_active: request.is_active,
            },
        )
        .await?;

    Ok(Json(UserResponse::from(&updated)))
}

pub async fn deactivate_user(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>> {
    user.require(capabilities::USERS_DELETE)?;
    let deactivated = app_state.user_service.deactivate_user(user.claims(), &id).await?;
    Ok(Json(UserResponse::from(&deactivated)))
}

pub async fn list_user_roles(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<Role>>> {
    if id != user.user_id() {
        user.require(capabilities::USERS_READ)?;
    }
    // Tenant scoping check before exposing the assignment.
    app_state.user_service.get_user(user.claims(), &id).await?;
    let (roles, _) = app_state.user_service.capabilities_for(&id).await?;
    Ok(Json(roles))
}

pub async fn assign_roles(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<AssignRolesRequest>,
) -> Result<Json<Vec<Role>>> {
    user.require(capabilities::ROLES_WRITE)?;
    request.validate()?;

    let roles = app_state
        .user_service
        .assign_roles(user.claims(), &id, &request.roles)
        .await?;
    Ok(Json(roles))
}
