use axum::{extract::State, http::StatusCode, response::Json, Json as JsonExtractor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::user_handlers::UserResponse;
use crate::domain::services::audit::Actor;
use crate::domain::services::tenancy::TenantSelector;
use crate::domain::services::user_service::NewUser;
use crate::domain::services::{AuthToken, LoginOutcome, TwoFactorSetup};
use crate::presentation::middleware::AuthenticatedUser;
use crate::shared::{AppState, Result, TimeChatError};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(max = 100, message = "Last name is too long"))]
    pub last_name: String,
    #[validate(length(min = 3, max = 48, message = "Invalid tenant slug"))]
    pub tenant_slug: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 3, max = 254, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyTwoFactorRequest {
    #[validate(length(min = 1, message = "Challenge token is required"))]
    pub challenge_token: String,
    #[validate(length(min = 6, max = 16, message = "Invalid code"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EnableTwoFactorRequest {
    #[validate(length(min = 6, max = 8, message = "Invalid code"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DisableTwoFactorRequest {
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[validate(length(min = 6, max = 16, message = "Invalid code"))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user_id: String,
}

impl From<AuthToken> for TokenResponse {
    fn from(token: AuthToken) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
            user_id: token.user_id,
        }
    }
}

/// Either tokens or a pending second-factor challenge
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Authenticated(TokenResponse),
    TwoFactorRequired {
        requires_two_factor: bool,
        challenge_token: String,
        expires_in: i64,
    },
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Authenticated(token) => LoginResponse::Authenticated(token.into()),
            LoginOutcome::TwoFactorRequired {
                challenge_token,
                expires_in,
            } => LoginResponse::TwoFactorRequired {
                requires_two_factor: true,
                challenge_token,
                expires_in,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub tenant_id: Option<String>,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    pub impersonator_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

/// Register a user into an existing tenant
pub async fn register(
    State(app_state): State<Arc<AppState>>,
    JsonExtractor(request): JsonExtractor<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    request.validate()?;

    let tenant = app_state
        .tenant_router
        .resolver()
        .resolve(&TenantSelector::Slug(request.tenant_slug.trim().to_lowercase()))
        .await?;

    let user = app_state
        .user_service
        .create_user(
            &Actor::system(),
            NewUser {
                email: request.email,
                password: request.password,
                first_name: request.first_name,
                last_name: request.last_name,
                phone: None,
                tenant_id: Some(tenant.id.clone()),
                role_names: Vec::new(),
            },
        )
        .await?;

    info!(user_id = %user.id, tenant_id = %tenant.id, "User registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

pub async fn login(
    State(app_state): State<Arc<AppState>>,
    JsonExtractor(request): JsonExtractor<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    request.validate()?;

    let outcome = app_state
        .auth_service
        .login(&request.email, &request.password)
        .await?;

    Ok(Json(outcome.into()))
}

/// Exchange a login challenge plus TOTP or backup code for tokens
pub async fn verify_two_factor(
    State(app_state): State<Arc<AppState>>,
    JsonExtractor(request): JsonExtractor<VerifyTwoFactorRequest>,
) -> Result<Json<TokenResponse>> {
    request.validate()?;

    let token = app_state
        .auth_service
        .verify_two_factor(&request.challenge_token, &request.code)
        .await?;

    Ok(Json(token.into()))
}

/// Refresh access token
pub async fn refresh_token(
    State(app_state): State<Arc<AppState>>,
    JsonExtractor(request): JsonExtractor<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>> {
    let token = app_state
        .auth_service
        .refresh_token(&request.refresh_token)
        .await?;

    Ok(Json(token.into()))
}

/// Logout user (revoke refresh token)
pub async fn logout(
    State(app_state): State<Arc<AppState>>,
    JsonExtractor(request): JsonExtractor<RefreshTokenRequest>,
) -> Result<StatusCode> {
    app_state
        .auth_service
        .revoke_token(&request.refresh_token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<MeResponse>> {
    let record = app_state
        .user_repository
        .find_by_id(user.user_id())
        .await?
        .ok_or_else(|| TimeChatError::unauthorized("User no longer exists"))?;

    let claims = user.claims();
    Ok(Json(MeResponse {
        user: UserResponse::from(&record),
        tenant_id: claims.tenant_id.clone(),
        roles: claims.roles.clone(),
        capabilities: claims.capabilities.clone(),
        impersonator_id: claims.impersonator_id.clone(),
    }))
}

pub async fn setup_two_factor(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<TwoFactorSetup>> {
    let setup = app_state.auth_service.setup_two_factor(user.user_id()).await?;
    Ok(Json(setup))
}

pub async fn enable_two_factor(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonExtractor(request): JsonExtractor<EnableTwoFactorRequest>,
) -> Result<Json<BackupCodesResponse>> {
    request.validate()?;

    let backup_codes = app_state
        .auth_service
        .enable_two_factor(user.user_id(), &request.code)
        .await?;

    app_state
        .audit
        .record(user.actor().entry("user.two_factor_enabled", "user").resource(user.user_id()))
        .await;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

pub async fn disable_two_factor(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonExtractor(request): JsonExtractor<DisableTwoFactorRequest>,
) -> Result<StatusCode> {
    request.validate()?;

    app_state
        .auth_service
        .disable_two_factor(user.user_id(), &request.password, &request.code)
        .await?;

    app_state
        .audit
        .record(user.actor().entry("user.two_factor_disabled", "user").resource(user.user_id()))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_response_shape() {
        let response = LoginResponse::from(LoginOutcome::TwoFactorRequired {
            challenge_token: "c".into(),
            expires_in: 300,
        });
        let body = serde_json::to_value(response).unwrap();
        assert_eq!(body["requires_two_factor"], true);
        assert_eq!(body["challenge_token"], "c");
        assert!(body.get("access_token").is_none());
    }

    #[test]
    fn register_request_is_validated() {
        let request = RegisterRequest {
            email: "not-an-email".into(),
            password: "short".into(),
            first_name: "Ana".into(),
            last_name: "".into(),
            tenant_slug: "acme".into(),
        };
        let err = request.validate().unwrap_err();
        assert!(err.field_errors().contains_key("email"));
        assert!(err.field_errors().contains_key("password"));
    }
}
