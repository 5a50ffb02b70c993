use axum::{
    extract::{Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::Json,
    Json as JsonExtractor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::auth_handlers::TokenResponse;
use crate::domain::entities::{AuditEntry, ImpersonationSession};
use crate::domain::repositories::AuditFilter;
use crate::domain::services::impersonation::RequestOrigin;
use crate::domain::services::rbac::capabilities;
use crate::presentation::middleware::AuthenticatedUser;
use crate::shared::types::Pagination;
use crate::shared::{AppState, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct StartImpersonationRequest {
    #[validate(length(min = 1, message = "Target user is required"))]
    pub user_id: String,
    #[validate(length(min = 3, max = 500, message = "Reason must be 3-500 characters"))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ImpersonationResponse {
    pub session: ImpersonationSession,
    pub token: TokenResponse,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Client address and agent, as reported by the proxy in front of us
fn request_origin(headers: &HeaderMap) -> RequestOrigin {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    RequestOrigin {
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| header("x-real-ip").map(str::to_string)),
        user_agent: header(USER_AGENT.as_str()).map(str::to_string),
    }
}

pub async fn start_impersonation(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    JsonExtractor(request): JsonExtractor<StartImpersonationRequest>,
) -> Result<(StatusCode, Json<ImpersonationResponse>)> {
    user.require(capabilities::USERS_IMPERSONATE)?;
    request.validate()?;

    let (session, token) = app_state
        .impersonation_service
        .start(user.claims(), &request.user_id, &request.reason, request_origin(&headers))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ImpersonationResponse {
            session,
            token: token.into(),
        }),
    ))
}

/// Ends the session carried by the current token and returns the admin's own tokens
pub async fn stop_impersonation(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<TokenResponse>> {
    let token = app_state.impersonation_service.stop(user.claims()).await?;
    Ok(Json(token.into()))
}

pub async fn list_impersonations(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ImpersonationSession>>> {
    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };
    Ok(Json(
        app_state
            .impersonation_service
            .list(user.claims(), &pagination)
            .await?,
    ))
}

pub async fn list_audit(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>> {
    user.require(capabilities::AUDIT_READ)?;

    // Tenant-bound auditors only see their own tenant's trail.
    let tenant_id = if user.capabilities().allows(capabilities::TENANTS_SWITCH) {
        query.tenant_id
    } else {
        user.claims().tenant_id.clone()
    };
    let filter = AuditFilter {
        actor_id: query.actor_id,
        action: query.action,
        tenant_id,
    };
    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };

    let entries = app_state.audit.repository().list(&filter, &pagination).await?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let origin = request_origin(&headers);
        assert_eq!(origin.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(origin.user_agent.as_deref(), Some("curl/8.0"));

        let origin = request_origin(&HeaderMap::new());
        assert!(origin.ip_address.is_none());
        assert!(origin.user_agent.is_none());
    }
}
