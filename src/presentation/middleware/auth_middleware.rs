use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::domain::services::audit::Actor;
use crate::domain::services::rbac::CapabilitySet;
use crate::domain::services::{AuthService, TokenClaims, TokenUse};
use crate::shared::{Result, TimeChatError};

/// JWT authentication middleware; only access tokens pass
pub async fn auth_middleware(
    State(auth_service): State<Arc<dyn AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = extract_token(&request)?;

    let claims = auth_service.validate_token(&token).await.map_err(|e| {
        warn!("Token validation failed: {}", e);
        TimeChatError::unauthorized("Invalid or expired token")
    })?;

    if claims.token_use != TokenUse::Access {
        return Err(TimeChatError::unauthorized("Token cannot be used for API access"));
    }

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extract Bearer token from Authorization header
fn extract_token(request: &Request) -> Result<String> {
    let missing = || TimeChatError::unauthorized("Missing bearer token");

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(missing)?
        .to_str()
        .map_err(|_| missing())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(missing)?;

    Ok(token.to_string())
}

/// Claims of the caller, placed in the request by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub TokenClaims);

impl AuthenticatedUser {
    pub fn claims(&self) -> &TokenClaims {
        &self.0
    }

    pub fn user_id(&self) -> &str {
        &self.0.sub
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.0.capability_set()
    }

    pub fn require(&self, capability: &str) -> Result<()> {
        self.capabilities().require(capability)
    }

    pub fn actor(&self) -> Actor {
        Actor::from(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = TimeChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<TokenClaims>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or_else(|| TimeChatError::unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::MockAuthService;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn claims(token_use: TokenUse) -> TokenClaims {
        TokenClaims {
            sub: "u1".into(),
            email: "u1@example.com".into(),
            tenant_id: Some("t1".into()),
            roles: vec!["user".into()],
            capabilities: vec!["chat:use".into()],
            impersonator_id: None,
            impersonation_session_id: None,
            token_use,
            iat: 0,
            exp: i64::MAX,
        }
    }

    async fn whoami(user: AuthenticatedUser) -> Result<String> {
        user.require("chat:use")?;
        Ok(user.user_id().to_string())
    }

    fn app(auth: MockAuthService) -> Router {
        let auth: Arc<dyn AuthService> = Arc::new(auth);
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(auth, auth_middleware))
    }

    fn request(authorization: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        let mut auth = MockAuthService::new();
        auth.expect_validate_token().never();
        let app = app(auth);

        let response = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request(Some("Token abc"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_access_token_reaches_handler() {
        let mut auth = MockAuthService::new();
        auth.expect_validate_token()
            .withf(|token| token == "good")
            .returning(|_| Ok(claims(TokenUse::Access)));

        let response = app(auth).oneshot(request(Some("Bearer good"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"u1");
    }

    #[tokio::test]
    async fn challenge_tokens_are_rejected() {
        let mut auth = MockAuthService::new();
        auth.expect_validate_token()
            .returning(|_| Ok(claims(TokenUse::TwoFactor)));

        let response = app(auth).oneshot(request(Some("Bearer challenge"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let mut auth = MockAuthService::new();
        auth.expect_validate_token()
            .returning(|_| Err(TimeChatError::unauthorized("expired")));

        let response = app(auth).oneshot(request(Some("Bearer stale"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
