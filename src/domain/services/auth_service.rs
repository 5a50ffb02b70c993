use crate::domain::entities::User;
use crate::domain::services::rbac::{CapabilitySet, SUPER_ADMIN};
use crate::shared::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Authentication service for credentials, tokens and two-factor flows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome>;
    async fn verify_two_factor(&self, challenge_token: &str, code: &str) -> Result<AuthToken>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthToken>;
    async fn revoke_token(&self, refresh_token: &str) -> Result<()>;
    async fn validate_token(&self, token: &str) -> Result<TokenClaims>;
    /// Issues tokens for `user`, optionally marked as an impersonation
    async fn issue_tokens(&self, user: &User, impersonation: Option<ImpersonationClaim>) -> Result<AuthToken>;
    /// Rejects every access and refresh token minted for the impersonation session from now on
    async fn end_impersonation(&self, session_id: &str) -> Result<()>;
    async fn setup_two_factor(&self, user_id: &str) -> Result<TwoFactorSetup>;
    async fn enable_two_factor(&self, user_id: &str, code: &str) -> Result<Vec<String>>;
    async fn disable_two_factor(&self, user_id: &str, password: &str, code: &str) -> Result<()>;
}

/// Short-lived key/value storage for refresh tokens and throttling counters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Increments a counter, starting its TTL on first increment
    async fn increment(&self, key: &str, ttl_seconds: u64) -> Result<i64>;
}

/// JWT token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(AuthToken),
    TwoFactorRequired { challenge_token: String, expires_in: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    TwoFactor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpersonationClaim {
    pub impersonator_id: String,
    pub session_id: String,
}

/// JWT token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String, // user_id
    pub email: String,
    pub tenant_id: Option<String>,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonation_session_id: Option<String>,
    pub token_use: TokenUse,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn capability_set(&self) -> CapabilitySet {
        CapabilitySet::from_claims(&self.capabilities)
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonator_id.is_some()
    }

    pub fn is_super_admin(&self) -> bool {
        self.roles.iter().any(|r| r == SUPER_ADMIN)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_uri: String,
}
