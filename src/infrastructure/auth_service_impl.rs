use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use totp_rs::{Secret, TOTP};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::domain::entities::{TwoFactorState, User};
use crate::domain::repositories::{RoleRepository, UserRepository};
use crate::domain::services::rbac::{capabilities, CapabilitySet};
use crate::domain::services::{
    AuthService, AuthToken, ImpersonationClaim, LoginOutcome, SessionStore, TokenClaims, TokenUse,
    TwoFactorSetup,
};
use crate::shared::types::Email;
use crate::shared::utils::{hash_password, verify_password};
use crate::shared::{Result, TimeChatError};

const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_LENGTH: usize = 8;

/// What a refresh token stands for, stored as JSON under `refresh_token:<token>`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefreshSession {
    user_id: String,
    impersonator_id: Option<String>,
    session_id: Option<String>,
}

fn invalid_credentials() -> TimeChatError {
    TimeChatError::unauthorized("Invalid email or password")
}

fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            rand::thread_rng()
                .sample_iter(&rand::distributions::Alphanumeric)
                .take(BACKUP_CODE_LENGTH)
                .map(char::from)
                .collect::<String>()
                .to_uppercase()
        })
        .collect()
}

pub struct AuthServiceImpl {
    config: AuthConfig,
    sessions: Arc<dyn SessionStore>,
    user_repo: Arc<dyn UserRepository>,
    role_repo: Arc<dyn RoleRepository>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthServiceImpl {
    pub fn new(
        config: AuthConfig,
        sessions: Arc<dyn SessionStore>,
        user_repo: Arc<dyn UserRepository>,
        role_repo: Arc<dyn RoleRepository>,
    ) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_ref());

        Self {
            config,
            sessions,
            user_repo,
            role_repo,
            encoding_key,
            decoding_key,
        }
    }

    fn build_totp(&self, secret_base32: &str, account: &str) -> Result<TOTP> {
        let secret = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| TimeChatError::internal(format!("Failed to decode TOTP secret: {:?}", e)))?;

        TOTP::new(
            totp_rs::Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some(self.config.two_factor_issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| TimeChatError::internal(format!("Failed to create TOTP: {}", e)))
    }

    fn check_totp(&self, secret_base32: &str, account: &str, code: &str) -> Result<bool> {
        let totp = self.build_totp(secret_base32, account)?;
        totp.check_current(code.trim())
            .map_err(|e| TimeChatError::internal(format!("TOTP check error: {}", e)))
    }

    /// Checks a TOTP code, falling back to backup codes; a matched backup code is consumed
    fn verify_second_factor(&self, user: &mut User, code: &str) -> Result<bool> {
        let Some(secret) = user.two_factor.secret.clone() else {
            return Ok(false);
        };
        if self.check_totp(&secret, user.email.as_str(), code)? {
            return Ok(true);
        }

        let candidate = code.trim().to_uppercase();
        let mut matched = None;
        for (index, hash) in user.two_factor.backup_codes.iter().enumerate() {
            if verify_password(&candidate, hash)? {
                matched = Some(index);
                break;
            }
        }

        match matched {
            Some(index) => {
                user.two_factor.backup_codes.remove(index);
                info!(
                    user_id = %user.id,
                    remaining = user.two_factor.backup_codes.len(),
                    "Backup code consumed"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn attempts_key(email: &str) -> String {
        format!("login_attempts:{}", email)
    }

    fn refresh_key(token: &str) -> String {
        format!("refresh_token:{}", token)
    }

    fn ended_impersonation_key(session_id: &str) -> String {
        format!("impersonation_ended:{}", session_id)
    }

    fn refresh_ttl_seconds(&self) -> u64 {
        (self.config.refresh_token_days * 24 * 3600) as u64
    }

    async fn ensure_impersonation_live(&self, session_id: Option<&str>) -> Result<()> {
        let Some(session_id) = session_id else {
            return Ok(());
        };
        if self
            .sessions
            .get(&Self::ended_impersonation_key(session_id))
            .await?
            .is_some()
        {
            return Err(TimeChatError::unauthorized("Impersonation session has ended"));
        }
        Ok(())
    }

    async fn ensure_not_locked(&self, email: &str) -> Result<()> {
        let attempts = self
            .sessions
            .get(&Self::attempts_key(email))
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if attempts >= self.config.max_login_attempts {
            metrics::counter!("auth_login_total", "outcome" => "locked").increment(1);
            return Err(TimeChatError::RateLimitExceeded {
                resource: "login attempts".to_string(),
            });
        }
        Ok(())
    }

    async fn record_failure(&self, email: &str) -> Result<()> {
        let count = self
            .sessions
            .increment(
                &Self::attempts_key(email),
                (self.config.login_lockout_minutes * 60) as u64,
            )
            .await?;
        metrics::counter!("auth_login_total", "outcome" => "failure").increment(1);
        if count >= self.config.max_login_attempts {
            warn!(email, attempts = count, "Login locked after repeated failures");
        }
        Ok(())
    }

    fn decode_claims(&self, token: &str) -> Result<TokenClaims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| TimeChatError::AuthenticationFailed {
                reason: format!("Invalid token: {}", e),
            })
    }

    fn encode_claims(&self, claims: &TokenClaims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| TimeChatError::internal(format!("Failed to sign token: {}", e)))
    }

    fn challenge_token(&self, user: &User) -> Result<(String, i64)> {
        let now = Utc::now();
        let expires_in = self.config.two_factor_challenge_minutes * 60;
        let claims = TokenClaims {
            sub: user.id.clone(),
            email: user.email.as_str().to_string(),
            tenant_id: user.tenant_id.clone(),
            roles: Vec::new(),
            capabilities: Vec::new(),
            impersonator_id: None,
            impersonation_session_id: None,
            token_use: TokenUse::TwoFactor,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(expires_in)).timestamp(),
        };
        Ok((self.encode_claims(&claims)?, expires_in))
    }

    async fn load_user(&self, user_id: &str) -> Result<User> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("User with ID: {}", user_id)))
    }

    async fn complete_login(&self, mut user: User) -> Result<AuthToken> {
        user.record_login();
        self.user_repo.update(&user).await?;
        metrics::counter!("auth_login_total", "outcome" => "success").increment(1);
        info!(user_id = %user.id, "User signed in");
        self.issue_tokens(&user, None).await
    }
}

#[async_trait]
impl AuthService for AuthServiceImpl {
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let email = Email::new(email).map_err(|_| invalid_credentials())?;
        self.ensure_not_locked(email.as_str()).await?;

        let user = match self.user_repo.find_by_email(&email).await? {
            Some(user) if verify_password(password, &user.password_hash)? => user,
            _ => {
                self.record_failure(email.as_str()).await?;
                return Err(invalid_credentials());
            }
        };

        if !user.can_sign_in() {
            metrics::counter!("auth_login_total", "outcome" => "inactive").increment(1);
            return Err(TimeChatError::unauthorized("Account is deactivated"));
        }
        self.sessions.delete(&Self::attempts_key(email.as_str())).await?;

        if user.two_factor.enabled {
            let (challenge_token, expires_in) = self.challenge_token(&user)?;
            metrics::counter!("auth_login_total", "outcome" => "two_factor").increment(1);
            return Ok(LoginOutcome::TwoFactorRequired {
                challenge_token,
                expires_in,
            });
        }

        Ok(LoginOutcome::Authenticated(self.complete_login(user).await?))
    }

    async fn verify_two_factor(&self, challenge_token: &str, code: &str) -> Result<AuthToken> {
        let claims = self.decode_claims(challenge_token)?;
        if claims.token_use != TokenUse::TwoFactor {
            return Err(TimeChatError::unauthorized("Not a two-factor challenge"));
        }
        self.ensure_not_locked(&claims.email).await?;

        let mut user = self
            .user_repo
            .find_by_id(&claims.sub)
            .await?
            .filter(|u| u.can_sign_in() && u.two_factor.enabled)
            .ok_or_else(|| TimeChatError::unauthorized("Two-factor challenge is no longer valid"))?;

        if !self.verify_second_factor(&mut user, code)? {
            self.record_failure(&claims.email).await?;
            return Err(TimeChatError::unauthorized("Invalid two-factor code"));
        }

        self.complete_login(user).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthToken> {
        let key = Self::refresh_key(refresh_token);
        let stored = self
            .sessions
            .get(&key)
            .await?
            .ok_or_else(|| TimeChatError::unauthorized("Invalid refresh token"))?;
        // Rotation: each refresh token is good for exactly one exchange.
        if !self.sessions.delete(&key).await? {
            return Err(TimeChatError::unauthorized("Invalid refresh token"));
        }

        let session: RefreshSession = serde_json::from_str(&stored)
            .map_err(|e| TimeChatError::internal(format!("Corrupt refresh session: {}", e)))?;

        self.ensure_impersonation_live(session.session_id.as_deref()).await?;

        let user = self
            .user_repo
            .find_by_id(&session.user_id)
            .await?
            .filter(|u| u.can_sign_in())
            .ok_or_else(|| TimeChatError::unauthorized("User not found or inactive"))?;

        let impersonation = match (session.impersonator_id, session.session_id) {
            (Some(impersonator_id), Some(session_id)) => Some(ImpersonationClaim {
                impersonator_id,
                session_id,
            }),
            _ => None,
        };
        self.issue_tokens(&user, impersonation).await
    }

    async fn revoke_token(&self, refresh_token: &str) -> Result<()> {
        self.sessions.delete(&Self::refresh_key(refresh_token)).await?;
        Ok(())
    }

    async fn validate_token(&self, token: &str) -> Result<TokenClaims> {
        let claims = self.decode_claims(token)?;
        if claims.token_use != TokenUse::Access {
            return Err(TimeChatError::unauthorized("Token cannot be used for API access"));
        }
        self.ensure_impersonation_live(claims.impersonation_session_id.as_deref())
            .await?;
        Ok(claims)
    }

    async fn issue_tokens(&self, user: &User, impersonation: Option<ImpersonationClaim>) -> Result<AuthToken> {
        let roles = self.role_repo.roles_for_user(&user.id).await?;
        let mut capability_set = CapabilitySet::from_roles(&roles);
        if impersonation.is_some() {
            capability_set.remove(capabilities::USERS_IMPERSONATE);
        }

        let now = Utc::now();
        let expires_in = self.config.access_token_minutes * 60;
        let claims = TokenClaims {
            sub: user.id.clone(),
            email: user.email.as_str().to_string(),
            tenant_id: user.tenant_id.clone(),
            roles: roles.into_iter().map(|r| r.name).collect(),
            capabilities: capability_set.into_vec(),
            impersonator_id: impersonation.as_ref().map(|i| i.impersonator_id.clone()),
            impersonation_session_id: impersonation.as_ref().map(|i| i.session_id.clone()),
            token_use: TokenUse::Access,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(expires_in)).timestamp(),
        };
        let access_token = self.encode_claims(&claims)?;

        let refresh_token = crate::shared::utils::generate_id();
        let session = RefreshSession {
            user_id: user.id.clone(),
            impersonator_id: claims.impersonator_id.clone(),
            session_id: claims.impersonation_session_id.clone(),
        };
        self.sessions
            .set(
                &Self::refresh_key(&refresh_token),
                &serde_json::to_string(&session)?,
                self.refresh_ttl_seconds(),
            )
            .await?;

        Ok(AuthToken {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
            user_id: user.id.clone(),
        })
    }

    /// Outlives every refresh token issued before the marker was written
    async fn end_impersonation(&self, session_id: &str) -> Result<()> {
        self.sessions
            .set(
                &Self::ended_impersonation_key(session_id),
                "1",
                self.refresh_ttl_seconds(),
            )
            .await?;
        info!(session_id, "Impersonation tokens revoked");
        Ok(())
    }

    async fn setup_two_factor(&self, user_id: &str) -> Result<TwoFactorSetup> {
        let mut user = self.load_user(user_id).await?;
        if user.two_factor.enabled {
            return Err(TimeChatError::conflict("two_factor", "Two-factor authentication is already enabled"));
        }

        let secret = Secret::generate_secret().to_encoded().to_string();
        let otpauth_uri = self.build_totp(&secret, user.email.as_str())?.get_url();

        user.two_factor.pending_secret = Some(secret.clone());
        user.touch();
        self.user_repo.update(&user).await?;

        Ok(TwoFactorSetup { secret, otpauth_uri })
    }

    async fn enable_two_factor(&self, user_id: &str, code: &str) -> Result<Vec<String>> {
        let mut user = self.load_user(user_id).await?;
        if user.two_factor.enabled {
            return Err(TimeChatError::conflict("two_factor", "Two-factor authentication is already enabled"));
        }
        let pending = user
            .two_factor
            .pending_secret
            .clone()
            .ok_or_else(|| TimeChatError::validation("code", "Run two-factor setup first"))?;

        if !self.check_totp(&pending, user.email.as_str(), code)? {
            return Err(TimeChatError::validation("code", "Invalid two-factor code"));
        }

        let backup_codes = generate_backup_codes();
        let hashed = backup_codes
            .iter()
            .map(|c| hash_password(c))
            .collect::<Result<Vec<_>>>()?;

        user.two_factor = TwoFactorState {
            enabled: true,
            secret: Some(pending),
            pending_secret: None,
            backup_codes: hashed,
        };
        user.touch();
        self.user_repo.update(&user).await?;
        info!(user_id = %user.id, "Two-factor authentication enabled");

        Ok(backup_codes)
    }

    async fn disable_two_factor(&self, user_id: &str, password: &str, code: &str) -> Result<()> {
        let mut user = self.load_user(user_id).await?;
        if !verify_password(password, &user.password_hash)? {
            return Err(invalid_credentials());
        }
        if !user.two_factor.enabled {
            return Err(TimeChatError::validation("code", "Two-factor authentication is not enabled"));
        }
        if !self.verify_second_factor(&mut user, code)? {
            return Err(TimeChatError::unauthorized("Invalid two-factor code"));
        }

        user.two_factor = TwoFactorState::default();
        user.touch();
        self.user_repo.update(&user).await?;
        info!(user_id = %user.id, "Two-factor authentication disabled");
        Ok(())
    }
}
