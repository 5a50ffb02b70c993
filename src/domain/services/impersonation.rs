use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::domain::entities::ImpersonationSession;
use crate::domain::repositories::{ImpersonationRepository, RoleRepository, UserRepository};
use crate::domain::services::audit::{Actor, AuditLog};
use crate::domain::services::rbac::{capabilities, SUPER_ADMIN};
use crate::domain::services::{AuthService, AuthToken, ImpersonationClaim, TokenClaims};
use crate::shared::types::Pagination;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct ImpersonationService {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    sessions: Arc<dyn ImpersonationRepository>,
    auth: Arc<dyn AuthService>,
    audit: AuditLog,
}

impl ImpersonationService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<dyn RoleRepository>,
        sessions: Arc<dyn ImpersonationRepository>,
        auth: Arc<dyn AuthService>,
        audit: AuditLog,
    ) -> Self {
        Self {
            users,
            roles,
            sessions,
            auth,
            audit,
        }
    }

    pub async fn start(
        &self,
        claims: &TokenClaims,
        target_user_id: &str,
        reason: &str,
        origin: RequestOrigin,
    ) -> Result<(ImpersonationSession, AuthToken)> {
        let caps = claims.capability_set();
        caps.require(capabilities::USERS_IMPERSONATE)?;

        if claims.is_impersonating() {
            return Err(TimeChatError::validation(
                "session",
                "Already impersonating; stop the current session first",
            ));
        }
        if claims.sub == target_user_id {
            return Err(TimeChatError::validation("user_id", "Cannot impersonate yourself"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TimeChatError::validation("reason", "A reason is required"));
        }

        let target = self
            .users
            .find_by_id(target_user_id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("User with ID: {}", target_user_id)))?;

        if !target.can_sign_in() {
            return Err(TimeChatError::validation("user_id", "Cannot impersonate an inactive user"));
        }

        let caller_is_super_admin = claims.roles.iter().any(|r| r == SUPER_ADMIN);
        if !caps.allows(capabilities::TENANTS_SWITCH) && target.tenant_id != claims.tenant_id {
            return Err(TimeChatError::forbidden("Target user belongs to another tenant"));
        }

        let target_roles = self.roles.roles_for_user(&target.id).await?;
        if target_roles.iter().any(|r| r.name == SUPER_ADMIN) && !caller_is_super_admin {
            return Err(TimeChatError::forbidden("Only super admins can impersonate super admins"));
        }

        let mut session = ImpersonationSession::new(
            claims.sub.clone(),
            target.id.clone(),
            reason.to_string(),
        );
        session.tenant_id = target.tenant_id.clone();
        session.ip_address = origin.ip_address;
        session.user_agent = origin.user_agent;
        self.sessions.create(&session).await?;

        let token = self
            .auth
            .issue_tokens(
                &target,
                Some(ImpersonationClaim {
                    impersonator_id: claims.sub.clone(),
                    session_id: session.id.clone(),
                }),
            )
            .await?;

        metrics::counter!("impersonation_started_total").increment(1);
        info!(
            admin_id = %claims.sub,
            target_user_id = %target.id,
            session_id = %session.id,
            "Impersonation started"
        );
        self.audit
            .record(
                Actor::from(claims)
                    .entry("impersonation.started", "user")
                    .resource(&target.id)
                    .metadata(json!({ "session_id": session.id, "reason": session.reason })),
            )
            .await;

        Ok((session, token))
    }

    pub async fn stop(&self, claims: &TokenClaims) -> Result<AuthToken> {
        let (admin_id, session_id) = match (&claims.impersonator_id, &claims.impersonation_session_id) {
            (Some(admin_id), Some(session_id)) => (admin_id.clone(), session_id.clone()),
            _ => {
                return Err(TimeChatError::validation(
                    "session",
                    "Current token is not an impersonation session",
                ))
            }
        };

        let session = self
            .sessions
            .find_by_id(&session_id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("Impersonation session: {}", session_id)))?;

        if session.is_active() {
            self.sessions
                .end(&session.id, crate::shared::utils::now())
                .await?;
        }
        self.auth.end_impersonation(&session.id).await?;

        let admin = self
            .users
            .find_by_id(&admin_id)
            .await?
            .filter(|u| u.can_sign_in())
            .ok_or_else(|| TimeChatError::unauthorized("Impersonating admin is no longer active"))?;

        info!(admin_id = %admin.id, session_id = %session.id, "Impersonation stopped");
        self.audit
            .record(
                Actor::from(claims)
                    .entry("impersonation.stopped", "user")
                    .resource(&session.target_user_id)
                    .metadata(json!({ "session_id": session.id })),
            )
            .await;

        self.auth.issue_tokens(&admin, None).await
    }

    /// Callers without `tenants:switch` only see sessions targeting their own tenant
    pub async fn list(&self, claims: &TokenClaims, pagination: &Pagination) -> Result<Vec<ImpersonationSession>> {
        claims.capability_set().require(capabilities::AUDIT_READ)?;

        let tenant_id = if claims.capability_set().allows(capabilities::TENANTS_SWITCH) {
            None
        } else {
            Some(claims.tenant_id.clone().ok_or_else(|| {
                TimeChatError::forbidden("Listing impersonations requires a tenant")
            })?)
        };
        self.sessions.list(tenant_id, pagination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Role, User};
    use crate::domain::repositories::{
        MockAuditRepository, MockImpersonationRepository, MockRoleRepository, MockUserRepository,
    };
    use crate::domain::services::{MockAuthService, TokenUse};
    use crate::shared::types::Email;

    fn admin_claims(tenant: &str) -> TokenClaims {
        TokenClaims {
            sub: "admin-1".into(),
            email: "admin@example.com".into(),
            tenant_id: Some(tenant.into()),
            roles: vec!["tenant_admin".into()],
            capabilities: vec![capabilities::USERS_IMPERSONATE.into()],
            impersonator_id: None,
            impersonation_session_id: None,
            token_use: TokenUse::Access,
            iat: 0,
            exp: 0,
        }
    }

    fn user_in(tenant: &str) -> User {
        User::new(
            Email::new("target@example.com").unwrap(),
            "hash".into(),
            "Tara".into(),
            "Get".into(),
            Some(tenant.into()),
        )
    }

    fn token(user_id: &str) -> AuthToken {
        AuthToken {
            access_token: "jwt".into(),
            refresh_token: "refresh".into(),
            token_type: "Bearer".into(),
            expires_in: 900,
            user_id: user_id.into(),
        }
    }

    fn audit_ok() -> AuditLog {
        let mut audit = MockAuditRepository::new();
        audit.expect_record().returning(|_| Ok(()));
        AuditLog::new(Arc::new(audit))
    }

    fn service(
        users: MockUserRepository,
        roles: MockRoleRepository,
        sessions: MockImpersonationRepository,
        auth: MockAuthService,
    ) -> ImpersonationService {
        ImpersonationService::new(
            Arc::new(users),
            Arc::new(roles),
            Arc::new(sessions),
            Arc::new(auth),
            audit_ok(),
        )
    }

    #[tokio::test]
    async fn start_records_session_and_marks_token() {
        let target = user_in("t1");
        let target_id = target.id.clone();

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));
        let mut roles = MockRoleRepository::new();
        roles
            .expect_roles_for_user()
            .returning(|_| Ok(vec![Role::system("user", "user", vec![])]));
        let mut sessions = MockImpersonationRepository::new();
        sessions.expect_create().times(1).returning(|_| Ok(()));
        let mut auth = MockAuthService::new();
        auth.expect_issue_tokens()
            .withf(|_, claim| {
                claim
                    .as_ref()
                    .map(|c| c.impersonator_id == "admin-1")
                    .unwrap_or(false)
            })
            .returning(|user, _| Ok(token(&user.id)));

        let service = service(users, roles, sessions, auth);
        let (session, token) = service
            .start(&admin_claims("t1"), &target_id, "support ticket 881", RequestOrigin::default())
            .await
            .unwrap();

        assert_eq!(session.admin_id, "admin-1");
        assert_eq!(session.target_user_id, target_id);
        assert_eq!(session.tenant_id.as_deref(), Some("t1"));
        assert!(session.is_active());
        assert_eq!(token.user_id, target_id);
    }

    #[tokio::test]
    async fn self_and_nested_impersonation_are_rejected() {
        let service = service(
            MockUserRepository::new(),
            MockRoleRepository::new(),
            MockImpersonationRepository::new(),
            MockAuthService::new(),
        );

        let claims = admin_claims("t1");
        let err = service
            .start(&claims, "admin-1", "why", RequestOrigin::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);

        let mut nested = admin_claims("t1");
        nested.impersonator_id = Some("someone".into());
        let err = service
            .start(&nested, "user-2", "why", RequestOrigin::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cross_tenant_target_is_forbidden() {
        let target = user_in("t2");
        let target_id = target.id.clone();
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));
        let mut sessions = MockImpersonationRepository::new();
        sessions.expect_create().never();

        let service = service(users, MockRoleRepository::new(), sessions, MockAuthService::new());
        let err = service
            .start(&admin_claims("t1"), &target_id, "audit", RequestOrigin::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn stop_ends_session_revokes_tokens_and_returns_admin_token() {
        let admin = user_in("t1");
        let admin_id = admin.id.clone();
        let session = ImpersonationSession::new(admin_id.clone(), "target".into(), "r".into());
        let session_id = session.id.clone();

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(admin.clone())));
        let mut sessions = MockImpersonationRepository::new();
        sessions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(session.clone())));
        sessions.expect_end().times(1).returning(|_, _| Ok(()));
        let mut auth = MockAuthService::new();
        let ended = session_id.clone();
        auth.expect_end_impersonation()
            .withf(move |id| id == ended)
            .times(1)
            .returning(|_| Ok(()));
        auth.expect_issue_tokens()
            .withf(|_, claim| claim.is_none())
            .returning(|user, _| Ok(token(&user.id)));

        let service = service(users, MockRoleRepository::new(), sessions, auth);

        let mut claims = admin_claims("t1");
        claims.sub = "target".into();
        claims.impersonator_id = Some(admin_id.clone());
        claims.impersonation_session_id = Some(session_id);

        let token = service.stop(&claims).await.unwrap();
        assert_eq!(token.user_id, admin_id);

        let err = service.stop(&admin_claims("t1")).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_callers_tenant() {
        let mut sessions = MockImpersonationRepository::new();
        sessions
            .expect_list()
            .withf(|tenant, _| tenant.as_deref() == Some("t1"))
            .times(1)
            .returning(|_, _| Ok(vec![]));
        sessions
            .expect_list()
            .withf(|tenant, _| tenant.is_none())
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let service = service(
            MockUserRepository::new(),
            MockRoleRepository::new(),
            sessions,
            MockAuthService::new(),
        );
        let pagination = Pagination::default();

        let mut auditor = admin_claims("t1");
        auditor.capabilities = vec![capabilities::AUDIT_READ.to_string()];
        assert!(service.list(&auditor, &pagination).await.unwrap().is_empty());

        let mut platform = admin_claims("t1");
        platform.capabilities = vec![
            capabilities::AUDIT_READ.to_string(),
            capabilities::TENANTS_SWITCH.to_string(),
        ];
        assert!(service.list(&platform, &pagination).await.unwrap().is_empty());

        let mut homeless = admin_claims("t1");
        homeless.tenant_id = None;
        homeless.capabilities = vec![capabilities::AUDIT_READ.to_string()];
        let err = service.list(&homeless, &pagination).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
