use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::domain::entities::{Role, User};
use crate::domain::repositories::{RoleRepository, UserFilter, UserRepository};
use crate::domain::services::audit::{Actor, AuditLog};
use crate::domain::services::rbac::{capabilities, CapabilitySet, SUPER_ADMIN, USER};
use crate::domain::services::TokenClaims;
use crate::shared::types::{Email, Page, Pagination, PhoneNumber};
use crate::shared::utils::{check_password_strength, hash_password};
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub tenant_id: Option<String>,
    /// Defaults to the `user` role when empty
    pub role_names: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

/// Main-database user management
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    audit: AuditLog,
}

/// Callers without `tenants:switch` only see users of their own tenant
pub fn check_tenant_access(claims: &TokenClaims, user: &User) -> Result<()> {
    let caps = claims.capability_set();
    if caps.allows(capabilities::TENANTS_SWITCH) || user.tenant_id == claims.tenant_id {
        Ok(())
    } else {
        Err(TimeChatError::not_found(format!("User with ID: {}", user.id)))
    }
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, roles: Arc<dyn RoleRepository>, audit: AuditLog) -> Self {
        Self { users, roles, audit }
    }

    pub async fn create_user(&self, actor: &Actor, new_user: NewUser) -> Result<User> {
        let email = Email::new(&new_user.email)?;
        check_password_strength(&new_user.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(TimeChatError::conflict(
                "user",
                format!("A user with email {} already exists", email.as_str()),
            ));
        }

        let role_names = if new_user.role_names.is_empty() {
            vec![USER.to_string()]
        } else {
            new_user.role_names.clone()
        };
        let roles = self.roles_by_name(&role_names).await?;

        let mut user = User::new(
            email,
            hash_password(&new_user.password)?,
            new_user.first_name.trim().to_string(),
            new_user.last_name.trim().to_string(),
            new_user.tenant_id.clone(),
        );
        if let Some(phone) = new_user.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            user.phone = Some(PhoneNumber::new(phone)?);
        }

        self.users.create(&user).await?;
        let role_ids: Vec<String> = roles.iter().map(|r| r.id.clone()).collect();
        self.roles.set_user_roles(&user.id, &role_ids).await?;

        info!(user_id = %user.id, tenant_id = ?user.tenant_id, "User created");
        self.audit
            .record(
                actor
                    .entry("user.created", "user")
                    .resource(&user.id)
                    .metadata(json!({ "email": user.email.as_str(), "roles": role_names })),
            )
            .await;

        Ok(user)
    }

    pub async fn get_user(&self, claims: &TokenClaims, id: &str) -> Result<User> {
        let user = self
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("User with ID: {}", id)))?;
        check_tenant_access(claims, &user)?;
        Ok(user)
    }

    pub async fn list_users(
        &self,
        claims: &TokenClaims,
        include_inactive: bool,
        search: Option<String>,
        pagination: &Pagination,
    ) -> Result<Page<User>> {
        let tenant_id = if claims.capability_set().allows(capabilities::TENANTS_SWITCH) {
            None
        } else {
            Some(claims.tenant_id.clone().ok_or_else(|| {
                TimeChatError::forbidden("Listing users requires a tenant")
            })?)
        };

        let filter = UserFilter {
            tenant_id,
            include_inactive,
            search,
        };
        let (items, total) = self.users.list(&filter, pagination).await?;

        Ok(Page {
            items,
            page: pagination.page(),
            limit: pagination.limit(),
            total,
        })
    }

    pub async fn update_user(&self, claims: &TokenClaims, id: &str, update: UserUpdate) -> Result<User> {
        let mut user = self.get_user(claims, id).await?;

        if let Some(first_name) = update.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(phone) = update.phone {
            user.phone = if phone.trim().is_empty() {
                None
            } else {
                Some(PhoneNumber::new(&phone)?)
            };
        }
        if let Some(is_active) = update.is_active {
            if user.deleted_at.is_some() && is_active {
                return Err(TimeChatError::conflict("user", "Deleted users cannot be reactivated"));
            }
            user.is_active = is_active;
        }
        user.touch();

        self.users.update(&user).await?;
        self.audit
            .record(Actor::from(claims).entry("user.updated", "user").resource(&user.id))
            .await;

        Ok(user)
    }

    pub async fn deactivate_user(&self, claims: &TokenClaims, id: &str) -> Result<User> {
        if claims.sub == id {
            return Err(TimeChatError::validation("id", "You cannot deactivate yourself"));
        }

        let mut user = self.get_user(claims, id).await?;
        if user.deleted_at.is_some() {
            return Ok(user);
        }
        user.deactivate();

        self.users.update(&user).await?;
        info!(user_id = %user.id, "User deactivated");
        self.audit
            .record(Actor::from(claims).entry("user.deactivated", "user").resource(&user.id))
            .await;

        Ok(user)
    }

    /// Loads the named roles, failing unless the caller may hand every one of them out.
    /// Only super admins assign `super_admin`; others only grant capabilities they hold.
    pub async fn assignable_roles(&self, claims: &TokenClaims, role_names: &[String]) -> Result<Vec<Role>> {
        if claims.is_super_admin() {
            return self.roles_by_name(role_names).await;
        }
        if role_names.iter().any(|name| name == SUPER_ADMIN) {
            return Err(TimeChatError::forbidden("Only super admins can assign super_admin"));
        }

        let roles = self.roles_by_name(role_names).await?;
        let granted = CapabilitySet::from_roles(&roles).into_vec();
        claims.capability_set().ensure_grantable(&granted)?;
        Ok(roles)
    }

    /// Replaces the user's roles
    pub async fn assign_roles(&self, claims: &TokenClaims, id: &str, role_names: &[String]) -> Result<Vec<Role>> {
        let user = self.get_user(claims, id).await?;
        let roles = self.assignable_roles(claims, role_names).await?;
        let role_ids: Vec<String> = roles.iter().map(|r| r.id.clone()).collect();
        self.roles.set_user_roles(&user.id, &role_ids).await?;

        self.audit
            .record(
                Actor::from(claims)
                    .entry("user.roles_assigned", "user")
                    .resource(&user.id)
                    .metadata(json!({ "roles": role_names })),
            )
            .await;

        Ok(roles)
    }

    pub async fn capabilities_for(&self, user_id: &str) -> Result<(Vec<Role>, CapabilitySet)> {
        let roles = self.roles.roles_for_user(user_id).await?;
        let capabilities = CapabilitySet::from_roles(&roles);
        Ok((roles, capabilities))
    }

    async fn roles_by_name(&self, names: &[String]) -> Result<Vec<Role>> {
        let mut roles = Vec::with_capacity(names.len());
        for name in names {
            let role = self
                .roles
                .find_by_name(name)
                .await?
                .ok_or_else(|| TimeChatError::not_found(format!("Role: {}", name)))?;
            roles.push(role);
        }
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{MockAuditRepository, MockRoleRepository, MockUserRepository};
    use crate::domain::services::TokenUse;
    use tokio_test::assert_err;

    fn claims(tenant: Option<&str>, roles: &[&str], caps: &[&str]) -> TokenClaims {
        TokenClaims {
            sub: "admin-1".into(),
            email: "admin@example.com".into(),
            tenant_id: tenant.map(str::to_string),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            impersonator_id: None,
            impersonation_session_id: None,
            token_use: TokenUse::Access,
            iat: 0,
            exp: 0,
        }
    }

    fn audit_ok() -> AuditLog {
        let mut audit = MockAuditRepository::new();
        audit.expect_record().returning(|_| Ok(()));
        AuditLog::new(Arc::new(audit))
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password: "hunter2hunter2".into(),
            first_name: "Sam".into(),
            last_name: "Reyes".into(),
            phone: None,
            tenant_id: Some("t1".into()),
            role_names: vec![],
        }
    }

    fn existing_user(tenant: Option<&str>) -> User {
        User::new(
            Email::new("taken@example.com").unwrap(),
            "hash".into(),
            "Taken".into(),
            "User".into(),
            tenant.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .returning(|_| Ok(Some(existing_user(Some("t1")))));
        users.expect_create().never();

        let service = UserService::new(Arc::new(users), Arc::new(MockRoleRepository::new()), audit_ok());
        let err = service
            .create_user(&Actor::system(), new_user("TAKEN@example.com"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn new_users_get_default_role() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| Ok(None));
        users.expect_create().times(1).returning(|_| Ok(()));

        let default_role = Role::system(USER, "user", vec![]);
        let default_role_id = default_role.id.clone();
        let mut roles = MockRoleRepository::new();
        roles
            .expect_find_by_name()
            .withf(|name| name == USER)
            .returning(move |_| Ok(Some(default_role.clone())));
        roles
            .expect_set_user_roles()
            .withf(move |_, ids| ids == [default_role_id.clone()])
            .times(1)
            .returning(|_, _| Ok(()));

        let service = UserService::new(Arc::new(users), Arc::new(roles), audit_ok());
        let user = service
            .create_user(&Actor::system(), new_user("new@example.com"))
            .await
            .unwrap();

        assert_eq!(user.email.as_str(), "new@example.com");
        assert_ne!(user.password_hash, "hunter2hunter2");
    }

    #[tokio::test]
    async fn weak_password_is_rejected_before_lookup() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().never();
        let service = UserService::new(Arc::new(users), Arc::new(MockRoleRepository::new()), audit_ok());

        let mut request = new_user("weak@example.com");
        request.password = "short".into();
        assert_err!(service.create_user(&Actor::system(), request).await);
    }

    #[tokio::test]
    async fn deactivation_soft_deletes_and_hides_other_tenants() {
        let target = existing_user(Some("t1"));
        let target_id = target.id.clone();
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));
        users
            .expect_update()
            .withf(|u| !u.is_active && u.deleted_at.is_some())
            .times(1)
            .returning(|_| Ok(()));

        let service = UserService::new(Arc::new(users), Arc::new(MockRoleRepository::new()), audit_ok());

        let foreign = claims(Some("t2"), &[], &[capabilities::USERS_DELETE]);
        let err = service.deactivate_user(&foreign, &target_id).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);

        let local = claims(Some("t1"), &[], &[capabilities::USERS_DELETE]);
        let user = service.deactivate_user(&local, &target_id).await.unwrap();
        assert!(!user.can_sign_in());
    }

    #[tokio::test]
    async fn only_super_admins_grant_super_admin() {
        let target = existing_user(Some("t1"));
        let target_id = target.id.clone();
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));

        let service = UserService::new(Arc::new(users), Arc::new(MockRoleRepository::new()), audit_ok());
        let tenant_admin = claims(Some("t1"), &["tenant_admin"], &[capabilities::ROLES_WRITE]);

        let err = service
            .assign_roles(&tenant_admin, &target_id, &[SUPER_ADMIN.to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn roles_with_unheld_capabilities_cannot_be_assigned() {
        let target = existing_user(Some("t1"));
        let target_id = target.id.clone();
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));

        let mut roles = MockRoleRepository::new();
        roles.expect_find_by_name().returning(|name| {
            Ok(Some(Role::new(
                name.to_string(),
                None,
                vec![capabilities::TENANTS_SWITCH.to_string()],
            )))
        });
        roles.expect_set_user_roles().never();

        let service = UserService::new(Arc::new(users), Arc::new(roles), audit_ok());
        let tenant_admin = claims(Some("t1"), &["tenant_admin"], &[capabilities::ROLES_WRITE]);

        let err = service
            .assign_roles(&tenant_admin, &target_id, &["roaming".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
