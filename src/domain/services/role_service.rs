use std::sync::Arc;

use serde_json::json;

use crate::domain::entities::Role;
use crate::domain::repositories::RoleRepository;
use crate::domain::services::audit::{Actor, AuditLog};
use crate::domain::services::rbac::{system_roles, validate_capabilities};
use crate::domain::services::TokenClaims;
use crate::shared::{Result, TimeChatError};

fn validate_role_name(name: &str) -> Result<String> {
    let name = name.trim().to_lowercase();
    let valid = (2..=64).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(TimeChatError::validation(
            "name",
            "Role name must be 2-64 lowercase letters, digits or underscores",
        ));
    }
    Ok(name)
}

/// Roles are shared by every tenant, so only super admins touch system roles
/// and nobody else may edit a role granting more than they hold
fn check_role_editable(claims: &TokenClaims, role: &Role) -> Result<()> {
    if claims.is_super_admin() {
        return Ok(());
    }
    if role.is_system {
        return Err(TimeChatError::forbidden("Only super admins can modify system roles"));
    }
    claims.capability_set().ensure_grantable(&role.capabilities)
}

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleRepository>,
    audit: AuditLog,
}

impl RoleService {
    pub fn new(roles: Arc<dyn RoleRepository>, audit: AuditLog) -> Self {
        Self { roles, audit }
    }

    pub async fn list(&self) -> Result<Vec<Role>> {
        self.roles.list().await
    }

    pub async fn get(&self, id: &str) -> Result<Role> {
        self.roles
            .find_by_id(id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("Role with ID: {}", id)))
    }

    pub async fn create(
        &self,
        claims: &TokenClaims,
        name: &str,
        description: Option<String>,
        capabilities: &[String],
    ) -> Result<Role> {
        let name = validate_role_name(name)?;
        let capabilities = validate_capabilities(capabilities)?;
        if !claims.is_super_admin() {
            claims.capability_set().ensure_grantable(&capabilities)?;
        }
        if self.roles.find_by_name(&name).await?.is_some() {
            return Err(TimeChatError::conflict("role", format!("Role {} already exists", name)));
        }

        let role = Role::new(name, description, capabilities);
        self.roles.create(&role).await?;
        self.audit
            .record(
                Actor::from(claims)
                    .entry("role.created", "role")
                    .resource(&role.id)
                    .metadata(json!({ "name": role.name })),
            )
            .await;
        Ok(role)
    }

    /// System roles keep their name; super admins may still tune their capabilities
    pub async fn update(
        &self,
        claims: &TokenClaims,
        id: &str,
        name: Option<&str>,
        description: Option<String>,
        capabilities: Option<&[String]>,
    ) -> Result<Role> {
        let mut role = self.get(id).await?;
        check_role_editable(claims, &role)?;

        if let Some(name) = name {
            let name = validate_role_name(name)?;
            if name != role.name {
                if role.is_system {
                    return Err(TimeChatError::conflict("role", "System roles cannot be renamed"));
                }
                if self.roles.find_by_name(&name).await?.is_some() {
                    return Err(TimeChatError::conflict("role", format!("Role {} already exists", name)));
                }
                role.name = name;
            }
        }
        if let Some(description) = description {
            role.description = Some(description);
        }
        if let Some(capabilities) = capabilities {
            let capabilities = validate_capabilities(capabilities)?;
            if !claims.is_super_admin() {
                claims.capability_set().ensure_grantable(&capabilities)?;
            }
            role.capabilities = capabilities;
        }
        role.updated_at = crate::shared::utils::now();

        self.roles.update(&role).await?;
        self.audit
            .record(Actor::from(claims).entry("role.updated", "role").resource(&role.id))
            .await;
        Ok(role)
    }

    pub async fn delete(&self, claims: &TokenClaims, id: &str) -> Result<()> {
        let role = self.get(id).await?;
        if role.is_system {
            return Err(TimeChatError::conflict("role", "System roles cannot be deleted"));
        }
        check_role_editable(claims, &role)?;
        self.roles.delete(&role.id).await?;
        self.audit
            .record(
                Actor::from(claims)
                    .entry("role.deleted", "role")
                    .resource(&role.id)
                    .metadata(json!({ "name": role.name })),
            )
            .await;
        Ok(())
    }

    /// Creates missing system roles; returns how many were inserted
    pub async fn ensure_system_roles(&self) -> Result<usize> {
        let mut created = 0;
        for role in system_roles() {
            if self.roles.find_by_name(&role.name).await?.is_none() {
                self.roles.create(&role).await?;
                created += 1;
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{MockAuditRepository, MockRoleRepository};
    use crate::domain::services::rbac::{capabilities, SUPER_ADMIN, TENANT_ADMIN};
    use crate::domain::services::TokenUse;

    fn claims(roles: &[&str], caps: &[&str]) -> TokenClaims {
        TokenClaims {
            sub: "caller".into(),
            email: "caller@example.com".into(),
            tenant_id: Some("t1".into()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            impersonator_id: None,
            impersonation_session_id: None,
            token_use: TokenUse::Access,
            iat: 0,
            exp: i64::MAX,
        }
    }

    fn super_admin() -> TokenClaims {
        claims(&[SUPER_ADMIN], capabilities::ALL)
    }

    fn tenant_admin() -> TokenClaims {
        claims(
            &[TENANT_ADMIN],
            &[capabilities::ROLES_WRITE, capabilities::USERS_READ, capabilities::AUDIT_READ],
        )
    }

    fn audit_ok() -> AuditLog {
        let mut audit = MockAuditRepository::new();
        audit.expect_record().returning(|_| Ok(()));
        AuditLog::new(Arc::new(audit))
    }

    #[tokio::test]
    async fn unknown_capability_is_rejected() {
        let mut roles = MockRoleRepository::new();
        roles.expect_create().never();
        let service = RoleService::new(Arc::new(roles), audit_ok());

        let err = service
            .create(&super_admin(), "auditor", None, &["audit:destroy".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn system_roles_cannot_be_deleted() {
        let system = Role::system("user", "Tracks time", vec![]);
        let mut roles = MockRoleRepository::new();
        roles
            .expect_find_by_id()
            .returning(move |_| Ok(Some(system.clone())));
        roles.expect_delete().never();

        let service = RoleService::new(Arc::new(roles), audit_ok());
        let err = service.delete(&super_admin(), "r1").await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_dedups_capabilities() {
        let mut roles = MockRoleRepository::new();
        roles.expect_find_by_name().returning(|_| Ok(None));
        roles
            .expect_create()
            .withf(|r| r.capabilities.len() == 1 && !r.is_system)
            .times(1)
            .returning(|_| Ok(()));
        let service = RoleService::new(Arc::new(roles), audit_ok());

        let caps = vec![capabilities::AUDIT_READ.to_string(), capabilities::AUDIT_READ.to_string()];
        let role = service
            .create(&super_admin(), "Auditor", None, &caps)
            .await
            .unwrap();
        assert_eq!(role.name, "auditor");
    }

    #[tokio::test]
    async fn ensure_system_roles_skips_existing() {
        let mut roles = MockRoleRepository::new();
        roles.expect_find_by_name().returning(|name| {
            Ok((name == "super_admin").then(|| Role::system("super_admin", "", vec![])))
        });
        roles.expect_create().times(3).returning(|_| Ok(()));

        let service = RoleService::new(Arc::new(roles), audit_ok());
        assert_eq!(service.ensure_system_roles().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn tenant_admin_cannot_grant_capabilities_it_lacks() {
        let mut roles = MockRoleRepository::new();
        roles.expect_find_by_name().returning(|_| Ok(None));
        roles.expect_create().never();
        let service = RoleService::new(Arc::new(roles), audit_ok());

        let err = service
            .create(
                &tenant_admin(),
                "roaming",
                None,
                &[capabilities::TENANTS_SWITCH.to_string()],
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn tenant_admin_creates_roles_within_its_capabilities() {
        let mut roles = MockRoleRepository::new();
        roles.expect_find_by_name().returning(|_| Ok(None));
        roles.expect_create().times(1).returning(|_| Ok(()));
        let service = RoleService::new(Arc::new(roles), audit_ok());

        let role = service
            .create(&tenant_admin(), "auditor", None, &[capabilities::AUDIT_READ.to_string()])
            .await
            .unwrap();
        assert_eq!(role.capabilities, vec![capabilities::AUDIT_READ.to_string()]);
    }

    #[tokio::test]
    async fn only_super_admins_edit_system_roles() {
        let system = Role::system(
            TENANT_ADMIN,
            "Administers one tenant",
            vec![capabilities::ROLES_WRITE.to_string()],
        );
        let mut roles = MockRoleRepository::new();
        roles
            .expect_find_by_id()
            .returning(move |_| Ok(Some(system.clone())));
        roles.expect_update().times(1).returning(|_| Ok(()));
        let service = RoleService::new(Arc::new(roles), audit_ok());

        let escalate = vec![
            capabilities::TENANTS_SWITCH.to_string(),
            capabilities::TENANTS_WRITE.to_string(),
        ];
        let err = service
            .update(&tenant_admin(), "r1", None, None, Some(&escalate))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);

        let role = service
            .update(&super_admin(), "r1", None, None, Some(&escalate))
            .await
            .unwrap();
        assert_eq!(role.capabilities, escalate);
    }

    #[tokio::test]
    async fn custom_role_update_cannot_add_unheld_capability() {
        let custom = Role::new(
            "auditor".to_string(),
            None,
            vec![capabilities::AUDIT_READ.to_string()],
        );
        let mut roles = MockRoleRepository::new();
        roles
            .expect_find_by_id()
            .returning(move |_| Ok(Some(custom.clone())));
        roles.expect_update().never();
        let service = RoleService::new(Arc::new(roles), audit_ok());

        let caps = vec![
            capabilities::AUDIT_READ.to_string(),
            capabilities::TENANTS_SWITCH.to_string(),
        ];
        let err = service
            .update(&tenant_admin(), "r2", None, None, Some(&caps))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn roles_beyond_the_caller_cannot_be_deleted() {
        let powerful = Role::new(
            "roaming".to_string(),
            None,
            vec![capabilities::TENANTS_SWITCH.to_string()],
        );
        let mut roles = MockRoleRepository::new();
        roles
            .expect_find_by_id()
            .returning(move |_| Ok(Some(powerful.clone())));
        roles.expect_delete().never();
        let service = RoleService::new(Arc::new(roles), audit_ok());

        let err = service.delete(&tenant_admin(), "r3").await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
