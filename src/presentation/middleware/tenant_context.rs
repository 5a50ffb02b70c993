use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use super::auth_middleware::AuthenticatedUser;
use crate::domain::entities::Tenant;
use crate::domain::services::audit::Actor;
use crate::domain::services::tenancy::select_tenant;
use crate::infrastructure::database::TenantHandle;
use crate::shared::{AppState, Result, TimeChatError};

/// The authenticated caller plus the tenant database chosen for this request
pub struct TenantContext {
    pub user: AuthenticatedUser,
    pub handle: TenantHandle,
}

impl TenantContext {
    pub fn tenant(&self) -> &Tenant {
        &self.handle.tenant
    }

    /// Audit actor attributed to the routed tenant, not the caller's home tenant
    pub fn actor(&self) -> Actor {
        Actor {
            tenant_id: Some(self.handle.tenant.id.clone()),
            ..self.user.actor()
        }
    }
}

/// Raw tenant override header, if the caller sent one
fn tenant_header<'a>(parts: &'a Parts, header_name: &str) -> Result<Option<&'a str>> {
    match parts.headers.get(header_name) {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| TimeChatError::validation("tenant", "Tenant header must be ASCII"))?
                .trim();
            Ok(Some(value).filter(|v| !v.is_empty()))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for TenantContext {
    type Rejection = TimeChatError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        let header = tenant_header(parts, &state.config.tenancy.header_name)?;
        let request = select_tenant(user.claims(), header)?;
        let handle = state.tenant_router.route(&request).await?;

        Ok(TenantContext { user, handle })
    }
}
