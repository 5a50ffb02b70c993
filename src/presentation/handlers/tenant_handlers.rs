use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::domain::entities::Tenant;
use crate::domain::services::rbac::capabilities;
use crate::domain::services::tenant_service::{NewTenant, TenantUpdate};
use crate::presentation::middleware::AuthenticatedUser;
use crate::shared::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct ListTenantsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 3, max = 48, message = "Slug must be 3-48 characters"))]
    pub slug: String,
    pub invoice_prefix: Option<String>,
    #[validate(range(max = 10000, message = "Tax rate must be at most 10000 bps"))]
    pub default_tax_rate_bps: Option<u32>,
    #[validate(range(max = 365, message = "Payment terms must be at most 365 days"))]
    pub payment_terms_days: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTenantRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    pub invoice_prefix: Option<String>,
    #[validate(range(max = 10000, message = "Tax rate must be at most 10000 bps"))]
    pub default_tax_rate_bps: Option<u32>,
    #[validate(range(max = 365, message = "Payment terms must be at most 365 days"))]
    pub payment_terms_days: Option<u32>,
}

pub async fn list_tenants(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListTenantsQuery>,
) -> Result<Json<Vec<Tenant>>> {
    user.require(capabilities::TENANTS_READ)?;

    let mut tenants = app_state.tenant_service.list(query.include_inactive).await?;
    // Without tenants:switch the caller only ever sees its own tenant.
    if !user.capabilities().allows(capabilities::TENANTS_SWITCH) {
        let home = user.claims().tenant_id.clone();
        tenants.retain(|t| Some(&t.id) == home.as_ref());
    }
    Ok(Json(tenants))
}

pub async fn get_tenant(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Tenant>> {
    user.require(capabilities::TENANTS_READ)?;
    if user.claims().tenant_id.as_deref() != Some(id.as_str()) {
        user.require(capabilities::TENANTS_SWITCH)?;
    }
    Ok(Json(app_state.tenant_service.get(&id).await?))
}

pub async fn create_tenant(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonExtractor(request): JsonExtractor<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Tenant>)> {
    user.require(capabilities::TENANTS_WRITE)?;
    request.validate()?;

    let tenant = app_state
        .tenant_service
        .create(
            &user.actor(),
            NewTenant {
                name: request.name,
                slug: request.slug,
                invoice_prefix: request.invoice_prefix,
                default_tax_rate_bps: request.default_tax_rate_bps,
                payment_terms_days: request.payment_terms_days,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn update_tenant(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateTenantRequest>,
) -> Result<Json<Tenant>> {
    user.require(capabilities::TENANTS_WRITE)?;
    request.validate()?;

    let tenant = app_state
        .tenant_service
        .update(
            &user.actor(),
            &id,
            TenantUpdate {
                name: request.name,
                invoice_prefix: request.invoice_prefix,
                default_tax_rate_bps: request.default_tax_rate_bps,
                payment_terms_days: request.payment_terms_days,
            },
        )
        .await?;
    Ok(Json(tenant))
}

pub async fn deactivate_tenant(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Tenant>> {
    user.require(capabilities::TENANTS_WRITE)?;
    Ok(Json(app_state.tenant_service.deactivate(&user.actor(), &id).await?))
}
