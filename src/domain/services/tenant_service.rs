use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::domain::entities::Tenant;
use crate::domain::repositories::TenantRepository;
use crate::domain::services::audit::{Actor, AuditLog};
use crate::domain::services::tenancy::{database_name_for, TenantResolver};
use crate::shared::{Result, TimeChatError};

/// Prepares the storage of a newly created tenant
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    async fn provision(&self, tenant: &Tenant) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub slug: String,
    pub invoice_prefix: Option<String>,
    pub default_tax_rate_bps: Option<u32>,
    pub payment_terms_days: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub invoice_prefix: Option<String>,
    pub default_tax_rate_bps: Option<u32>,
    pub payment_terms_days: Option<u32>,
}

/// Defaults applied to tenants created without explicit invoice settings
#[derive(Debug, Clone)]
pub struct InvoiceDefaults {
    pub prefix: String,
    pub tax_rate_bps: u32,
    pub payment_terms_days: u32,
}

fn validate_prefix(prefix: &str) -> Result<String> {
    let prefix = prefix.trim().to_uppercase();
    if prefix.is_empty() || prefix.len() > 10 || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(TimeChatError::validation(
            "invoice_prefix",
            "Must be 1-10 letters or digits",
        ));
    }
    Ok(prefix)
}

fn validate_tax_rate(bps: u32) -> Result<u32> {
    if bps > 10_000 {
        return Err(TimeChatError::validation("default_tax_rate_bps", "Must be at most 10000"));
    }
    Ok(bps)
}

#[derive(Clone)]
pub struct TenantService {
    tenants: Arc<dyn TenantRepository>,
    resolver: Arc<TenantResolver>,
    provisioner: Arc<dyn TenantProvisioner>,
    audit: AuditLog,
    database_prefix: String,
    defaults: InvoiceDefaults,
}

impl TenantService {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        resolver: Arc<TenantResolver>,
        provisioner: Arc<dyn TenantProvisioner>,
        audit: AuditLog,
        database_prefix: String,
        defaults: InvoiceDefaults,
    ) -> Self {
        Self {
            tenants,
            resolver,
            provisioner,
            audit,
            database_prefix,
            defaults,
        }
    }

    pub async fn create(&self, actor: &Actor, input: NewTenant) -> Result<Tenant> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(TimeChatError::validation("name", "Name is required"));
        }
        let slug = input.slug.trim().to_lowercase();
        let database_name = database_name_for(&self.database_prefix, &slug)?;

        if self.tenants.find_by_slug(&slug).await?.is_some() {
            return Err(TimeChatError::conflict("tenant", format!("Slug {} is taken", slug)));
        }

        let tenant = Tenant::new(
            name.to_string(),
            slug,
            database_name,
            validate_prefix(input.invoice_prefix.as_deref().unwrap_or(&self.defaults.prefix))?,
            validate_tax_rate(input.default_tax_rate_bps.unwrap_or(self.defaults.tax_rate_bps))?,
            input.payment_terms_days.unwrap_or(self.defaults.payment_terms_days),
        );
        self.tenants.create(&tenant).await?;
        self.provisioner.provision(&tenant).await?;

        info!(tenant_id = %tenant.id, slug = %tenant.slug, database = %tenant.database_name, "Tenant created");
        self.audit
            .record(
                actor
                    .entry("tenant.created", "tenant")
                    .resource(&tenant.id)
                    .metadata(json!({ "slug": tenant.slug })),
            )
            .await;
        Ok(tenant)
    }

    pub async fn get(&self, id: &str) -> Result<Tenant> {
        self.tenants
            .find_by_id(id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("Tenant with ID: {}", id)))
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Tenant>> {
        self.tenants.list(include_inactive).await
    }

    pub async fn update(&self, actor: &Actor, id: &str, update: TenantUpdate) -> Result<Tenant> {
        let mut tenant = self.get(id).await?;

        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(TimeChatError::validation("name", "Name is required"));
            }
            tenant.name = name.to_string();
        }
        if let Some(prefix) = update.invoice_prefix {
            tenant.invoice_prefix = validate_prefix(&prefix)?;
        }
        if let Some(bps) = update.default_tax_rate_bps {
            tenant.default_tax_rate_bps = validate_tax_rate(bps)?;
        }
        if let Some(days) = update.payment_terms_days {
            tenant.payment_terms_days = days;
        }
        tenant.updated_at = crate::shared::utils::now();

        self.tenants.update(&tenant).await?;
        self.resolver.invalidate(&tenant.id).await;
        self.audit
            .record(actor.entry("tenant.updated", "tenant").resource(&tenant.id))
            .await;
        Ok(tenant)
    }

    pub async fn deactivate(&self, actor: &Actor, id: &str) -> Result<Tenant> {
        let mut tenant = self.get(id).await?;
        if tenant.deleted_at.is_none() {
            tenant.deactivate();
            self.tenants.update(&tenant).await?;
            info!(tenant_id = %tenant.id, "Tenant deactivated");
            self.audit
                .record(actor.entry("tenant.deactivated", "tenant").resource(&tenant.id))
                .await;
        }
        self.resolver.invalidate(&tenant.id).await;
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{MockAuditRepository, MockTenantRepository};
    use crate::domain::services::tenancy::TenantSelector;
    use std::time::Duration;

    fn defaults() -> InvoiceDefaults {
        InvoiceDefaults {
            prefix: "INV".into(),
            tax_rate_bps: 0,
            payment_terms_days: 30,
        }
    }

    fn audit_ok() -> AuditLog {
        let mut audit = MockAuditRepository::new();
        audit.expect_record().returning(|_| Ok(()));
        AuditLog::new(Arc::new(audit))
    }

    fn service(tenants: MockTenantRepository, provisioner: MockTenantProvisioner) -> (TenantService, Arc<TenantResolver>) {
        let tenants: Arc<dyn TenantRepository> = Arc::new(tenants);
        let resolver = Arc::new(TenantResolver::new(tenants.clone(), Duration::from_secs(60)));
        let service = TenantService::new(
            tenants,
            resolver.clone(),
            Arc::new(provisioner),
            audit_ok(),
            "tc_".into(),
            defaults(),
        );
        (service, resolver)
    }

    fn new_tenant(slug: &str) -> NewTenant {
        NewTenant {
            name: "Acme Corp".into(),
            slug: slug.into(),
            invoice_prefix: None,
            default_tax_rate_bps: None,
            payment_terms_days: None,
        }
    }

    #[tokio::test]
    async fn create_derives_database_and_provisions() {
        let mut tenants = MockTenantRepository::new();
        tenants.expect_find_by_slug().returning(|_| Ok(None));
        tenants.expect_create().times(1).returning(|_| Ok(()));
        let mut provisioner = MockTenantProvisioner::new();
        provisioner
            .expect_provision()
            .withf(|t| t.database_name == "tc_acme_corp")
            .times(1)
            .returning(|_| Ok(()));

        let (service, _) = service(tenants, provisioner);
        let tenant = service.create(&Actor::system(), new_tenant("acme-corp")).await.unwrap();
        assert_eq!(tenant.slug, "acme-corp");
        assert_eq!(tenant.invoice_prefix, "INV");
        assert!(tenant.tenant_key.starts_with("tk_"));
    }

    #[tokio::test]
    async fn duplicate_slug_conflicts() {
        let mut tenants = MockTenantRepository::new();
        tenants.expect_find_by_slug().returning(|slug| {
            Ok(Some(Tenant::new("x".into(), slug.into(), "tc_x".into(), "INV".into(), 0, 30)))
        });
        tenants.expect_create().never();
        let mut provisioner = MockTenantProvisioner::new();
        provisioner.expect_provision().never();

        let (service, _) = service(tenants, provisioner);
        let err = service.create(&Actor::system(), new_tenant("acme")).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn deactivation_invalidates_resolver() {
        let tenant = Tenant::new("Acme".into(), "acme".into(), "tc_acme".into(), "INV".into(), 0, 30);
        let id = tenant.id.clone();

        let current = Arc::new(std::sync::Mutex::new(tenant));
        let mut tenants = MockTenantRepository::new();
        let read = current.clone();
        tenants
            .expect_find_by_id()
            .returning(move |_| Ok(Some(read.lock().unwrap().clone())));
        let write = current.clone();
        tenants.expect_update().returning(move |t| {
            *write.lock().unwrap() = t.clone();
            Ok(())
        });

        let (service, resolver) = service(tenants, MockTenantProvisioner::new());
        resolver.resolve(&TenantSelector::Id(id.clone())).await.unwrap();

        service.deactivate(&Actor::system(), &id).await.unwrap();
        let err = resolver.resolve(&TenantSelector::Id(id)).await.unwrap_err();
        assert_eq!(err.error_code(), "TENANT_INACTIVE");
    }
}
