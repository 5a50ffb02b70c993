use async_trait::async_trait;
use mongodb::Database;
use std::sync::Arc;
use tracing::{debug, info};

use super::connection::{create_tenant_indexes, MongoDatabase};
use super::{
    MongoBillRepository, MongoChatRepository, MongoClientRepository, MongoInvoiceRepository,
    MongoProjectRepository, MongoTimeEntryRepository,
};
use crate::domain::entities::Tenant;
use crate::domain::repositories::{
    BillRepository, ChatRepository, ClientRepository, InvoiceRepository, ProjectRepository,
    TimeEntryRepository,
};
use crate::domain::services::audit::AuditLog;
use crate::domain::services::catalog::CatalogService;
use crate::domain::services::chat::ChatService;
use crate::domain::services::invoicing::InvoiceService;
use crate::domain::services::payables::BillService;
use crate::domain::services::reporting::ReportService;
use crate::domain::services::tenancy::{TenantRequest, TenantResolver};
use crate::domain::services::tenant_service::TenantProvisioner;
use crate::domain::services::timesheet::TimesheetService;
use crate::shared::Result;

/// A resolved tenant and its database, valid for one request
#[derive(Clone)]
pub struct TenantHandle {
    pub tenant: Tenant,
    pub database: Arc<Database>,
}

impl TenantHandle {
    pub fn clients(&self) -> Arc<dyn ClientRepository> {
        Arc::new(MongoClientRepository::new(self.database.clone()))
    }

    pub fn projects(&self) -> Arc<dyn ProjectRepository> {
        Arc::new(MongoProjectRepository::new(self.database.clone()))
    }

    pub fn time_entries(&self) -> Arc<dyn TimeEntryRepository> {
        Arc::new(MongoTimeEntryRepository::new(self.database.clone()))
    }

    pub fn invoices(&self) -> Arc<dyn InvoiceRepository> {
        Arc::new(MongoInvoiceRepository::new(self.database.clone()))
    }

    pub fn bills(&self) -> Arc<dyn BillRepository> {
        Arc::new(MongoBillRepository::new(self.database.clone()))
    }

    pub fn chats(&self) -> Arc<dyn ChatRepository> {
        Arc::new(MongoChatRepository::new(self.database.clone()))
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.clients(), self.projects())
    }

    pub fn timesheet(&self) -> TimesheetService {
        TimesheetService::new(self.time_entries(), self.catalog())
    }

    pub fn invoicing(&self, audit: AuditLog) -> InvoiceService {
        InvoiceService::new(
            self.invoices(),
            self.time_entries(),
            self.clients(),
            self.projects(),
            audit,
        )
    }

    pub fn payables(&self) -> BillService {
        BillService::new(self.bills())
    }

    pub fn reports(&self) -> ReportService {
        ReportService::new(self.time_entries(), self.projects(), self.clients())
    }

    pub fn chat(&self) -> ChatService {
        ChatService::new(self.chats())
    }
}

/// Maps requests to tenant databases on the shared MongoDB client
#[derive(Clone)]
pub struct TenantDatabaseRouter {
    resolver: Arc<TenantResolver>,
    mongo: MongoDatabase,
}

impl TenantDatabaseRouter {
    pub fn new(resolver: Arc<TenantResolver>, mongo: MongoDatabase) -> Self {
        Self { resolver, mongo }
    }

    pub fn resolver(&self) -> &Arc<TenantResolver> {
        &self.resolver
    }

    pub async fn route(&self, request: &TenantRequest) -> Result<TenantHandle> {
        let tenant = self.resolver.resolve_request(request).await?;
        debug!(tenant_id = %tenant.id, database = %tenant.database_name, "Routing to tenant database");
        Ok(self.handle_for(tenant))
    }

    /// Handle for an already loaded tenant, bypassing availability checks
    pub fn handle_for(&self, tenant: Tenant) -> TenantHandle {
        let database = self.mongo.tenant_database(&tenant.database_name);
        TenantHandle { tenant, database }
    }
}

#[async_trait]
impl TenantProvisioner for TenantDatabaseRouter {
    async fn provision(&self, tenant: &Tenant) -> Result<()> {
        let database = self.mongo.tenant_database(&tenant.database_name);
        create_tenant_indexes(&database).await?;
        info!(tenant_id = %tenant.id, database = %tenant.database_name, "Tenant database provisioned");
        Ok(())
    }
}
