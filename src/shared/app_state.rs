use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::domain::repositories::{RoleRepository, TenantRepository, UserRepository};
use crate::domain::services::audit::AuditLog;
use crate::domain::services::impersonation::ImpersonationService;
use crate::domain::services::role_service::RoleService;
use crate::domain::services::tenancy::TenantResolver;
use crate::domain::services::tenant_service::{InvoiceDefaults, TenantService};
use crate::domain::services::user_service::UserService;
use crate::domain::services::AuthService;
use crate::infrastructure::auth_service_impl::AuthServiceImpl;
use crate::infrastructure::database::{
    MongoAuditRepository, MongoDatabase, MongoImpersonationRepository, MongoRoleRepository,
    MongoTenantRepository, MongoUserRepository, RedisConnection, TenantDatabaseRouter,
};
use crate::shared::Result;

// Application state for dependency injection
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub database: MongoDatabase,
    pub redis: RedisConnection,
    pub tenant_router: TenantDatabaseRouter,
    pub auth_service: Arc<dyn AuthService>,
    pub user_repository: Arc<dyn UserRepository>,
    pub user_service: UserService,
    pub role_service: RoleService,
    pub tenant_service: TenantService,
    pub impersonation_service: ImpersonationService,
    pub audit: AuditLog,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub async fn new(config: AppConfig, metrics: Option<PrometheusHandle>) -> Result<Self> {
        // Initialize database connections
        let database = MongoDatabase::new(&config.database).await?;
        let redis = RedisConnection::new(&config.redis).await?;

        database.create_indexes().await?;

        // Main database repositories
        let main_db = database.database();
        let user_repository: Arc<dyn UserRepository> =
            Arc::new(MongoUserRepository::new(main_db.clone()));
        let role_repository: Arc<dyn RoleRepository> =
            Arc::new(MongoRoleRepository::new(main_db.clone()));
        let tenant_repository: Arc<dyn TenantRepository> =
            Arc::new(MongoTenantRepository::new(main_db.clone()));
        let audit = AuditLog::new(Arc::new(MongoAuditRepository::new(main_db.clone())));

        let resolver = Arc::new(TenantResolver::new(
            tenant_repository.clone(),
            Duration::from_secs(config.tenancy.cache_ttl_seconds),
        ));
        let tenant_router = TenantDatabaseRouter::new(resolver.clone(), database.clone());

        let auth_service: Arc<dyn AuthService> = Arc::new(AuthServiceImpl::new(
            config.auth.clone(),
            Arc::new(redis.clone()),
            user_repository.clone(),
            role_repository.clone(),
        ));

        let user_service = UserService::new(user_repository.clone(), role_repository.clone(), audit.clone());
        let role_service = RoleService::new(role_repository.clone(), audit.clone());
        let tenant_service = TenantService::new(
            tenant_repository,
            resolver,
            Arc::new(tenant_router.clone()),
            audit.clone(),
            config.database.tenant_prefix.clone(),
            InvoiceDefaults {
                prefix: config.invoicing.default_prefix.clone(),
                tax_rate_bps: config.invoicing.default_tax_rate_bps,
                payment_terms_days: config.invoicing.payment_terms_days,
            },
        );
        let impersonation_service = ImpersonationService::new(
            user_repository.clone(),
            role_repository,
            Arc::new(MongoImpersonationRepository::new(main_db)),
            auth_service.clone(),
            audit.clone(),
        );

        Ok(Self {
            config,
            database,
            redis,
            tenant_router,
            auth_service,
            user_repository,
            user_service,
            role_service,
            tenant_service,
            impersonation_service,
            audit,
            metrics,
        })
    }
}
