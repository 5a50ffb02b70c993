use chrono::Utc;
use tracing::{info, warn};

use crate::domain::entities::{Tenant, User};
use crate::domain::services::audit::Actor;
use crate::domain::services::rbac::SUPER_ADMIN;
use crate::domain::services::seed::{demo_users, tenant_fixtures, SeedRng};
use crate::domain::services::tenancy::TenantSelector;
use crate::domain::services::tenant_service::NewTenant;
use crate::domain::services::user_service::NewUser;
use crate::shared::types::Email;
use crate::shared::{AppState, Result, TimeChatError};

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub seed: u64,
    /// Tenant slugs to create and populate
    pub tenants: Vec<String>,
    pub users_per_tenant: usize,
    pub weeks_of_entries: u32,
    pub admin_email: String,
    /// Also used for every demo user
    pub password: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub roles_created: usize,
    pub users_created: usize,
    pub tenants_created: usize,
    pub tenants_populated: usize,
    pub clients: usize,
    pub projects: usize,
    pub time_entries: usize,
}

fn display_name(slug: &str) -> String {
    slug.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes deterministic demo data; records that already exist are skipped
pub struct Seeder<'a> {
    state: &'a AppState,
    options: SeedOptions,
    summary: SeedSummary,
}

impl<'a> Seeder<'a> {
    pub fn new(state: &'a AppState, options: SeedOptions) -> Self {
        Self {
            state,
            options,
            summary: SeedSummary::default(),
        }
    }

    pub async fn run(mut self) -> Result<SeedSummary> {
        info!(seed = self.options.seed, tenants = ?self.options.tenants, "Seeding started");

        self.summary.roles_created = self.state.role_service.ensure_system_roles().await?;

        let admin_email = self.options.admin_email.clone();
        self.ensure_user(&admin_email, "Platform", "Admin", None, SUPER_ADMIN)
            .await?;

        let tenants = self.options.tenants.clone();
        for (index, slug) in tenants.iter().enumerate() {
            let Some(tenant) = self.ensure_tenant(slug).await? else {
                continue;
            };
            let mut rng = SeedRng::new(self.options.seed.wrapping_add(index as u64));
            self.populate_tenant(&tenant, &mut rng).await?;
        }

        info!(summary = ?self.summary, "Seeding finished");
        Ok(self.summary)
    }

    async fn ensure_user(
        &mut self,
        email: &str,
        first_name: &str,
        last_name: &str,
        tenant_id: Option<String>,
        role: &str,
    ) -> Result<User> {
        if let Some(existing) = self.state.user_repository.find_by_email(&Email::new(email)?).await? {
            return Ok(existing);
        }

        let user = self
            .state
            .user_service
            .create_user(
                &Actor::system(),
                NewUser {
                    email: email.to_string(),
                    password: self.options.password.clone(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    phone: None,
                    tenant_id,
                    role_names: vec![role.to_string()],
                },
            )
            .await?;
        self.summary.users_created += 1;
        Ok(user)
    }

    /// Looks the tenant up by slug, creating it when missing; inactive tenants are left alone
    async fn ensure_tenant(&mut self, slug: &str) -> Result<Option<Tenant>> {
        let resolver = self.state.tenant_router.resolver();
        match resolver.resolve(&TenantSelector::Slug(slug.to_string())).await {
            Ok(tenant) => Ok(Some(tenant)),
            Err(TimeChatError::NotFound { .. }) => {
                let tenant = self
                    .state
                    .tenant_service
                    .create(
                        &Actor::system(),
                        NewTenant {
                            name: display_name(slug),
                            slug: slug.to_string(),
                            invoice_prefix: None,
                            default_tax_rate_bps: None,
                            payment_terms_days: None,
                        },
                    )
                    .await?;
                self.summary.tenants_created += 1;
                Ok(Some(tenant))
            }
            Err(TimeChatError::TenantUnavailable { .. }) => {
                warn!(slug, "Skipping inactive tenant");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn populate_tenant(&mut self, tenant: &Tenant, rng: &mut SeedRng) -> Result<()> {
        let mut user_ids = Vec::new();
        for seed_user in demo_users(rng, &tenant.slug, self.options.users_per_tenant) {
            let user = self
                .ensure_user(
                    &seed_user.email,
                    &seed_user.first_name,
                    &seed_user.last_name,
                    Some(tenant.id.clone()),
                    seed_user.role,
                )
                .await?;
            user_ids.push(user.id);
        }

        let handle = self.state.tenant_router.handle_for(tenant.clone());
        let clients = handle.clients();
        if !clients.list(true).await?.is_empty() {
            info!(tenant = %tenant.slug, "Tenant already has data, skipping fixtures");
            return Ok(());
        }

        let fixtures = tenant_fixtures(
            rng,
            &user_ids,
            self.options.weeks_of_entries,
            Utc::now().date_naive(),
        );

        for client in &fixtures.clients {
            clients.create(client).await?;
        }
        let projects = handle.projects();
        for project in &fixtures.projects {
            projects.create(project).await?;
        }
        let entries = handle.time_entries();
        for entry in &fixtures.entries {
            entries.create(entry).await?;
        }

        info!(
            tenant = %tenant.slug,
            clients = fixtures.clients.len(),
            projects = fixtures.projects.len(),
            entries = fixtures.entries.len(),
            "Tenant fixtures written"
        );
        self.summary.tenants_populated += 1;
        self.summary.clients += fixtures.clients.len();
        self.summary.projects += fixtures.projects.len();
        self.summary.time_entries += fixtures.entries.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_names_come_from_slugs() {
        assert_eq!(display_name("acme"), "Acme");
        assert_eq!(display_name("blue-harbor-labs"), "Blue Harbor Labs");
    }
}
