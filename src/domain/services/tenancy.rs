//! Tenant database routing.
//!
//! Every tenant owns a database named after its slug. A request is routed by
//! the tenant in the caller's token, optionally overridden by a tenant header
//! for callers allowed to switch tenants.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::entities::Tenant;
use crate::domain::repositories::TenantRepository;
use crate::domain::services::rbac::{capabilities, CapabilitySet};
use crate::domain::services::TokenClaims;
use crate::shared::{Result, TimeChatError};

pub const TENANT_KEY_PREFIX: &str = "tk_";
const MAX_DATABASE_NAME_LEN: usize = 63;

/// Slugs are 3-48 chars of `[a-z0-9-]` without leading/trailing hyphens
pub fn validate_slug(slug: &str) -> Result<()> {
    let len_ok = (3..=48).contains(&slug.len());
    let chars_ok = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let edges_ok = !slug.starts_with('-') && !slug.ends_with('-');

    if len_ok && chars_ok && edges_ok {
        Ok(())
    } else {
        Err(TimeChatError::validation(
            "slug",
            "Slug must be 3-48 lowercase letters, digits or hyphens",
        ))
    }
}

pub fn database_name_for(prefix: &str, slug: &str) -> Result<String> {
    validate_slug(slug)?;
    let name = format!("{}{}", prefix, slug.replace('-', "_"));
    if name.len() > MAX_DATABASE_NAME_LEN {
        return Err(TimeChatError::validation(
            "slug",
            "Tenant database name would exceed 63 bytes",
        ));
    }
    Ok(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantSelector {
    Id(String),
    Slug(String),
    Key(String),
}

impl TenantSelector {
    /// Classifies a raw header value: `tk_` keys, UUID ids, otherwise a slug
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(TimeChatError::validation("tenant", "Tenant header is empty"));
        }

        if value.starts_with(TENANT_KEY_PREFIX) {
            Ok(TenantSelector::Key(value.to_string()))
        } else if uuid::Uuid::parse_str(value).is_ok() {
            Ok(TenantSelector::Id(value.to_string()))
        } else {
            Ok(TenantSelector::Slug(value.to_lowercase()))
        }
    }

    pub fn matches(&self, tenant: &Tenant) -> bool {
        match self {
            TenantSelector::Id(id) => tenant.id == *id,
            TenantSelector::Slug(slug) => tenant.slug == *slug,
            TenantSelector::Key(key) => tenant.tenant_key == *key,
        }
    }

    fn describe(&self) -> String {
        match self {
            TenantSelector::Id(id) => format!("id {}", id),
            TenantSelector::Slug(slug) => format!("slug {}", slug),
            TenantSelector::Key(_) => "key".to_string(),
        }
    }
}

/// What the request asked for, before the tenant record is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantRequest {
    /// The caller's home tenant from the token
    Home(String),
    /// An explicit header selector, to be checked against the home tenant
    Header {
        selector: TenantSelector,
        home: Option<String>,
        can_switch: bool,
    },
}

pub fn select_tenant(claims: &TokenClaims, header: Option<&str>) -> Result<TenantRequest> {
    let can_switch = CapabilitySet::from_claims(&claims.capabilities)
        .allows(capabilities::TENANTS_SWITCH);

    match header {
        None => claims
            .tenant_id
            .clone()
            .map(TenantRequest::Home)
            .ok_or_else(|| TimeChatError::TenantRequired {
                message: "no tenant in token or header".to_string(),
            }),
        Some(raw) => Ok(TenantRequest::Header {
            selector: TenantSelector::parse(raw)?,
            home: claims.tenant_id.clone(),
            can_switch,
        }),
    }
}

struct CachedTenant {
    tenant: Tenant,
    cached_at: Instant,
}

/// Looks up tenant records and keeps them in a short-lived in-memory cache
pub struct TenantResolver {
    repository: Arc<dyn TenantRepository>,
    ttl: Duration,
    by_id: RwLock<HashMap<String, CachedTenant>>,
    aliases: RwLock<HashMap<TenantSelector, String>>,
}

impl TenantResolver {
    pub fn new(repository: Arc<dyn TenantRepository>, ttl: Duration) -> Self {
        Self {
            repository,
            ttl,
            by_id: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves a request to an available tenant
    pub async fn resolve_request(&self, request: &TenantRequest) -> Result<Tenant> {
        match request {
            TenantRequest::Home(tenant_id) => {
                metrics::counter!("tenant_resolutions_total", "source" => "token").increment(1);
                self.resolve(&TenantSelector::Id(tenant_id.clone())).await
            }
            TenantRequest::Header {
                selector,
                home,
                can_switch,
            } => {
                metrics::counter!("tenant_resolutions_total", "source" => "header").increment(1);
                if *can_switch {
                    return self.resolve(selector).await;
                }
                // Only the home record is looked up so foreign selectors never reveal existence
                let mismatch = || TimeChatError::forbidden("Tenant header does not match your tenant");
                let home = home.as_ref().ok_or_else(mismatch)?;
                let tenant = self.resolve(&TenantSelector::Id(home.clone())).await?;
                if !selector.matches(&tenant) {
                    return Err(mismatch());
                }
                Ok(tenant)
            }
        }
    }

    pub async fn resolve(&self, selector: &TenantSelector) -> Result<Tenant> {
        let tenant = match self.cached(selector).await {
            Some(tenant) => tenant,
            None => {
                let tenant = self
                    .load(selector)
                    .await?
                    .ok_or_else(|| TimeChatError::not_found(format!("Tenant with {}", selector.describe())))?;
                self.store(tenant.clone()).await;
                tenant
            }
        };

        if !tenant.is_available() {
            return Err(TimeChatError::TenantUnavailable {
                tenant: tenant.slug.clone(),
                reason: "tenant is inactive".to_string(),
            });
        }

        Ok(tenant)
    }

    /// Drops every cached alias of the tenant
    pub async fn invalidate(&self, tenant_id: &str) {
        self.by_id.write().await.remove(tenant_id);
        self.aliases.write().await.retain(|_, id| id != tenant_id);
        debug!(tenant_id, "Tenant cache entry invalidated");
    }

    async fn cached(&self, selector: &TenantSelector) -> Option<Tenant> {
        let id = match selector {
            TenantSelector::Id(id) => id.clone(),
            other => self.aliases.read().await.get(other)?.clone(),
        };

        let by_id = self.by_id.read().await;
        let entry = by_id.get(&id)?;
        if entry.cached_at.elapsed() > self.ttl || !selector.matches(&entry.tenant) {
            return None;
        }
        Some(entry.tenant.clone())
    }

    async fn load(&self, selector: &TenantSelector) -> Result<Option<Tenant>> {
        match selector {
            TenantSelector::Id(id) => self.repository.find_by_id(id).await,
            TenantSelector::Slug(slug) => self.repository.find_by_slug(slug).await,
            TenantSelector::Key(key) => self.repository.find_by_key(key).await,
        }
    }

    async fn store(&self, tenant: Tenant) {
        {
            let mut aliases = self.aliases.write().await;
            aliases.insert(TenantSelector::Slug(tenant.slug.clone()), tenant.id.clone());
            aliases.insert(TenantSelector::Key(tenant.tenant_key.clone()), tenant.id.clone());
        }
        self.by_id.write().await.insert(
            tenant.id.clone(),
            CachedTenant {
                tenant,
                cached_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockTenantRepository;
    use crate::domain::services::TokenUse;

    fn tenant(slug: &str) -> Tenant {
        Tenant::new(
            "Acme".into(),
            slug.into(),
            database_name_for("tc_", slug).unwrap(),
            "INV".into(),
            0,
            30,
        )
    }

    fn claims(tenant_id: Option<&str>, caps: &[&str]) -> TokenClaims {
        TokenClaims {
            sub: "user-1".into(),
            email: "a@b.co".into(),
            tenant_id: tenant_id.map(str::to_string),
            roles: vec![],
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            impersonator_id: None,
            impersonation_session_id: None,
            token_use: TokenUse::Access,
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn database_names_derive_from_slug() {
        assert_eq!(
            database_name_for("timechat_tenant_", "acme-corp").unwrap(),
            "timechat_tenant_acme_corp"
        );
        assert!(database_name_for("x_", "Acme").is_err());
        assert!(database_name_for("x_", "-acme").is_err());
        assert!(database_name_for("x_", "ab").is_err());
        assert!(database_name_for(&"p".repeat(40), &"a".repeat(30)).is_err());
    }

    #[test]
    fn selectors_are_classified() {
        assert_eq!(
            TenantSelector::parse("tk_abc").unwrap(),
            TenantSelector::Key("tk_abc".into())
        );
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(TenantSelector::parse(&id).unwrap(), TenantSelector::Id(id));
        assert_eq!(
            TenantSelector::parse(" Acme ").unwrap(),
            TenantSelector::Slug("acme".into())
        );
        assert!(TenantSelector::parse("  ").is_err());
    }

    #[test]
    fn token_tenant_is_used_without_header() {
        let request = select_tenant(&claims(Some("t1"), &[]), None).unwrap();
        assert_eq!(request, TenantRequest::Home("t1".into()));

        let err = select_tenant(&claims(None, &[]), None).unwrap_err();
        assert_eq!(err.error_code(), "TENANT_REQUIRED");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cross_tenant_header_requires_switch_capability() {
        let home = tenant("home-co");
        let home_id = home.id.clone();
        let other = tenant("other-co");
        let lookup = other.clone();
        let mut repo = MockTenantRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(home.clone())));
        repo.expect_find_by_slug()
            .times(1)
            .returning(move |_| Ok(Some(lookup.clone())));

        let resolver = TenantResolver::new(Arc::new(repo), Duration::from_secs(60));

        let request = select_tenant(&claims(Some(&home_id), &[]), Some("other-co")).unwrap();
        let err = resolver.resolve_request(&request).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);

        let request = select_tenant(
            &claims(Some(&home_id), &[capabilities::TENANTS_SWITCH]),
            Some("other-co"),
        )
        .unwrap();
        let resolved = resolver.resolve_request(&request).await.unwrap();
        assert_eq!(resolved.id, other.id);
    }

    #[tokio::test]
    async fn header_naming_home_tenant_is_allowed() {
        let home = tenant("home-co");
        let home_id = home.id.clone();
        let home_key = home.tenant_key.clone();
        let mut repo = MockTenantRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(home.clone())));
        repo.expect_find_by_key().never();

        let resolver = TenantResolver::new(Arc::new(repo), Duration::from_secs(60));
        let request = select_tenant(&claims(Some(&home_id), &[]), Some(&home_key)).unwrap();
        assert_eq!(resolver.resolve_request(&request).await.unwrap().id, home_id);
    }

    #[tokio::test]
    async fn unknown_and_existing_foreign_tenants_look_the_same() {
        let home = tenant("home-co");
        let home_id = home.id.clone();
        let mut repo = MockTenantRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(home.clone())));
        repo.expect_find_by_slug().never();

        let resolver = TenantResolver::new(Arc::new(repo), Duration::from_secs(60));
        for header in ["other-co", "ghost"] {
            let request = select_tenant(&claims(Some(&home_id), &[]), Some(header)).unwrap();
            let err = resolver.resolve_request(&request).await.unwrap_err();
            assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        }

        let request = select_tenant(&claims(None, &[]), Some("ghost")).unwrap();
        let err = resolver.resolve_request(&request).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn lookups_are_cached_until_invalidated() {
        let acme = tenant("acme");
        let acme_id = acme.id.clone();
        let mut repo = MockTenantRepository::new();
        repo.expect_find_by_slug()
            .times(2)
            .returning(move |_| Ok(Some(acme.clone())));

        let resolver = TenantResolver::new(Arc::new(repo), Duration::from_secs(60));
        let selector = TenantSelector::Slug("acme".into());

        resolver.resolve(&selector).await.unwrap();
        resolver.resolve(&selector).await.unwrap();
        // Id lookups hit the cache populated by the slug lookup
        resolver
            .resolve(&TenantSelector::Id(acme_id.clone()))
            .await
            .unwrap();

        resolver.invalidate(&acme_id).await;
        resolver.resolve(&selector).await.unwrap();
    }

    #[tokio::test]
    async fn inactive_and_unknown_tenants_are_rejected() {
        let mut inactive = tenant("sleepy");
        inactive.deactivate();
        let mut repo = MockTenantRepository::new();
        repo.expect_find_by_slug().returning(move |slug| {
            if slug == "sleepy" {
                Ok(Some(inactive.clone()))
            } else {
                Ok(None)
            }
        });

        let resolver = TenantResolver::new(Arc::new(repo), Duration::from_secs(60));

        let err = resolver
            .resolve(&TenantSelector::Slug("sleepy".into()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TENANT_INACTIVE");

        let err = resolver
            .resolve(&TenantSelector::Slug("ghost".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }
}
