use crate::shared::TimeChatError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub tenancy: TenancyConfig,
    pub invoicing: InvoicingConfig,
    pub cors: CorsConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// Database holding users, tenants, roles and the audit log
    pub main_name: String,
    /// Tenant databases are named `<tenant_prefix><slug>`
    pub tenant_prefix: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub two_factor_challenge_minutes: i64,
    pub two_factor_issuer: String,
    pub max_login_attempts: i64,
    pub login_lockout_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub header_name: String,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicingConfig {
    pub default_prefix: String,
    pub default_tax_rate_bps: u32,
    pub payment_terms_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Empty means permissive (development only)
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    pub seed: u64,
    pub weeks_of_entries: u32,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, TimeChatError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| TimeChatError::Configuration {
            message: format!("Invalid {} value: {}", key, raw),
        }),
        None => Ok(default),
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, TimeChatError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| TimeChatError::Configuration {
            message: format!("{} is required", key),
        })
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self, TimeChatError> {
        dotenvy::dotenv().ok(); // Don't fail if .env doesn't exist

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TimeChatError> {
        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let environment = match get_or("ENVIRONMENT", "development").to_lowercase().as_str() {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        };

        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        if environment == Environment::Production && jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(TimeChatError::Configuration {
                message: format!(
                    "JWT_SECRET must be at least {} bytes in production",
                    MIN_PRODUCTION_SECRET_LEN
                ),
            });
        }

        let allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = AppConfig {
            server: ServerConfig {
                host: get_or("HOST", "0.0.0.0"),
                port: parse_or(&lookup, "PORT", 8080)?,
                environment,
            },
            database: DatabaseConfig {
                url: required(&lookup, "DATABASE_URL")?,
                main_name: get_or("DATABASE_NAME", "timechat_main"),
                tenant_prefix: get_or("TENANT_DATABASE_PREFIX", "timechat_tenant_"),
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 100)?,
                min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", 5)?,
                connection_timeout_seconds: parse_or(&lookup, "DATABASE_TIMEOUT", 30)?,
            },
            redis: RedisConfig {
                url: required(&lookup, "REDIS_URL")?,
            },
            auth: AuthConfig {
                jwt_secret,
                access_token_minutes: parse_or(&lookup, "ACCESS_TOKEN_MINUTES", 15)?,
                refresh_token_days: parse_or(&lookup, "REFRESH_TOKEN_DAYS", 30)?,
                two_factor_challenge_minutes: parse_or(&lookup, "TWO_FACTOR_CHALLENGE_MINUTES", 5)?,
                two_factor_issuer: get_or("TWO_FACTOR_ISSUER", "TimeChat"),
                max_login_attempts: parse_or(&lookup, "MAX_LOGIN_ATTEMPTS", 5)?,
                login_lockout_minutes: parse_or(&lookup, "LOGIN_LOCKOUT_MINUTES", 15)?,
            },
            tenancy: TenancyConfig {
                header_name: get_or("TENANT_HEADER", "x-tenant-id").to_lowercase(),
                cache_ttl_seconds: parse_or(&lookup, "TENANT_CACHE_TTL_SECONDS", 300)?,
            },
            invoicing: InvoicingConfig {
                default_prefix: get_or("INVOICE_PREFIX", "INV"),
                default_tax_rate_bps: parse_or(&lookup, "DEFAULT_TAX_RATE_BPS", 0)?,
                payment_terms_days: parse_or(&lookup, "PAYMENT_TERMS_DAYS", 30)?,
            },
            cors: CorsConfig { allowed_origins },
            seed: SeedConfig {
                seed: parse_or(&lookup, "SEED", 42)?,
                weeks_of_entries: parse_or(&lookup, "SEED_WEEKS", 4)?,
                admin_email: get_or("SEED_ADMIN_EMAIL", "admin@timechat.local"),
                admin_password: get_or("SEED_ADMIN_PASSWORD", "ChangeMe123"),
            },
        };

        Ok(config)
    }

    /// Check if we're in development mode
    pub fn is_development(&self) -> bool {
        matches!(self.server.environment, Environment::Development)
    }

    /// Check if we're in production mode
    pub fn is_production(&self) -> bool {
        matches!(self.server.environment, Environment::Production)
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("mongodb://localhost:27017".to_string()),
        "REDIS_URL" => Some("redis://localhost:6379".to_string()),
        "JWT_SECRET" => Some("test-secret-that-is-long-enough-for-hs256".to_string()),
        _ => None,
    })
    .expect("test config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("DATABASE_URL", "mongodb://localhost:27017"),
        ("REDIS_URL", "redis://localhost:6379"),
        ("JWT_SECRET", "dev-secret"),
    ];

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&BASE)).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(config.is_development());
        assert_eq!(config.database.main_name, "timechat_main");
        assert_eq!(config.database.tenant_prefix, "timechat_tenant_");
        assert_eq!(config.auth.access_token_minutes, 15);
        assert_eq!(config.tenancy.header_name, "x-tenant-id");
        assert_eq!(config.invoicing.default_prefix, "INV");
        assert!(config.cors.allowed_origins.is_empty());
    }

    #[test]
    fn missing_required_value_is_reported() {
        let err = AppConfig::from_lookup(lookup_from(&BASE[..2])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET is required"));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("Invalid PORT value"));
    }

    #[test]
    fn production_requires_long_secret() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ENVIRONMENT", "production"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());

        pairs[2] = ("JWT_SECRET", "0123456789abcdef0123456789abcdef");
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn cors_origins_are_split() {
        let mut pairs = BASE.to_vec();
        pairs.push((
            "CORS_ALLOWED_ORIGINS",
            "https://app.example.com, https://admin.example.com,",
        ));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://app.example.com", "https://admin.example.com"]
        );
    }
}
