pub mod app_state;
pub mod errors;

pub use app_state::AppState;
pub use errors::{Result, TimeChatError};

/// Common types used across the application
pub mod types {
    use serde::{Deserialize, Serialize};

    /// Lowercased, trimmed email address
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Email(String);

    impl Email {
        pub fn new(email: &str) -> Result<Self, super::TimeChatError> {
            let cleaned = email.trim().to_lowercase();

            let valid = match cleaned.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                        && !cleaned.contains(char::is_whitespace)
                }
                None => false,
            };

            if valid {
                Ok(Email(cleaned))
            } else {
                Err(super::TimeChatError::validation(
                    "email",
                    "Invalid email address",
                ))
            }
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    /// Phone number normalized to E.164
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PhoneNumber(String);

    impl PhoneNumber {
        pub fn new(phone: &str) -> Result<Self, super::TimeChatError> {
            let invalid = || super::TimeChatError::validation("phone", "Invalid phone number");

            let parsed = phonenumber::parse(None, phone.trim()).map_err(|_| invalid())?;
            if !parsed.is_valid() {
                return Err(invalid());
            }

            Ok(PhoneNumber(
                parsed.format().mode(phonenumber::Mode::E164).to_string(),
            ))
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    /// Page/limit query parameters shared by list endpoints
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct Pagination {
        pub page: Option<u32>,
        pub limit: Option<u32>,
    }

    impl Pagination {
        pub const MAX_LIMIT: u32 = 100;

        pub fn page(&self) -> u32 {
            self.page.unwrap_or(1).max(1)
        }

        pub fn limit(&self) -> u32 {
            self.limit.unwrap_or(20).clamp(1, Self::MAX_LIMIT)
        }

        pub fn skip(&self) -> u64 {
            (self.page() as u64 - 1) * self.limit() as u64
        }
    }

    /// Standard list response envelope
    #[derive(Debug, Serialize)]
    pub struct Page<T> {
        pub items: Vec<T>,
        pub page: u32,
        pub limit: u32,
        pub total: u64,
    }
}

/// Utilities for common operations
pub mod utils {
    use super::Result;
    use chrono::{DateTime, Utc};
    use rand::Rng;
    use uuid::Uuid;

    /// Generate a unique ID
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Get current UTC timestamp
    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }

    /// Opaque public tenant key, e.g. `tk_3f9a...`
    pub fn generate_tenant_key() -> String {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 12] = rng.gen();
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        format!("tk_{}", hex)
    }

    /// `numerator / denominator` rounded half away from zero, for non-negative values.
    pub fn div_round_half_up(numerator: i64, denominator: i64) -> i64 {
        debug_assert!(denominator > 0);
        (numerator + denominator / 2) / denominator
    }

    /// Hash a password using Argon2
    pub fn hash_password(password: &str) -> Result<String> {
        use argon2::{
            password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
            Argon2,
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| super::TimeChatError::Internal {
                message: format!("Password hashing failed: {}", e),
            })
    }

    /// Verify a password against its hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        use argon2::{
            password_hash::{PasswordHash, PasswordVerifier},
            Argon2,
        };

        let parsed_hash = PasswordHash::new(hash).map_err(|e| super::TimeChatError::Internal {
            message: format!("Invalid password hash: {}", e),
        })?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Passwords need 8+ characters with at least one letter and one digit
    pub fn check_password_strength(password: &str) -> Result<()> {
        let long_enough = password.chars().count() >= 8;
        let has_letter = password.chars().any(|c| c.is_alphabetic());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if long_enough && has_letter && has_digit {
            Ok(())
        } else {
            Err(super::TimeChatError::validation(
                "password",
                "Password must be at least 8 characters and contain letters and digits",
            ))
        }
    }
}
