use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::shared::types::{Email, PhoneNumber};

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: Email,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<PhoneNumber>,
    /// Home tenant; platform admins have none
    pub tenant_id: Option<String>,
    pub is_active: bool,
    pub two_factor: TwoFactorState,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorState {
    pub enabled: bool,
    /// Base32 TOTP secret, set once enabled
    pub secret: Option<String>,
    /// Secret generated by setup, awaiting confirmation
    pub pending_secret: Option<String>,
    /// Argon2 hashes of unused backup codes
    pub backup_codes: Vec<String>,
}

impl User {
    pub fn new(
        email: Email,
        password_hash: String,
        first_name: String,
        last_name: String,
        tenant_id: Option<String>,
    ) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            email,
            password_hash,
            first_name,
            last_name,
            phone: None,
            tenant_id,
            is_active: true,
            two_factor: TwoFactorState::default(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Active and not soft-deleted
    pub fn can_sign_in(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    pub fn record_login(&mut self) {
        let now = crate::shared::utils::now();
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn deactivate(&mut self) {
        let now = crate::shared::utils::now();
        self.is_active = false;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        self.updated_at = crate::shared::utils::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        User::new(
            Email::new("ana@example.com").unwrap(),
            "hash".into(),
            "Ana".into(),
            "Lopez".into(),
            Some("tenant-1".into()),
        )
    }

    #[test]
    fn deactivation_soft_deletes() {
        let mut user = sample();
        assert!(user.can_sign_in());

        user.deactivate();
        assert!(!user.is_active);
        assert!(user.deleted_at.is_some());
        assert!(!user.can_sign_in());
    }

    #[test]
    fn full_name_trims_missing_parts() {
        let mut user = sample();
        assert_eq!(user.full_name(), "Ana Lopez");
        user.last_name.clear();
        assert_eq!(user.full_name(), "Ana");
    }
}
