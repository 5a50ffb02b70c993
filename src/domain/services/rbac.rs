//! Capability-based authorization.
//!
//! A capability is a `resource:action` string. A user's capabilities are the
//! union of the capabilities of every role assigned to them.

use std::collections::BTreeSet;

use crate::domain::entities::Role;
use crate::shared::{Result, TimeChatError};

pub mod capabilities {
    pub const USERS_READ: &str = "users:read";
    pub const USERS_WRITE: &str = "users:write";
    pub const USERS_DELETE: &str = "users:delete";
    pub const USERS_IMPERSONATE: &str = "users:impersonate";
    pub const ROLES_READ: &str = "roles:read";
    pub const ROLES_WRITE: &str = "roles:write";
    pub const TENANTS_READ: &str = "tenants:read";
    pub const TENANTS_WRITE: &str = "tenants:write";
    pub const TENANTS_SWITCH: &str = "tenants:switch";
    pub const CLIENTS_READ: &str = "clients:read";
    pub const CLIENTS_WRITE: &str = "clients:write";
    pub const PROJECTS_READ: &str = "projects:read";
    pub const PROJECTS_WRITE: &str = "projects:write";
    pub const TIME_ENTRIES_READ: &str = "time_entries:read";
    pub const TIME_ENTRIES_WRITE: &str = "time_entries:write";
    pub const TIME_ENTRIES_READ_ALL: &str = "time_entries:read_all";
    pub const INVOICES_READ: &str = "invoices:read";
    pub const INVOICES_WRITE: &str = "invoices:write";
    pub const BILLS_READ: &str = "bills:read";
    pub const BILLS_WRITE: &str = "bills:write";
    pub const REPORTS_READ: &str = "reports:read";
    pub const AUDIT_READ: &str = "audit:read";
    pub const CHAT_USE: &str = "chat:use";

    pub const ALL: &[&str] = &[
        USERS_READ,
        USERS_WRITE,
        USERS_DELETE,
        USERS_IMPERSONATE,
        ROLES_READ,
        ROLES_WRITE,
        TENANTS_READ,
        TENANTS_WRITE,
        TENANTS_SWITCH,
        CLIENTS_READ,
        CLIENTS_WRITE,
        PROJECTS_READ,
        PROJECTS_WRITE,
        TIME_ENTRIES_READ,
        TIME_ENTRIES_WRITE,
        TIME_ENTRIES_READ_ALL,
        INVOICES_READ,
        INVOICES_WRITE,
        BILLS_READ,
        BILLS_WRITE,
        REPORTS_READ,
        AUDIT_READ,
        CHAT_USE,
    ];
}

pub const SUPER_ADMIN: &str = "super_admin";
pub const TENANT_ADMIN: &str = "tenant_admin";
pub const MANAGER: &str = "manager";
pub const USER: &str = "user";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn from_roles(roles: &[Role]) -> Self {
        Self(
            roles
                .iter()
                .flat_map(|role| role.capabilities.iter().cloned())
                .collect(),
        )
    }

    pub fn from_claims(capabilities: &[String]) -> Self {
        Self(capabilities.iter().cloned().collect())
    }

    pub fn allows(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    pub fn require(&self, capability: &str) -> Result<()> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(TimeChatError::forbidden(format!(
                "Missing capability {}",
                capability
            )))
        }
    }

    /// Fails with 403 on the first requested capability this set lacks
    pub fn ensure_grantable(&self, requested: &[String]) -> Result<()> {
        match requested.iter().find(|c| !self.allows(c)) {
            Some(missing) => Err(TimeChatError::forbidden(format!(
                "Cannot grant capability {} without holding it",
                missing
            ))),
            None => Ok(()),
        }
    }

    pub fn remove(&mut self, capability: &str) {
        self.0.remove(capability);
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

/// Rejects capability strings outside the catalogue and removes duplicates
pub fn validate_capabilities(requested: &[String]) -> Result<Vec<String>> {
    let mut unique = BTreeSet::new();
    for capability in requested {
        if !capabilities::ALL.contains(&capability.as_str()) {
            return Err(TimeChatError::validation(
                "capabilities",
                format!("Unknown capability: {}", capability),
            ));
        }
        unique.insert(capability.clone());
    }
    Ok(unique.into_iter().collect())
}

/// The roles every installation starts with
pub fn system_roles() -> Vec<Role> {
    use capabilities::*;

    let all: Vec<String> = ALL.iter().map(|c| c.to_string()).collect();

    let tenant_admin: Vec<String> = ALL
        .iter()
        .filter(|c| **c != TENANTS_WRITE && **c != TENANTS_SWITCH)
        .map(|c| c.to_string())
        .collect();

    let manager: Vec<String> = [
        USERS_READ,
        CLIENTS_READ,
        CLIENTS_WRITE,
        PROJECTS_READ,
        PROJECTS_WRITE,
        TIME_ENTRIES_READ,
        TIME_ENTRIES_WRITE,
        TIME_ENTRIES_READ_ALL,
        INVOICES_READ,
        INVOICES_WRITE,
        BILLS_READ,
        REPORTS_READ,
        CHAT_USE,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    let user: Vec<String> = [
        CLIENTS_READ,
        PROJECTS_READ,
        TIME_ENTRIES_READ,
        TIME_ENTRIES_WRITE,
        CHAT_USE,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    vec![
        Role::system(SUPER_ADMIN, "Platform administrator", all),
        Role::system(TENANT_ADMIN, "Administrator of a single tenant", tenant_admin),
        Role::system(MANAGER, "Manages clients, projects and billing", manager),
        Role::system(USER, "Tracks time and chats", user),
    ]
}
