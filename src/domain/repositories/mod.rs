use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::*;
use crate::shared::types::{Email, Pagination};
use crate::shared::Result;

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// `None` lists users of every tenant
    pub tenant_id: Option<String>,
    pub include_inactive: bool,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub client_id: Option<String>,
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TimeEntryFilter {
    pub user_id: Option<String>,
    pub project_ids: Option<Vec<String>>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub billable: Option<bool>,
    pub uninvoiced_only: bool,
    pub completed_only: bool,
}

// ---- Main database ----

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>>;
    async fn list(&self, filter: &UserFilter, pagination: &Pagination) -> Result<(Vec<User>, u64)>;
    async fn update(&self, user: &User) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, tenant: &Tenant) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>>;
    async fn find_by_key(&self, tenant_key: &str) -> Result<Option<Tenant>>;
    async fn list(&self, include_inactive: bool) -> Result<Vec<Tenant>>;
    async fn update(&self, tenant: &Tenant) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, role: &Role) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Role>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>>;
    async fn list(&self) -> Result<Vec<Role>>;
    async fn update(&self, role: &Role) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<Role>>;
    /// Replaces the user's role assignments
    async fn set_user_roles(&self, user_id: &str, role_ids: &[String]) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<()>;
    async fn list(&self, filter: &AuditFilter, pagination: &Pagination) -> Result<Vec<AuditEntry>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImpersonationRepository: Send + Sync {
    async fn create(&self, session: &ImpersonationSession) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<ImpersonationSession>>;
    async fn end(&self, id: &str, ended_at: DateTime<Utc>) -> Result<()>;
    /// Newest first; `tenant_id` limits the listing to sessions targeting that tenant
    async fn list(&self, tenant_id: Option<String>, pagination: &Pagination) -> Result<Vec<ImpersonationSession>>;
}

// ---- Tenant database ----

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, client: &Client) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Client>>;
    async fn list(&self, include_inactive: bool) -> Result<Vec<Client>>;
    async fn update(&self, client: &Client) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Project>>;
    async fn list(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;
    async fn update(&self, project: &Project) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeEntryRepository: Send + Sync {
    async fn create(&self, entry: &TimeEntry) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<TimeEntry>>;
    async fn find_running_for_user(&self, user_id: &str) -> Result<Option<TimeEntry>>;
    async fn list(&self, filter: &TimeEntryFilter) -> Result<Vec<TimeEntry>>;
    async fn update(&self, entry: &TimeEntry) -> Result<()>;
    /// Marks entries as billed on `invoice_id`; returns how many were updated
    async fn assign_invoice(&self, entry_ids: &[String], invoice_id: &str) -> Result<u64>;
    async fn release_invoice(&self, invoice_id: &str) -> Result<u64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn create(&self, invoice: &Invoice) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Invoice>>;
    async fn list(&self, status: Option<InvoiceStatus>, client_id: Option<String>) -> Result<Vec<Invoice>>;
    async fn update(&self, invoice: &Invoice) -> Result<()>;
    /// Atomically increments the named counter and returns the new value
    async fn next_sequence(&self, counter: &str) -> Result<i64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillRepository: Send + Sync {
    async fn create(&self, bill: &Bill) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Bill>>;
    async fn list(&self, status: Option<BillStatus>) -> Result<Vec<Bill>>;
    async fn update(&self, bill: &Bill) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>>;
    /// Reserves the next sequence number in the conversation
    async fn next_message_sequence(&self, conversation_id: &str) -> Result<u32>;
    async fn append_message(&self, message: &ChatMessage) -> Result<()>;
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;
}
