pub mod audit;
pub mod bill;
pub mod chat;
pub mod client;
pub mod invoice;
pub mod project;
pub mod role;
pub mod tenant;
pub mod time_entry;
pub mod user;

pub use audit::{AuditEntry, ImpersonationSession};
pub use bill::{Bill, BillStatus};
pub use chat::{ChatMessage, ChatRole, Conversation};
pub use client::Client;
pub use invoice::{Invoice, InvoiceLineItem, InvoiceStatus};
pub use project::Project;
pub use role::{Role, UserRole};
pub use tenant::Tenant;
pub use time_entry::TimeEntry;
pub use user::{TwoFactorState, User};
