pub mod admin_handlers;
pub mod auth_handlers;
pub mod bill_handlers;
pub mod catalog_handlers;
pub mod chat_handlers;
pub mod invoice_handlers;
pub mod report_handlers;
pub mod role_handlers;
pub mod system_handlers;
pub mod tenant_handlers;
pub mod time_entry_handlers;
pub mod user_handlers;
