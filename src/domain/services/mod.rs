pub mod audit;
pub mod auth_service;
pub mod catalog;
pub mod chat;
pub mod impersonation;
pub mod invoicing;
pub mod payables;
pub mod rbac;
pub mod reporting;
pub mod role_service;
pub mod seed;
pub mod tenancy;
pub mod tenant_service;
pub mod timesheet;
pub mod user_service;

pub use auth_service::*;
