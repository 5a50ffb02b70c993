pub mod auth_middleware;
pub mod tenant_context;

pub use auth_middleware::{auth_middleware, AuthenticatedUser};
pub use tenant_context::TenantContext;
