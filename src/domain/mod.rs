pub mod entities;
pub mod repositories;
pub mod services;

// Re-export common types
pub use entities::*;
pub use repositories::*;
pub use services::*;
