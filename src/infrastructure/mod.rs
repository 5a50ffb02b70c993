pub mod auth_service_impl;
pub mod database;
pub mod seeder;

// Re-export common types
pub use auth_service_impl::*;
pub use database::*;
pub use seeder::{SeedOptions, SeedSummary, Seeder};
