pub mod audit_repository;
pub mod bill_repository;
pub mod chat_repository;
pub mod client_repository;
pub mod connection;
pub mod invoice_repository;
pub mod redis;
pub mod role_repository;
pub mod tenant_repository;
pub mod tenant_router;
pub mod time_entry_repository;
pub mod user_repository;

pub use audit_repository::{MongoAuditRepository, MongoImpersonationRepository};
pub use chat_repository::MongoChatRepository;
pub use client_repository::{MongoClientRepository, MongoProjectRepository};
pub use connection::MongoDatabase;
pub use bill_repository::MongoBillRepository;
pub use invoice_repository::MongoInvoiceRepository;
pub use redis::RedisConnection;
pub use role_repository::MongoRoleRepository;
pub use tenant_repository::MongoTenantRepository;
pub use tenant_router::{TenantDatabaseRouter, TenantHandle};
pub use time_entry_repository::MongoTimeEntryRepository;
pub use user_repository::MongoUserRepository;

use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::Cursor;
use serde::de::DeserializeOwned;

use crate::shared::{Result, TimeChatError};

pub(crate) fn bson_date(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(dt)
}

pub(crate) fn bson_date_opt(dt: Option<DateTime<Utc>>) -> Option<bson::DateTime> {
    dt.map(bson_date)
}

pub(crate) fn chrono_date(dt: bson::DateTime) -> DateTime<Utc> {
    dt.to_chrono()
}

/// Calendar dates are stored as `YYYY-MM-DD`, which sorts correctly as a string
pub(crate) fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| TimeChatError::Database {
        message: format!("Corrupt date '{}' in database: {}", raw, e),
    })
}

/// Escapes user input for use inside a MongoDB `$regex`
pub(crate) fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub(crate) async fn collect<D, T>(cursor: Cursor<D>) -> Result<Vec<T>>
where
    D: DeserializeOwned + Unpin + Send + Sync,
    T: TryFrom<D, Error = TimeChatError>,
{
    let docs: Vec<D> = cursor.try_collect().await?;
    docs.into_iter().map(T::try_from).collect()
}
