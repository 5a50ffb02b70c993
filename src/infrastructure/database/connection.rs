use mongodb::{
    bson::{doc, Document},
    options::{ClientOptions, IndexOptions, ResolverConfig},
    Client, Collection, Database, IndexModel,
};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::shared::{Result, TimeChatError};

/// Shared MongoDB client plus the main database; tenant databases hang off the same client
#[derive(Clone)]
pub struct MongoDatabase {
    client: Arc<Client>,
    database: Arc<Database>,
}

impl MongoDatabase {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to MongoDB");

        let mut client_options = ClientOptions::parse_with_resolver_config(
            &config.url,
            ResolverConfig::cloudflare(),
        )
        .await
        .map_err(|e| TimeChatError::Database {
            message: format!("Invalid MongoDB URL: {}", e),
        })?;

        client_options.max_pool_size = Some(config.max_connections);
        client_options.min_pool_size = Some(config.min_connections);
        client_options.connect_timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        client_options.server_selection_timeout = Some(Duration::from_secs(10));
        client_options.app_name = Some("timechat-backend".to_string());

        let client = Client::with_options(client_options).map_err(|e| TimeChatError::Database {
            message: format!("Failed to create MongoDB client: {}", e),
        })?;

        let database = client.database(&config.main_name);
        database
            .run_command(doc! {"ping": 1}, None)
            .await
            .map_err(|e| TimeChatError::Database {
                message: format!("Failed to connect to MongoDB: {}", e),
            })?;

        info!("Connected to MongoDB main database: {}", config.main_name);

        Ok(Self {
            client: Arc::new(client),
            database: Arc::new(database),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> Arc<Database> {
        self.database.clone()
    }

    /// Handle to a tenant database on the shared connection pool
    pub fn tenant_database(&self, name: &str) -> Arc<Database> {
        Arc::new(self.client.database(name))
    }

    pub fn collection<T>(&self, collection_name: &str) -> Collection<T> {
        self.database.collection(collection_name)
    }

    pub async fn health_check(&self) -> Result<()> {
        self.database
            .run_command(doc! {"ping": 1}, None)
            .await
            .map_err(|e| TimeChatError::Database {
                message: format!("Database health check failed: {}", e),
            })?;
        Ok(())
    }

    pub async fn create_indexes(&self) -> Result<()> {
        info!("Creating main database indexes...");
        let db = &self.database;

        create_index(db, "users", doc! {"email": 1}, true).await?;
        create_index(db, "users", doc! {"tenant_id": 1, "deleted_at": 1}, false).await?;
        create_index(db, "tenants", doc! {"slug": 1}, true).await?;
        create_index(db, "tenants", doc! {"tenant_key": 1}, true).await?;
        create_index(db, "roles", doc! {"name": 1}, true).await?;
        create_index(db, "user_roles", doc! {"user_id": 1, "role_id": 1}, true).await?;
        create_index(db, "audit_log", doc! {"created_at": -1}, false).await?;
        create_index(db, "audit_log", doc! {"actor_id": 1, "created_at": -1}, false).await?;
        create_index(db, "impersonation_sessions", doc! {"started_at": -1}, false).await?;
        create_index(db, "impersonation_sessions", doc! {"tenant_id": 1, "started_at": -1}, false).await?;

        info!("Main database indexes created successfully");
        Ok(())
    }
}

/// Indexes every tenant database carries
pub async fn create_tenant_indexes(db: &Database) -> Result<()> {
    create_index(db, "clients", doc! {"deleted_at": 1, "name": 1}, false).await?;
    create_index(db, "projects", doc! {"client_id": 1}, false).await?;
    create_index(db, "time_entries", doc! {"user_id": 1, "started_at": -1}, false).await?;
    create_index(db, "time_entries", doc! {"project_id": 1, "started_at": 1}, false).await?;
    create_index(db, "time_entries", doc! {"invoice_id": 1}, false).await?;
    // At most one running timer per user.
    create_index_with(
        db,
        "time_entries",
        doc! {"user_id": 1},
        IndexOptions::builder()
            .unique(true)
            .partial_filter_expression(doc! {"running": true})
            .name("one_running_timer_per_user".to_string())
            .build(),
    )
    .await?;
    create_index(db, "invoices", doc! {"number": 1}, true).await?;
    create_index(db, "invoices", doc! {"client_id": 1, "status": 1}, false).await?;
    create_index(db, "bills", doc! {"status": 1, "due_date": 1}, false).await?;
    create_index(db, "conversations", doc! {"user_id": 1, "updated_at": -1}, false).await?;
    create_index(db, "chat_messages", doc! {"conversation_id": 1, "sequence": 1}, true).await?;
    Ok(())
}

async fn create_index(db: &Database, collection: &str, keys: Document, unique: bool) -> Result<()> {
    let options = IndexOptions::builder().unique(unique).build();
    create_index_with(db, collection, keys, options).await
}

async fn create_index_with(db: &Database, collection: &str, keys: Document, options: IndexOptions) -> Result<()> {
    db.collection::<Document>(collection)
        .create_index(IndexModel::builder().keys(keys).options(options).build(), None)
        .await
        .map_err(|e| TimeChatError::Database {
            message: format!("Failed to create {} index: {}", collection, e),
        })?;
    Ok(())
}
