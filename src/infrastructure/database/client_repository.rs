use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, bson_date_opt, chrono_date, collect};
use crate::domain::entities::{Client, Project};
use crate::domain::repositories::{ClientRepository, ProjectFilter, ProjectRepository};
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClientDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub hourly_rate_cents: i64,
    pub currency: String,
    pub is_active: bool,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub deleted_at: Option<bson::DateTime>,
}

impl From<&Client> for ClientDocument {
    fn from(c: &Client) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            email: c.email.clone(),
            hourly_rate_cents: c.hourly_rate_cents,
            currency: c.currency.clone(),
            is_active: c.is_active,
            created_at: bson_date(c.created_at),
            updated_at: bson_date(c.updated_at),
            deleted_at: bson_date_opt(c.deleted_at),
        }
    }
}

impl TryFrom<ClientDocument> for Client {
    type Error = TimeChatError;

    fn try_from(d: ClientDocument) -> Result<Self> {
        Ok(Client {
            id: d.id,
            name: d.name,
            email: d.email,
            hourly_rate_cents: d.hourly_rate_cents,
            currency: d.currency,
            is_active: d.is_active,
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
            deleted_at: d.deleted_at.map(chrono_date),
        })
    }
}

pub struct MongoClientRepository {
    collection: Collection<ClientDocument>,
}

impl MongoClientRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("clients"),
        }
    }
}

#[async_trait]
impl ClientRepository for MongoClientRepository {
    async fn create(&self, client: &Client) -> Result<()> {
        self.collection
            .insert_one(ClientDocument::from(client), None)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Client>> {
        self.collection
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Client>> {
        let filter = if include_inactive {
            doc! {}
        } else {
            doc! {"deleted_at": null}
        };
        let options = FindOptions::builder().sort(doc! {"name": 1}).build();
        collect(self.collection.find(filter, options).await?).await
    }

    async fn update(&self, client: &Client) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! {"_id": &client.id}, ClientDocument::from(client), None)
            .await?;
        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("Client with id: {}", client.id)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_billable: bool,
    pub hourly_rate_cents: Option<i64>,
    pub is_active: bool,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub deleted_at: Option<bson::DateTime>,
}

impl From<&Project> for ProjectDocument {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id.clone(),
            client_id: p.client_id.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
            is_billable: p.is_billable,
            hourly_rate_cents: p.hourly_rate_cents,
            is_active: p.is_active,
            created_at: bson_date(p.created_at),
            updated_at: bson_date(p.updated_at),
            deleted_at: bson_date_opt(p.deleted_at),
        }
    }
}

impl TryFrom<ProjectDocument> for Project {
    type Error = TimeChatError;

    fn try_from(d: ProjectDocument) -> Result<Self> {
        Ok(Project {
            id: d.id,
            client_id: d.client_id,
            name: d.name,
            description: d.description,
            is_billable: d.is_billable,
            hourly_rate_cents: d.hourly_rate_cents,
            is_active: d.is_active,
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
            deleted_at: d.deleted_at.map(chrono_date),
        })
    }
}

fn project_filter(filter: &ProjectFilter) -> Document {
    let mut query = Document::new();
    if let Some(client_id) = &filter.client_id {
        query.insert("client_id", client_id.as_str());
    }
    if !filter.include_inactive {
        query.insert("deleted_at", bson::Bson::Null);
    }
    query
}

pub struct MongoProjectRepository {
    collection: Collection<ProjectDocument>,
}

impl MongoProjectRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("projects"),
        }
    }
}

#[async_trait]
impl ProjectRepository for MongoProjectRepository {
    async fn create(&self, project: &Project) -> Result<()> {
        self.collection
            .insert_one(ProjectDocument::from(project), None)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>> {
        self.collection
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn list(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let options = FindOptions::builder().sort(doc! {"name": 1}).build();
        collect(self.collection.find(project_filter(filter), options).await?).await
    }

    async fn update(&self, project: &Project) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! {"_id": &project.id}, ProjectDocument::from(project), None)
            .await?;
        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("Project with id: {}", project.id)));
        }
        Ok(())
    }
}
