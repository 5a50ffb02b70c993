use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, bson_date_opt, chrono_date, collect};
use crate::domain::entities::TimeEntry;
use crate::domain::repositories::{TimeEntryFilter, TimeEntryRepository};
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TimeEntryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub description: Option<String>,
    pub started_at: bson::DateTime,
    pub ended_at: Option<bson::DateTime>,
    /// Backs the partial unique index allowing one running timer per user
    pub running: bool,
    pub duration_minutes: i64,
    pub is_billable: bool,
    pub invoice_id: Option<String>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub deleted_at: Option<bson::DateTime>,
}

impl From<&TimeEntry> for TimeEntryDocument {
    fn from(e: &TimeEntry) -> Self {
        Self {
            id: e.id.clone(),
            user_id: e.user_id.clone(),
            project_id: e.project_id.clone(),
            description: e.description.clone(),
            started_at: bson_date(e.started_at),
            ended_at: bson_date_opt(e.ended_at),
            running: e.is_running() && e.deleted_at.is_none(),
            duration_minutes: e.duration_minutes,
            is_billable: e.is_billable,
            invoice_id: e.invoice_id.clone(),
            created_at: bson_date(e.created_at),
            updated_at: bson_date(e.updated_at),
            deleted_at: bson_date_opt(e.deleted_at),
        }
    }
}

impl TryFrom<TimeEntryDocument> for TimeEntry {
    type Error = TimeChatError;

    fn try_from(d: TimeEntryDocument) -> Result<Self> {
        Ok(TimeEntry {
            id: d.id,
            user_id: d.user_id,
            project_id: d.project_id,
            description: d.description,
            started_at: chrono_date(d.started_at),
            ended_at: d.ended_at.map(chrono_date),
            duration_minutes: d.duration_minutes,
            is_billable: d.is_billable,
            invoice_id: d.invoice_id,
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
            deleted_at: d.deleted_at.map(chrono_date),
        })
    }
}

/// `from` is inclusive and `to` exclusive, both on `started_at`
fn entry_filter(filter: &TimeEntryFilter) -> Document {
    let mut query = doc! {"deleted_at": null};
    if let Some(user_id) = &filter.user_id {
        query.insert("user_id", user_id.as_str());
    }
    if let Some(project_ids) = &filter.project_ids {
        query.insert("project_id", doc! {"$in": project_ids.clone()});
    }

    let mut started = Document::new();
    if let Some(from) = filter.from {
        started.insert("$gte", bson_date(from));
    }
    if let Some(to) = filter.to {
        started.insert("$lt", bson_date(to));
    }
    if !started.is_empty() {
        query.insert("started_at", started);
    }

    if let Some(billable) = filter.billable {
        query.insert("is_billable", billable);
    }
    if filter.uninvoiced_only {
        query.insert("invoice_id", bson::Bson::Null);
    }
    if filter.completed_only {
        query.insert("running", false);
    }
    query
}

pub struct MongoTimeEntryRepository {
    collection: Collection<TimeEntryDocument>,
}

impl MongoTimeEntryRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("time_entries"),
        }
    }
}

#[async_trait]
impl TimeEntryRepository for MongoTimeEntryRepository {
    async fn create(&self, entry: &TimeEntry) -> Result<()> {
        self.collection
            .insert_one(TimeEntryDocument::from(entry), None)
            .await
            .map_err(|e| {
                if crate::shared::errors::is_duplicate_key(&e) {
                    TimeChatError::conflict("time_entry", "A timer is already running")
                } else {
                    TimeChatError::from(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TimeEntry>> {
        self.collection
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(TimeEntry::try_from)
            .transpose()
    }

    async fn find_running_for_user(&self, user_id: &str) -> Result<Option<TimeEntry>> {
        self.collection
            .find_one(doc! {"user_id": user_id, "running": true}, None)
            .await?
            .map(TimeEntry::try_from)
            .transpose()
    }

    async fn list(&self, filter: &TimeEntryFilter) -> Result<Vec<TimeEntry>> {
        let options = FindOptions::builder().sort(doc! {"started_at": -1}).build();
        collect(self.collection.find(entry_filter(filter), options).await?).await
    }

    async fn update(&self, entry: &TimeEntry) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! {"_id": &entry.id}, TimeEntryDocument::from(entry), None)
            .await?;
        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("Time entry with id: {}", entry.id)));
        }
        Ok(())
    }

    async fn assign_invoice(&self, entry_ids: &[String], invoice_id: &str) -> Result<u64> {
        let result = self
            .collection
            .update_many(
                doc! {"_id": {"$in": entry_ids.to_vec()}, "invoice_id": null},
                doc! {"$set": {
                    "invoice_id": invoice_id,
                    "updated_at": bson_date(crate::shared::utils::now()),
                }},
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn release_invoice(&self, invoice_id: &str) -> Result<u64> {
        let result = self
            .collection
            .update_many(
                doc! {"invoice_id": invoice_id},
                doc! {"$set": {
                    "invoice_id": null,
                    "updated_at": bson_date(crate::shared::utils::now()),
                }},
                None,
            )
            .await?;
        Ok(result.modified_count)
    }
}
