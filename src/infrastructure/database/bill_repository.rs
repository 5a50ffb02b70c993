use async_trait::async_trait;
use bson::doc;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, bson_date_opt, chrono_date, collect, date_string, parse_date};
use crate::domain::entities::{Bill, BillStatus};
use crate::domain::repositories::BillRepository;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BillDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub vendor: String,
    pub bill_number: Option<String>,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: BillStatus,
    pub issue_date: String,
    pub due_date: String,
    pub paid_at: Option<bson::DateTime>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub deleted_at: Option<bson::DateTime>,
}

impl From<&Bill> for BillDocument {
    fn from(b: &Bill) -> Self {
        Self {
            id: b.id.clone(),
            vendor: b.vendor.clone(),
            bill_number: b.bill_number.clone(),
            description: b.description.clone(),
            amount_cents: b.amount_cents,
            currency: b.currency.clone(),
            status: b.status,
            issue_date: date_string(b.issue_date),
            due_date: date_string(b.due_date),
            paid_at: bson_date_opt(b.paid_at),
            created_at: bson_date(b.created_at),
            updated_at: bson_date(b.updated_at),
            deleted_at: bson_date_opt(b.deleted_at),
        }
    }
}

impl TryFrom<BillDocument> for Bill {
    type Error = TimeChatError;

    fn try_from(d: BillDocument) -> Result<Self> {
        Ok(Bill {
            id: d.id,
            vendor: d.vendor,
            bill_number: d.bill_number,
            description: d.description,
            amount_cents: d.amount_cents,
            currency: d.currency,
            status: d.status,
            issue_date: parse_date(&d.issue_date)?,
            due_date: parse_date(&d.due_date)?,
            paid_at: d.paid_at.map(chrono_date),
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
            deleted_at: d.deleted_at.map(chrono_date),
        })
    }
}

pub struct MongoBillRepository {
    collection: Collection<BillDocument>,
}

impl MongoBillRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            collection: database.collection("bills"),
        }
    }
}

#[async_trait]
impl BillRepository for MongoBillRepository {
    async fn create(&self, bill: &Bill) -> Result<()> {
        self.collection
            .insert_one(BillDocument::from(bill), None)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Bill>> {
        self.collection
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(Bill::try_from)
            .transpose()
    }

    async fn list(&self, status: Option<BillStatus>) -> Result<Vec<Bill>> {
        let mut filter = doc! {"deleted_at": null};
        if let Some(status) = status {
            filter.insert("status", status.as_str());
        }
        let options = FindOptions::builder().sort(doc! {"due_date": 1}).build();
        collect(self.collection.find(filter, options).await?).await
    }

    async fn update(&self, bill: &Bill) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! {"_id": &bill.id}, BillDocument::from(bill), None)
            .await?;
        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("Bill with id: {}", bill.id)));
        }
        Ok(())
    }
}
