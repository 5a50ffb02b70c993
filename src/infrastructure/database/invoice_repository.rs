use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{bson_date, bson_date_opt, chrono_date, collect, date_string, parse_date};
use crate::domain::entities::{Invoice, InvoiceLineItem, InvoiceStatus};
use crate::domain::repositories::InvoiceRepository;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InvoiceDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub number: String,
    pub client_id: String,
    pub status: InvoiceStatus,
    pub issue_date: String,
    pub due_date: String,
    pub period_start: String,
    pub period_end: String,
    pub line_items: Vec<InvoiceLineItem>,
    pub subtotal_cents: i64,
    pub tax_rate_bps: u32,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
    pub sent_at: Option<bson::DateTime>,
    pub paid_at: Option<bson::DateTime>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl From<&Invoice> for InvoiceDocument {
    fn from(i: &Invoice) -> Self {
        Self {
            id: i.id.clone(),
            number: i.number.clone(),
            client_id: i.client_id.clone(),
            status: i.status,
            issue_date: date_string(i.issue_date),
            due_date: date_string(i.due_date),
            period_start: date_string(i.period_start),
            period_end: date_string(i.period_end),
            line_items: i.line_items.clone(),
            subtotal_cents: i.subtotal_cents,
            tax_rate_bps: i.tax_rate_bps,
            tax_cents: i.tax_cents,
            total_cents: i.total_cents,
            currency: i.currency.clone(),
            notes: i.notes.clone(),
            sent_at: bson_date_opt(i.sent_at),
            paid_at: bson_date_opt(i.paid_at),
            created_at: bson_date(i.created_at),
            updated_at: bson_date(i.updated_at),
        }
    }
}

impl TryFrom<InvoiceDocument> for Invoice {
    type Error = TimeChatError;

    fn try_from(d: InvoiceDocument) -> Result<Self> {
        Ok(Invoice {
            id: d.id,
            number: d.number,
            client_id: d.client_id,
            status: d.status,
            issue_date: parse_date(&d.issue_date)?,
            due_date: parse_date(&d.due_date)?,
            period_start: parse_date(&d.period_start)?,
            period_end: parse_date(&d.period_end)?,
            line_items: d.line_items,
            subtotal_cents: d.subtotal_cents,
            tax_rate_bps: d.tax_rate_bps,
            tax_cents: d.tax_cents,
            total_cents: d.total_cents,
            currency: d.currency,
            notes: d.notes,
            sent_at: d.sent_at.map(chrono_date),
            paid_at: d.paid_at.map(chrono_date),
            created_at: chrono_date(d.created_at),
            updated_at: chrono_date(d.updated_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CounterDocument {
    #[serde(rename = "_id")]
    pub name: String,
    pub value: i64,
}

pub struct MongoInvoiceRepository {
    invoices: Collection<InvoiceDocument>,
    counters: Collection<CounterDocument>,
}

impl MongoInvoiceRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            invoices: database.collection("invoices"),
            counters: database.collection("counters"),
        }
    }
}

#[async_trait]
impl InvoiceRepository for MongoInvoiceRepository {
    async fn create(&self, invoice: &Invoice) -> Result<()> {
        self.invoices
            .insert_one(InvoiceDocument::from(invoice), None)
            .await
            .map_err(|e| {
                if crate::shared::errors::is_duplicate_key(&e) {
                    TimeChatError::conflict("invoice", format!("Invoice number {} already used", invoice.number))
                } else {
                    TimeChatError::from(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Invoice>> {
        self.invoices
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(Invoice::try_from)
            .transpose()
    }

    async fn list(&self, status: Option<InvoiceStatus>, client_id: Option<String>) -> Result<Vec<Invoice>> {
        let mut filter = Document::new();
        if let Some(status) = status {
            filter.insert("status", status.as_str());
        }
        if let Some(client_id) = client_id {
            filter.insert("client_id", client_id);
        }
        let options = FindOptions::builder().sort(doc! {"number": -1}).build();
        collect(self.invoices.find(filter, options).await?).await
    }

    async fn update(&self, invoice: &Invoice) -> Result<()> {
        let result = self
            .invoices
            .replace_one(doc! {"_id": &invoice.id}, InvoiceDocument::from(invoice), None)
            .await?;
        if result.matched_count == 0 {
            return Err(TimeChatError::not_found(format!("Invoice with id: {}", invoice.id)));
        }
        Ok(())
    }

    async fn next_sequence(&self, counter: &str) -> Result<i64> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .counters
            .find_one_and_update(doc! {"_id": counter}, doc! {"$inc": {"value": 1_i64}}, options)
            .await?
            .ok_or_else(|| TimeChatError::internal(format!("Counter {} was not returned", counter)))?;
        Ok(updated.value)
    }
}
