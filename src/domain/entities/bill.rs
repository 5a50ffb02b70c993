use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Open,
    Paid,
    Void,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Open => "open",
            BillStatus::Paid => "paid",
            BillStatus::Void => "void",
        }
    }
}

/// Vendor bill (accounts payable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    pub vendor: String,
    pub bill_number: Option<String>,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: BillStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Bill {
    pub fn new(
        vendor: String,
        amount_cents: i64,
        currency: String,
        issue_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            vendor,
            bill_number: None,
            description: None,
            amount_cents,
            currency,
            status: BillStatus::Open,
            issue_date,
            due_date,
            paid_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn mark_paid(&mut self) -> bool {
        if self.status != BillStatus::Open {
            return false;
        }
        let now = crate::shared::utils::now();
        self.status = BillStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        true
    }

    pub fn void(&mut self) -> bool {
        if self.status != BillStatus::Open {
            return false;
        }
        self.status = BillStatus::Void;
        self.updated_at = crate::shared::utils::now();
        true
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == BillStatus::Open && self.due_date < today
    }
}
