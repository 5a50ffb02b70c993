use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::domain::entities::{Bill, BillStatus};
use crate::domain::repositories::BillRepository;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone)]
pub struct NewBill {
    pub vendor: String,
    pub bill_number: Option<String>,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct BillUpdate {
    pub vendor: Option<String>,
    pub bill_number: Option<String>,
    pub description: Option<String>,
    pub amount_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

fn validate_amount(amount_cents: i64) -> Result<i64> {
    if amount_cents <= 0 {
        return Err(TimeChatError::validation("amount_cents", "Must be positive"));
    }
    Ok(amount_cents)
}

/// Accounts payable for one tenant
#[derive(Clone)]
pub struct BillService {
    bills: Arc<dyn BillRepository>,
}

impl BillService {
    pub fn new(bills: Arc<dyn BillRepository>) -> Self {
        Self { bills }
    }

    pub async fn create(&self, input: NewBill) -> Result<Bill> {
        let vendor = input.vendor.trim();
        if vendor.is_empty() {
            return Err(TimeChatError::validation("vendor", "Vendor is required"));
        }
        if input.due_date < input.issue_date {
            return Err(TimeChatError::validation("due_date", "Must not be before issue_date"));
        }

        let mut bill = Bill::new(
            vendor.to_string(),
            validate_amount(input.amount_cents)?,
            input.currency.unwrap_or_else(|| "USD".to_string()).to_uppercase(),
            input.issue_date,
            input.due_date,
        );
        bill.bill_number = input.bill_number;
        bill.description = input.description;

        self.bills.create(&bill).await?;
        info!(bill_id = %bill.id, vendor = %bill.vendor, "Bill recorded");
        Ok(bill)
    }

    pub async fn get(&self, id: &str) -> Result<Bill> {
        self.bills
            .find_by_id(id)
            .await?
            .filter(|b| b.deleted_at.is_none())
            .ok_or_else(|| TimeChatError::not_found(format!("Bill with ID: {}", id)))
    }

    pub async fn list(&self, status: Option<BillStatus>) -> Result<Vec<Bill>> {
        self.bills.list(status).await
    }

    pub async fn update(&self, id: &str, update: BillUpdate) -> Result<Bill> {
        let mut bill = self.open_bill(id).await?;

        if let Some(vendor) = update.vendor {
            let vendor = vendor.trim();
            if vendor.is_empty() {
                return Err(TimeChatError::validation("vendor", "Vendor is required"));
            }
            bill.vendor = vendor.to_string();
        }
        if let Some(number) = update.bill_number {
            bill.bill_number = Some(number);
        }
        if let Some(description) = update.description {
            bill.description = Some(description);
        }
        if let Some(amount) = update.amount_cents {
            bill.amount_cents = validate_amount(amount)?;
        }
        if let Some(due_date) = update.due_date {
            if due_date < bill.issue_date {
                return Err(TimeChatError::validation("due_date", "Must not be before issue_date"));
            }
            bill.due_date = due_date;
        }
        bill.updated_at = crate::shared::utils::now();

        self.bills.update(&bill).await?;
        Ok(bill)
    }

    pub async fn mark_paid(&self, id: &str) -> Result<Bill> {
        let mut bill = self.get(id).await?;
        if !bill.mark_paid() {
            return Err(TimeChatError::conflict(
                "bill",
                format!("Cannot pay a {} bill", bill.status.as_str()),
            ));
        }
        self.bills.update(&bill).await?;
        Ok(bill)
    }

    pub async fn void(&self, id: &str) -> Result<Bill> {
        let mut bill = self.get(id).await?;
        if !bill.void() {
            return Err(TimeChatError::conflict(
                "bill",
                format!("Cannot void a {} bill", bill.status.as_str()),
            ));
        }
        self.bills.update(&bill).await?;
        Ok(bill)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut bill = self.open_bill(id).await?;
        let now = crate::shared::utils::now();
        bill.deleted_at = Some(now);
        bill.updated_at = now;
        self.bills.update(&bill).await
    }

    async fn open_bill(&self, id: &str) -> Result<Bill> {
        let bill = self.get(id).await?;
        if bill.status != BillStatus::Open {
            return Err(TimeChatError::conflict("bill", "Only open bills can be changed"));
        }
        Ok(bill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockBillRepository;

    fn sample() -> Bill {
        Bill::new(
            "Hosting Co".into(),
            4_900,
            "USD".into(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn paying_twice_conflicts() {
        let mut paid = sample();
        paid.mark_paid();

        let mut bills = MockBillRepository::new();
        bills
            .expect_find_by_id()
            .returning(move |_| Ok(Some(paid.clone())));
        bills.expect_update().never();

        let service = BillService::new(Arc::new(bills));
        let err = service.mark_paid("b1").await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        let err = service.void("b1").await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn mark_paid_sets_timestamp() {
        let mut bills = MockBillRepository::new();
        bills.expect_find_by_id().returning(|_| Ok(Some(sample())));
        bills
            .expect_update()
            .withf(|b| b.status == BillStatus::Paid && b.paid_at.is_some())
            .times(1)
            .returning(|_| Ok(()));

        let service = BillService::new(Arc::new(bills));
        let bill = service.mark_paid("b1").await.unwrap();
        assert_eq!(bill.status, BillStatus::Paid);
    }

    #[tokio::test]
    async fn create_validates_dates_and_amount() {
        let mut bills = MockBillRepository::new();
        bills.expect_create().never();
        let service = BillService::new(Arc::new(bills));

        let input = NewBill {
            vendor: "Hosting Co".into(),
            bill_number: None,
            description: None,
            amount_cents: 0,
            currency: None,
            issue_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        };
        assert!(service.create(input.clone()).await.is_err());

        let backdated = NewBill {
            amount_cents: 100,
            due_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            ..input
        };
        assert!(service.create(backdated).await.is_err());
    }
}
