use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    /// draft -> sent -> paid; draft|sent -> void
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (InvoiceStatus::Draft, InvoiceStatus::Sent)
                | (InvoiceStatus::Sent, InvoiceStatus::Paid)
                | (InvoiceStatus::Draft, InvoiceStatus::Void)
                | (InvoiceStatus::Sent, InvoiceStatus::Void)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub project_id: String,
    pub description: String,
    pub quantity_minutes: i64,
    pub rate_cents: i64,
    pub amount_cents: i64,
    pub time_entry_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub number: String,
    pub client_id: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub line_items: Vec<InvoiceLineItem>,
    pub subtotal_cents: i64,
    pub tax_rate_bps: u32,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_transitions() {
        use InvoiceStatus::*;
        assert!(Draft.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Paid));
        assert!(Draft.can_transition_to(Void));
        assert!(Sent.can_transition_to(Void));

        assert!(!Draft.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Void));
        assert!(!Void.can_transition_to(Draft));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&InvoiceStatus::Paid).unwrap(),
            "\"paid\""
        );
    }
}
