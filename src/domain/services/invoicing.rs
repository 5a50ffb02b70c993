use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::domain::entities::{Client, Invoice, InvoiceLineItem, InvoiceStatus, Project, Tenant, TimeEntry};
use crate::domain::repositories::{
    ClientRepository, InvoiceRepository, ProjectFilter, ProjectRepository, TimeEntryFilter,
    TimeEntryRepository,
};
use crate::domain::services::audit::{Actor, AuditLog};
use crate::shared::utils::div_round_half_up;
use crate::shared::{Result, TimeChatError};

pub const INVOICE_COUNTER: &str = "invoice";
const MAX_TAX_RATE_BPS: u32 = 10_000;

pub fn format_invoice_number(prefix: &str, sequence: i64) -> String {
    format!("{}-{:06}", prefix, sequence)
}

/// `minutes * rate_per_hour / 60`, half-up to the cent
pub fn line_amount_cents(minutes: i64, rate_cents: i64) -> i64 {
    div_round_half_up(minutes * rate_cents, 60)
}

pub fn tax_cents(subtotal_cents: i64, tax_rate_bps: u32) -> i64 {
    div_round_half_up(subtotal_cents * tax_rate_bps as i64, 10_000)
}

/// One line item per project, in project-id order so output is stable
pub fn build_line_items(entries: &[TimeEntry], projects: &[Project], client: &Client) -> Vec<InvoiceLineItem> {
    let mut grouped: BTreeMap<&str, (i64, Vec<String>)> = BTreeMap::new();
    for entry in entries {
        let slot = grouped.entry(entry.project_id.as_str()).or_default();
        slot.0 += entry.duration_minutes;
        slot.1.push(entry.id.clone());
    }

    grouped
        .into_iter()
        .filter_map(|(project_id, (minutes, entry_ids))| {
            let project = projects.iter().find(|p| p.id == project_id)?;
            let rate = project.effective_rate_cents(client);
            Some(InvoiceLineItem {
                project_id: project.id.clone(),
                description: project.name.clone(),
                quantity_minutes: minutes,
                rate_cents: rate,
                amount_cents: line_amount_cents(minutes, rate),
                time_entry_ids: entry_ids,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

pub fn compute_totals(items: &[InvoiceLineItem], tax_rate_bps: u32) -> InvoiceTotals {
    let subtotal_cents: i64 = items.iter().map(|i| i.amount_cents).sum();
    let tax = tax_cents(subtotal_cents, tax_rate_bps);
    InvoiceTotals {
        subtotal_cents,
        tax_cents: tax,
        total_cents: subtotal_cents + tax,
    }
}

#[derive(Debug, Clone)]
pub struct GenerateInvoice {
    pub client_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub tax_rate_bps: Option<u32>,
    pub due_in_days: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct InvoiceService {
    invoices: Arc<dyn InvoiceRepository>,
    entries: Arc<dyn TimeEntryRepository>,
    clients: Arc<dyn ClientRepository>,
    projects: Arc<dyn ProjectRepository>,
    audit: AuditLog,
}

impl InvoiceService {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        entries: Arc<dyn TimeEntryRepository>,
        clients: Arc<dyn ClientRepository>,
        projects: Arc<dyn ProjectRepository>,
        audit: AuditLog,
    ) -> Self {
        Self {
            invoices,
            entries,
            clients,
            projects,
            audit,
        }
    }

    pub async fn next_invoice_number(&self, prefix: &str) -> Result<String> {
        let sequence = self.invoices.next_sequence(INVOICE_COUNTER).await?;
        Ok(format_invoice_number(prefix, sequence))
    }

    pub async fn generate(&self, actor: &Actor, tenant: &Tenant, request: GenerateInvoice) -> Result<Invoice> {
        if request.period_end < request.period_start {
            return Err(TimeChatError::validation("period_end", "Must not be before period_start"));
        }
        let tax_rate_bps = request.tax_rate_bps.unwrap_or(tenant.default_tax_rate_bps);
        if tax_rate_bps > MAX_TAX_RATE_BPS {
            return Err(TimeChatError::validation("tax_rate_bps", "Must be at most 10000"));
        }

        let client = self
            .clients
            .find_by_id(&request.client_id)
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| TimeChatError::not_found(format!("Client with ID: {}", request.client_id)))?;

        let projects = self
            .projects
            .list(&ProjectFilter {
                client_id: Some(client.id.clone()),
                include_inactive: true,
            })
            .await?;
        if projects.is_empty() {
            return Err(TimeChatError::validation("client_id", "No billable time in period"));
        }

        // Period end is inclusive; entries must start before the following midnight.
        let from = Utc.from_utc_datetime(&request.period_start.and_time(NaiveTime::MIN));
        let to = Utc.from_utc_datetime(&(request.period_end + Duration::days(1)).and_time(NaiveTime::MIN));
        let entries = self
            .entries
            .list(&TimeEntryFilter {
                user_id: None,
                project_ids: Some(projects.iter().map(|p| p.id.clone()).collect()),
                from: Some(from),
                to: Some(to),
                billable: Some(true),
                uninvoiced_only: true,
                completed_only: true,
            })
            .await?;

        let line_items = build_line_items(&entries, &projects, &client);
        if line_items.is_empty() {
            return Err(TimeChatError::validation("client_id", "No billable time in period"));
        }
        let totals = compute_totals(&line_items, tax_rate_bps);

        // Claim the entries before anything is persisted; a concurrent run that
        // already claimed some of them wins and this one backs out.
        let invoice_id = crate::shared::utils::generate_id();
        let entry_ids: Vec<String> = line_items
            .iter()
            .flat_map(|item| item.time_entry_ids.iter().cloned())
            .collect();
        let marked = self.entries.assign_invoice(&entry_ids, &invoice_id).await?;
        if marked != entry_ids.len() as u64 {
            self.entries.release_invoice(&invoice_id).await?;
            warn!(
                client_id = %client.id,
                expected = entry_ids.len(),
                marked,
                "Time entries were invoiced concurrently"
            );
            return Err(TimeChatError::conflict(
                "invoice",
                "Some time entries were invoiced concurrently; retry",
            ));
        }

        let now = crate::shared::utils::now();
        let issue_date = now.date_naive();
        let due_in_days = request.due_in_days.unwrap_or(tenant.payment_terms_days);
        let number = match self.next_invoice_number(&tenant.invoice_prefix).await {
            Ok(number) => number,
            Err(e) => {
                self.entries.release_invoice(&invoice_id).await?;
                return Err(e);
            }
        };
        let invoice = Invoice {
            id: invoice_id,
            number,
            client_id: client.id.clone(),
            status: InvoiceStatus::Draft,
            issue_date,
            due_date: issue_date + Duration::days(due_in_days as i64),
            period_start: request.period_start,
            period_end: request.period_end,
            line_items,
            subtotal_cents: totals.subtotal_cents,
            tax_rate_bps,
            tax_cents: totals.tax_cents,
            total_cents: totals.total_cents,
            currency: client.currency.clone(),
            notes: request.notes,
            sent_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.invoices.create(&invoice).await {
            self.entries.release_invoice(&invoice.id).await?;
            return Err(e);
        }

        metrics::counter!("invoices_generated_total").increment(1);
        info!(
            invoice_id = %invoice.id,
            number = %invoice.number,
            entries = marked,
            total_cents = invoice.total_cents,
            "Invoice generated"
        );
        self.audit
            .record(
                actor
                    .entry("invoice.generated", "invoice")
                    .resource(&invoice.id)
                    .metadata(json!({ "number": invoice.number, "total_cents": invoice.total_cents })),
            )
            .await;

        Ok(invoice)
    }

    pub async fn get(&self, id: &str) -> Result<Invoice> {
        self.invoices
            .find_by_id(id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("Invoice with ID: {}", id)))
    }

    pub async fn list(&self, status: Option<InvoiceStatus>, client_id: Option<String>) -> Result<Vec<Invoice>> {
        self.invoices.list(status, client_id).await
    }

    pub async fn transition(&self, actor: &Actor, id: &str, next: InvoiceStatus) -> Result<Invoice> {
        let mut invoice = self.get(id).await?;
        if !invoice.status.can_transition_to(next) {
            return Err(TimeChatError::conflict(
                "invoice",
                format!(
                    "Cannot change invoice from {} to {}",
                    invoice.status.as_str(),
                    next.as_str()
                ),
            ));
        }

        let now = crate::shared::utils::now();
        let previous = invoice.status;
        invoice.status = next;
        invoice.updated_at = now;
        match next {
            InvoiceStatus::Sent => invoice.sent_at = Some(now),
            InvoiceStatus::Paid => invoice.paid_at = Some(now),
            _ => {}
        }
        self.invoices.update(&invoice).await?;

        if next == InvoiceStatus::Void {
            let released = self.entries.release_invoice(&invoice.id).await?;
            info!(invoice_id = %invoice.id, released, "Invoice voided");
        }

        self.audit
            .record(
                actor
                    .entry("invoice.status_changed", "invoice")
                    .resource(&invoice.id)
                    .metadata(json!({ "from": previous.as_str(), "to": next.as_str() })),
            )
            .await;

        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{
        MockAuditRepository, MockClientRepository, MockInvoiceRepository, MockProjectRepository,
        MockTimeEntryRepository,
    };
    use chrono::TimeZone;

    fn entry(project: &str, minutes: i64) -> TimeEntry {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        TimeEntry::completed("u1".into(), project.into(), start, start + Duration::minutes(minutes))
    }

    fn project(id: &str, client: &Client, rate: Option<i64>) -> Project {
        let mut project = Project::new(client.id.clone(), format!("Project {}", id), true);
        project.id = id.into();
        project.hourly_rate_cents = rate;
        project
    }

    fn tenant() -> Tenant {
        Tenant::new("Acme".into(), "acme".into(), "tenant_acme".into(), "ACME".into(), 825, 14)
    }

    fn audit_ok() -> AuditLog {
        let mut audit = MockAuditRepository::new();
        audit.expect_record().returning(|_| Ok(()));
        AuditLog::new(Arc::new(audit))
    }

    #[test]
    fn invoice_numbers_are_zero_padded() {
        assert_eq!(format_invoice_number("INV", 42), "INV-000042");
        assert_eq!(format_invoice_number("ACME", 1_234_567), "ACME-1234567");
    }

    #[test]
    fn amounts_round_half_up() {
        // 50 minutes at $1.00/h = 83.33 cents
        assert_eq!(line_amount_cents(50, 100), 83);
        // 1 minute at $0.30/h = 0.5 cents
        assert_eq!(line_amount_cents(1, 30), 1);
        assert_eq!(tax_cents(10_001, 825), 825);
        assert_eq!(tax_cents(0, 825), 0);
    }

    #[test]
    fn line_items_group_by_project_and_sum_to_subtotal() {
        let client = Client::new("Acme".into(), None, 9_000, "USD".into());
        let projects = vec![project("a", &client, None), project("b", &client, Some(15_000))];
        let entries = vec![entry("a", 50), entry("b", 20), entry("a", 37), entry("b", 1)];

        let items = build_line_items(&entries, &projects, &client);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].project_id, "a");
        assert_eq!(items[0].quantity_minutes, 87);
        assert_eq!(items[0].rate_cents, 9_000);
        assert_eq!(items[0].amount_cents, 13_050);
        assert_eq!(items[0].time_entry_ids.len(), 2);
        assert_eq!(items[1].rate_cents, 15_000);
        assert_eq!(items[1].amount_cents, 5_250);

        let totals = compute_totals(&items, 825);
        assert_eq!(
            totals.subtotal_cents,
            items.iter().map(|i| i.amount_cents).sum::<i64>()
        );
        assert_eq!(totals.total_cents, totals.subtotal_cents + totals.tax_cents);
        assert_eq!(totals.tax_cents, 1_510);
    }

    #[tokio::test]
    async fn generate_numbers_invoice_and_marks_entries() {
        let client = Client::new("Acme".into(), None, 6_000, "EUR".into());
        let client_id = client.id.clone();
        let projects = vec![project("a", &client, None)];
        let entries = vec![entry("a", 30), entry("a", 90)];
        let entry_ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();

        let mut clients = MockClientRepository::new();
        clients
            .expect_find_by_id()
            .returning(move |_| Ok(Some(client.clone())));
        let mut project_repo = MockProjectRepository::new();
        project_repo
            .expect_list()
            .returning(move |_| Ok(projects.clone()));
        let mut entry_repo = MockTimeEntryRepository::new();
        entry_repo
            .expect_list()
            .withf(|f| f.uninvoiced_only && f.completed_only && f.billable == Some(true))
            .returning(move |_| Ok(entries.clone()));
        entry_repo
            .expect_assign_invoice()
            .withf(move |ids, _| ids == entry_ids.as_slice())
            .times(1)
            .returning(|ids, _| Ok(ids.len() as u64));
        let mut invoices = MockInvoiceRepository::new();
        invoices
            .expect_next_sequence()
            .withf(|name| name == INVOICE_COUNTER)
            .returning(|_| Ok(7));
        invoices.expect_create().times(1).returning(|_| Ok(()));

        let service = InvoiceService::new(
            Arc::new(invoices),
            Arc::new(entry_repo),
            Arc::new(clients),
            Arc::new(project_repo),
            audit_ok(),
        );
        let invoice = service
            .generate(
                &Actor::system(),
                &tenant(),
                GenerateInvoice {
                    client_id,
                    period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                    tax_rate_bps: None,
                    due_in_days: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(invoice.number, "ACME-000007");
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.currency, "EUR");
        assert_eq!(invoice.subtotal_cents, 12_000);
        assert_eq!(invoice.tax_rate_bps, 825);
        assert_eq!(invoice.tax_cents, 990);
        assert_eq!(invoice.total_cents, 12_990);
        assert_eq!(invoice.due_date - invoice.issue_date, Duration::days(14));
    }

    #[tokio::test]
    async fn entries_claimed_concurrently_abort_generation() {
        let client = Client::new("Acme".into(), None, 6_000, "EUR".into());
        let client_id = client.id.clone();
        let projects = vec![project("a", &client, None)];
        let entries = vec![entry("a", 30), entry("a", 90)];

        let mut clients = MockClientRepository::new();
        clients
            .expect_find_by_id()
            .returning(move |_| Ok(Some(client.clone())));
        let mut project_repo = MockProjectRepository::new();
        project_repo
            .expect_list()
            .returning(move |_| Ok(projects.clone()));
        let mut entry_repo = MockTimeEntryRepository::new();
        entry_repo
            .expect_list()
            .returning(move |_| Ok(entries.clone()));
        // Another run already billed one of the two entries.
        entry_repo
            .expect_assign_invoice()
            .times(1)
            .returning(|_, _| Ok(1));
        entry_repo
            .expect_release_invoice()
            .times(1)
            .returning(|_| Ok(1));
        let mut invoices = MockInvoiceRepository::new();
        invoices.expect_next_sequence().never();
        invoices.expect_create().never();

        let service = InvoiceService::new(
            Arc::new(invoices),
            Arc::new(entry_repo),
            Arc::new(clients),
            Arc::new(project_repo),
            audit_ok(),
        );
        let err = service
            .generate(
                &Actor::system(),
                &tenant(),
                GenerateInvoice {
                    client_id,
                    period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                    tax_rate_bps: None,
                    due_in_days: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failed_invoice_insert_releases_entries() {
        let client = Client::new("Acme".into(), None, 6_000, "EUR".into());
        let client_id = client.id.clone();
        let projects = vec![project("a", &client, None)];
        let entries = vec![entry("a", 45)];

        let mut clients = MockClientRepository::new();
        clients
            .expect_find_by_id()
            .returning(move |_| Ok(Some(client.clone())));
        let mut project_repo = MockProjectRepository::new();
        project_repo
            .expect_list()
            .returning(move |_| Ok(projects.clone()));
        let mut entry_repo = MockTimeEntryRepository::new();
        entry_repo
            .expect_list()
            .returning(move |_| Ok(entries.clone()));
        entry_repo
            .expect_assign_invoice()
            .returning(|ids, _| Ok(ids.len() as u64));
        entry_repo
            .expect_release_invoice()
            .times(1)
            .returning(|_| Ok(1));
        let mut invoices = MockInvoiceRepository::new();
        invoices.expect_next_sequence().returning(|_| Ok(8));
        invoices.expect_create().returning(|_| {
            Err(TimeChatError::Database {
                message: "write failed".into(),
            })
        });

        let service = InvoiceService::new(
            Arc::new(invoices),
            Arc::new(entry_repo),
            Arc::new(clients),
            Arc::new(project_repo),
            audit_ok(),
        );
        let err = service
            .generate(
                &Actor::system(),
                &tenant(),
                GenerateInvoice {
                    client_id,
                    period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                    tax_rate_bps: None,
                    due_in_days: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn generate_without_entries_is_rejected() {
        let client = Client::new("Acme".into(), None, 6_000, "USD".into());
        let client_id = client.id.clone();
        let projects = vec![project("a", &client, None)];

        let mut clients = MockClientRepository::new();
        clients
            .expect_find_by_id()
            .returning(move |_| Ok(Some(client.clone())));
        let mut project_repo = MockProjectRepository::new();
        project_repo
            .expect_list()
            .returning(move |_| Ok(projects.clone()));
        let mut entry_repo = MockTimeEntryRepository::new();
        entry_repo.expect_list().returning(|_| Ok(vec![]));
        let mut invoices = MockInvoiceRepository::new();
        invoices.expect_next_sequence().never();
        invoices.expect_create().never();

        let service = InvoiceService::new(
            Arc::new(invoices),
            Arc::new(entry_repo),
            Arc::new(clients),
            Arc::new(project_repo),
            audit_ok(),
        );
        let err = service
            .generate(
                &Actor::system(),
                &tenant(),
                GenerateInvoice {
                    client_id,
                    period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                    tax_rate_bps: None,
                    due_in_days: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    fn draft_invoice() -> Invoice {
        let now = Utc::now();
        Invoice {
            id: "inv-1".into(),
            number: "INV-000001".into(),
            client_id: "c1".into(),
            status: InvoiceStatus::Draft,
            issue_date: now.date_naive(),
            due_date: now.date_naive(),
            period_start: now.date_naive(),
            period_end: now.date_naive(),
            line_items: vec![],
            subtotal_cents: 0,
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: 0,
            currency: "USD".into(),
            notes: None,
            sent_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn voiding_releases_entries_and_paid_is_final() {
        let mut invoices = MockInvoiceRepository::new();
        invoices
            .expect_find_by_id()
            .returning(|_| Ok(Some(draft_invoice())));
        invoices.expect_update().returning(|_| Ok(()));
        let mut entries = MockTimeEntryRepository::new();
        entries
            .expect_release_invoice()
            .withf(|id| id == "inv-1")
            .times(1)
            .returning(|_| Ok(3));

        let service = InvoiceService::new(
            Arc::new(invoices),
            Arc::new(entries),
            Arc::new(MockClientRepository::new()),
            Arc::new(MockProjectRepository::new()),
            audit_ok(),
        );

        let voided = service
            .transition(&Actor::system(), "inv-1", InvoiceStatus::Void)
            .await
            .unwrap();
        assert_eq!(voided.status, InvoiceStatus::Void);

        let err = service
            .transition(&Actor::system(), "inv-1", InvoiceStatus::Paid)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }
}
