use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::domain::entities::{Invoice, InvoiceStatus};
use crate::domain::services::invoicing::GenerateInvoice;
use crate::domain::services::rbac::capabilities;
use crate::presentation::middleware::TenantContext;
use crate::shared::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateInvoiceRequest {
    #[validate(length(min = 1, message = "Client is required"))]
    pub client_id: String,
    pub period_start: NaiveDate,
    /// Inclusive
    pub period_end: NaiveDate,
    #[validate(range(max = 10000, message = "Tax rate must be at most 10000 bps"))]
    pub tax_rate_bps: Option<u32>,
    #[validate(range(max = 365, message = "Due days must be at most 365"))]
    pub due_in_days: Option<u32>,
    #[validate(length(max = 2000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceStatusRequest {
    pub status: InvoiceStatus,
}

pub async fn list_invoices(
    State(app_state): State<Arc<AppState>>,
    ctx: TenantContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>> {
    ctx.user.require(capabilities::INVOICES_READ)?;

    let invoices = ctx
        .handle
        .invoicing(app_state.audit.clone())
        .list(query.status, query.client_id)
        .await?;
    Ok(Json(invoices))
}

pub async fn generate_invoice(
    State(app_state): State<Arc<AppState>>,
    ctx: TenantContext,
    JsonExtractor(request): JsonExtractor<GenerateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>)> {
    ctx.user.require(capabilities::INVOICES_WRITE)?;
    request.validate()?;

    let invoice = ctx
        .handle
        .invoicing(app_state.audit.clone())
        .generate(
            &ctx.actor(),
            ctx.tenant(),
            GenerateInvoice {
                client_id: request.client_id,
                period_start: request.period_start,
                period_end: request.period_end,
                tax_rate_bps: request.tax_rate_bps,
                due_in_days: request.due_in_days,
                notes: request.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice(
    State(app_state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<String>,
) -> Result<Json<Invoice>> {
    ctx.user.require(capabilities::INVOICES_READ)?;
    Ok(Json(ctx.handle.invoicing(app_state.audit.clone()).get(&id).await?))
}

/// Moves an invoice along draft -> sent -> paid, or voids it
pub async fn update_invoice_status(
    State(app_state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateInvoiceStatusRequest>,
) -> Result<Json<Invoice>> {
    ctx.user.require(capabilities::INVOICES_WRITE)?;

    let invoice = ctx
        .handle
        .invoicing(app_state.audit.clone())
        .transition(&ctx.actor(), &id, request.status)
        .await?;
    Ok(Json(invoice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_request_uses_lowercase_names() {
        let request: UpdateInvoiceStatusRequest = serde_json::from_str(r#"{"status":"void"}"#).unwrap();
        assert_eq!(request.status, InvoiceStatus::Void);
        assert!(serde_json::from_str::<UpdateInvoiceStatusRequest>(r#"{"status":"Paid"}"#).is_err());
    }

    #[test]
    fn period_dates_parse_as_calendar_days() {
        let request: GenerateInvoiceRequest = serde_json::from_str(
            r#"{"client_id":"c1","period_start":"2024-03-01","period_end":"2024-03-31"}"#,
        )
        .unwrap();
        assert_eq!(request.period_end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert!(request.validate().is_ok());
    }
}
