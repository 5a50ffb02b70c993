use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::domain::entities::{Bill, BillStatus};
use crate::domain::services::payables::{BillUpdate, NewBill};
use crate::domain::services::rbac::capabilities;
use crate::presentation::middleware::TenantContext;
use crate::shared::Result;

#[derive(Debug, Deserialize)]
pub struct ListBillsQuery {
    pub status: Option<BillStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBillRequest {
    #[validate(length(min = 1, max = 200, message = "Vendor must be 1-200 characters"))]
    pub vendor: String,
    #[validate(length(max = 100, message = "Bill number is too long"))]
    pub bill_number: Option<String>,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount_cents: i64,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBillRequest {
    #[validate(length(min = 1, max = 200, message = "Vendor must be 1-200 characters"))]
    pub vendor: Option<String>,
    #[validate(length(max = 100, message = "Bill number is too long"))]
    pub bill_number: Option<String>,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

pub async fn list_bills(ctx: TenantContext, Query(query): Query<ListBillsQuery>) -> Result<Json<Vec<Bill>>> {
    ctx.user.require(capabilities::BILLS_READ)?;
    Ok(Json(ctx.handle.payables().list(query.status).await?))
}

pub async fn create_bill(
    ctx: TenantContext,
    JsonExtractor(request): JsonExtractor<CreateBillRequest>,
) -> Result<(StatusCode, Json<Bill>)> {
    ctx.user.require(capabilities::BILLS_WRITE)?;
    request.validate()?;

    let bill = ctx
        .handle
        .payables()
        .create(NewBill {
            vendor: request.vendor,
            bill_number: request.bill_number,
            description: request.description,
            amount_cents: request.amount_cents,
            currency: request.currency,
            issue_date: request.issue_date,
            due_date: request.due_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(bill)))
}

pub async fn get_bill(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Bill>> {
    ctx.user.require(capabilities::BILLS_READ)?;
    Ok(Json(ctx.handle.payables().get(&id).await?))
}

pub async fn update_bill(
    ctx: TenantContext,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateBillRequest>,
) -> Result<Json<Bill>> {
    ctx.user.require(capabilities::BILLS_WRITE)?;
    request.validate()?;

    let bill = ctx
        .handle
        .payables()
        .update(
            &id,
            BillUpdate {
                vendor: request.vendor,
                bill_number: request.bill_number,
                description: request.description,
                amount_cents: request.amount_cents,
                due_date: request.due_date,
            },
        )
        .await?;
    Ok(Json(bill))
}

pub async fn mark_bill_paid(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Bill>> {
    ctx.user.require(capabilities::BILLS_WRITE)?;
    Ok(Json(ctx.handle.payables().mark_paid(&id).await?))
}

pub async fn void_bill(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Bill>> {
    ctx.user.require(capabilities::BILLS_WRITE)?;
    Ok(Json(ctx.handle.payables().void(&id).await?))
}

pub async fn delete_bill(ctx: TenantContext, Path(id): Path<String>) -> Result<StatusCode> {
    ctx.user.require(capabilities::BILLS_WRITE)?;
    ctx.handle.payables().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
