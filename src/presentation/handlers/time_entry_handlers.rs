use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::domain::entities::TimeEntry;
use crate::domain::services::rbac::capabilities;
use crate::domain::services::timesheet::{NewTimeEntry, TimeEntryQuery, TimeEntryUpdate};
use crate::presentation::middleware::TenantContext;
use crate::shared::Result;

#[derive(Debug, Deserialize)]
pub struct ListTimeEntriesQuery {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub billable: Option<bool>,
    #[serde(default)]
    pub uninvoiced: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTimeEntryRequest {
    #[validate(length(min = 1, message = "Project is required"))]
    pub project_id: String,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub is_billable: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartTimerRequest {
    #[validate(length(min = 1, message = "Project is required"))]
    pub project_id: String,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTimeEntryRequest {
    pub project_id: Option<String>,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_billable: Option<bool>,
}

pub async fn list_time_entries(
    ctx: TenantContext,
    Query(query): Query<ListTimeEntriesQuery>,
) -> Result<Json<Vec<TimeEntry>>> {
    ctx.user.require(capabilities::TIME_ENTRIES_READ)?;

    let entries = ctx
        .handle
        .timesheet()
        .list_entries(
            ctx.user.claims(),
            TimeEntryQuery {
                user_id: query.user_id,
                project_id: query.project_id,
                from: query.from,
                to: query.to,
                billable: query.billable,
                uninvoiced: query.uninvoiced,
            },
        )
        .await?;
    Ok(Json(entries))
}

pub async fn create_time_entry(
    ctx: TenantContext,
    JsonExtractor(request): JsonExtractor<CreateTimeEntryRequest>,
) -> Result<(StatusCode, Json<TimeEntry>)> {
    ctx.user.require(capabilities::TIME_ENTRIES_WRITE)?;
    request.validate()?;

    let entry = ctx
        .handle
        .timesheet()
        .create_entry(
            ctx.user.claims(),
            NewTimeEntry {
                project_id: request.project_id,
                description: request.description,
                started_at: request.started_at,
                ended_at: request.ended_at,
                is_billable: request.is_billable,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn start_timer(
    ctx: TenantContext,
    JsonExtractor(request): JsonExtractor<StartTimerRequest>,
) -> Result<(StatusCode, Json<TimeEntry>)> {
    ctx.user.require(capabilities::TIME_ENTRIES_WRITE)?;
    request.validate()?;

    let entry = ctx
        .handle
        .timesheet()
        .start_timer(ctx.user.claims(), &request.project_id, request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn stop_timer(ctx: TenantContext) -> Result<Json<TimeEntry>> {
    ctx.user.require(capabilities::TIME_ENTRIES_WRITE)?;
    Ok(Json(ctx.handle.timesheet().stop_timer(ctx.user.claims()).await?))
}

pub async fn get_time_entry(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<TimeEntry>> {
    ctx.user.require(capabilities::TIME_ENTRIES_READ)?;
    Ok(Json(ctx.handle.timesheet().get_entry(ctx.user.claims(), &id).await?))
}

pub async fn update_time_entry(
    ctx: TenantContext,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateTimeEntryRequest>,
) -> Result<Json<TimeEntry>> {
    ctx.user.require(capabilities::TIME_ENTRIES_WRITE)?;
    request.validate()?;

    let entry = ctx
        .handle
        .timesheet()
        .update_entry(
            ctx.user.claims(),
            &id,
            TimeEntryUpdate {
                project_id: request.project_id,
                description: request.description,
                started_at: request.started_at,
                ended_at: request.ended_at,
                is_billable: request.is_billable,
            },
        )
        .await?;
    Ok(Json(entry))
}

pub async fn delete_time_entry(ctx: TenantContext, Path(id): Path<String>) -> Result<StatusCode> {
    ctx.user.require(capabilities::TIME_ENTRIES_WRITE)?;
    ctx.handle.timesheet().delete_entry(ctx.user.claims(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
