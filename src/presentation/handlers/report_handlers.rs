use axum::{extract::Query, response::Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::services::rbac::capabilities;
use crate::domain::services::reporting::{GroupBy, TimeSummary};
use crate::presentation::middleware::TenantContext;
use crate::shared::Result;

#[derive(Debug, Deserialize)]
pub struct TimeSummaryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub group_by: Option<String>,
}

pub async fn time_summary(
    ctx: TenantContext,
    Query(query): Query<TimeSummaryQuery>,
) -> Result<Json<TimeSummary>> {
    ctx.user.require(capabilities::REPORTS_READ)?;

    let group_by = match query.group_by.as_deref() {
        Some(raw) => raw.parse::<GroupBy>()?,
        None => GroupBy::Project,
    };
    let summary = ctx
        .handle
        .reports()
        .time_summary(query.from, query.to, group_by)
        .await?;
    Ok(Json(summary))
}
