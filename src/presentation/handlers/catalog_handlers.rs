use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use serde::Deserialize;
use validator::Validate;

use crate::domain::entities::{Client, Project};
use crate::domain::repositories::ProjectFilter;
use crate::domain::services::catalog::{ClientUpdate, NewClient, NewProject, ProjectUpdate};
use crate::domain::services::rbac::capabilities;
use crate::presentation::middleware::TenantContext;
use crate::shared::Result;

#[derive(Debug, Deserialize)]
pub struct ListClientsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub client_id: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(range(min = 0, message = "Rate must not be negative"))]
    pub hourly_rate_cents: i64,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(range(min = 0, message = "Rate must not be negative"))]
    pub hourly_rate_cents: Option<i64>,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, message = "Client is required"))]
    pub client_id: String,
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
    #[serde(default = "default_billable")]
    pub is_billable: bool,
    #[validate(range(min = 0, message = "Rate must not be negative"))]
    pub hourly_rate_cents: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
    pub is_billable: Option<bool>,
    #[validate(range(min = 0, message = "Rate must not be negative"))]
    pub hourly_rate_cents: Option<i64>,
}

fn default_billable() -> bool {
    true
}

pub async fn list_clients(
    ctx: TenantContext,
    Query(query): Query<ListClientsQuery>,
) -> Result<Json<Vec<Client>>> {
    ctx.user.require(capabilities::CLIENTS_READ)?;
    Ok(Json(ctx.handle.catalog().list_clients(query.include_inactive).await?))
}

pub async fn create_client(
    ctx: TenantContext,
    JsonExtractor(request): JsonExtractor<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>)> {
    ctx.user.require(capabilities::CLIENTS_WRITE)?;
    request.validate()?;

    let client = ctx
        .handle
        .catalog()
        .create_client(NewClient {
            name: request.name,
            email: request.email,
            hourly_rate_cents: request.hourly_rate_cents,
            currency: request.currency,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Client>> {
    ctx.user.require(capabilities::CLIENTS_READ)?;
    Ok(Json(ctx.handle.catalog().get_client(&id).await?))
}

pub async fn update_client(
    ctx: TenantContext,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateClientRequest>,
) -> Result<Json<Client>> {
    ctx.user.require(capabilities::CLIENTS_WRITE)?;
    request.validate()?;

    let client = ctx
        .handle
        .catalog()
        .update_client(
            &id,
            ClientUpdate {
                name: request.name,
                email: request.email,
                hourly_rate_cents: request.hourly_rate_cents,
                currency: request.currency,
            },
        )
        .await?;
    Ok(Json(client))
}

pub async fn deactivate_client(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Client>> {
    ctx.user.require(capabilities::CLIENTS_WRITE)?;
    Ok(Json(ctx.handle.catalog().deactivate_client(&id).await?))
}

pub async fn list_projects(
    ctx: TenantContext,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Json<Vec<Project>>> {
    ctx.user.require(capabilities::PROJECTS_READ)?;

    let filter = ProjectFilter {
        client_id: query.client_id,
        include_inactive: query.include_inactive,
    };
    Ok(Json(ctx.handle.catalog().list_projects(&filter).await?))
}

pub async fn create_project(
    ctx: TenantContext,
    JsonExtractor(request): JsonExtractor<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>)> {
    ctx.user.require(capabilities::PROJECTS_WRITE)?;
    request.validate()?;

    let project = ctx
        .handle
        .catalog()
        .create_project(NewProject {
            client_id: request.client_id,
            name: request.name,
            description: request.description,
            is_billable: request.is_billable,
            hourly_rate_cents: request.hourly_rate_cents,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Project>> {
    ctx.user.require(capabilities::PROJECTS_READ)?;
    Ok(Json(ctx.handle.catalog().get_project(&id).await?))
}

pub async fn update_project(
    ctx: TenantContext,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<UpdateProjectRequest>,
) -> Result<Json<Project>> {
    ctx.user.require(capabilities::PROJECTS_WRITE)?;
    request.validate()?;

    let project = ctx
        .handle
        .catalog()
        .update_project(
            &id,
            ProjectUpdate {
                name: request.name,
                description: request.description,
                is_billable: request.is_billable,
                hourly_rate_cents: request.hourly_rate_cents,
            },
        )
        .await?;
    Ok(Json(project))
}

pub async fn deactivate_project(ctx: TenantContext, Path(id): Path<String>) -> Result<Json<Project>> {
    ctx.user.require(capabilities::PROJECTS_WRITE)?;
    Ok(Json(ctx.handle.catalog().deactivate_project(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_default_to_billable() {
        let request: CreateProjectRequest =
            serde_json::from_str(r#"{"client_id":"c1","name":"Website"}"#).unwrap();
        assert!(request.is_billable);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn negative_rates_are_rejected() {
        let request: CreateClientRequest =
            serde_json::from_str(r#"{"name":"Acme","hourly_rate_cents":-1}"#).unwrap();
        assert!(request.validate().is_err());
    }
}
