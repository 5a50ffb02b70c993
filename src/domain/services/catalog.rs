use std::sync::Arc;

use tracing::info;

use crate::domain::entities::{Client, Project};
use crate::domain::repositories::{ClientRepository, ProjectFilter, ProjectRepository};
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub hourly_rate_cents: i64,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub hourly_rate_cents: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub client_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_billable: bool,
    pub hourly_rate_cents: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_billable: Option<bool>,
    pub hourly_rate_cents: Option<i64>,
}

pub const DEFAULT_CURRENCY: &str = "USD";

fn validate_name(field: &str, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(TimeChatError::validation(field, "Must be 1-200 characters"));
    }
    Ok(name.to_string())
}

fn validate_rate(rate: i64) -> Result<i64> {
    if rate < 0 {
        return Err(TimeChatError::validation("hourly_rate_cents", "Must not be negative"));
    }
    Ok(rate)
}

fn validate_currency(currency: &str) -> Result<String> {
    let currency = currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(TimeChatError::validation("currency", "Must be a 3-letter ISO code"));
    }
    Ok(currency)
}

/// Clients and their projects inside one tenant database
#[derive(Clone)]
pub struct CatalogService {
    clients: Arc<dyn ClientRepository>,
    projects: Arc<dyn ProjectRepository>,
}

impl CatalogService {
    pub fn new(clients: Arc<dyn ClientRepository>, projects: Arc<dyn ProjectRepository>) -> Self {
        Self { clients, projects }
    }

    pub async fn create_client(&self, input: NewClient) -> Result<Client> {
        let currency = validate_currency(input.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))?;
        let client = Client::new(
            validate_name("name", &input.name)?,
            input.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()),
            validate_rate(input.hourly_rate_cents)?,
            currency,
        );
        self.clients.create(&client).await?;
        info!(client_id = %client.id, "Client created");
        Ok(client)
    }

    /// Soft-deleted clients are only visible by id
    pub async fn get_client(&self, id: &str) -> Result<Client> {
        self.clients
            .find_by_id(id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("Client with ID: {}", id)))
    }

    pub async fn list_clients(&self, include_inactive: bool) -> Result<Vec<Client>> {
        self.clients.list(include_inactive).await
    }

    pub async fn update_client(&self, id: &str, update: ClientUpdate) -> Result<Client> {
        let mut client = self.get_client(id).await?;
        if client.is_deleted() {
            return Err(TimeChatError::conflict("client", "Client has been deactivated"));
        }

        if let Some(name) = update.name {
            client.name = validate_name("name", &name)?;
        }
        if let Some(email) = update.email {
            let email = email.trim().to_lowercase();
            client.email = (!email.is_empty()).then_some(email);
        }
        if let Some(rate) = update.hourly_rate_cents {
            client.hourly_rate_cents = validate_rate(rate)?;
        }
        if let Some(currency) = update.currency {
            client.currency = validate_currency(&currency)?;
        }
        client.updated_at = crate::shared::utils::now();

        self.clients.update(&client).await?;
        Ok(client)
    }

    pub async fn deactivate_client(&self, id: &str) -> Result<Client> {
        let mut client = self.get_client(id).await?;
        if !client.is_deleted() {
            client.deactivate();
            self.clients.update(&client).await?;
            info!(client_id = %client.id, "Client deactivated");
        }
        Ok(client)
    }

    pub async fn create_project(&self, input: NewProject) -> Result<Project> {
        let client = self.active_client(&input.client_id).await?;

        let mut project = Project::new(client.id, validate_name("name", &input.name)?, input.is_billable);
        project.description = input.description;
        project.hourly_rate_cents = input.hourly_rate_cents.map(validate_rate).transpose()?;

        self.projects.create(&project).await?;
        info!(project_id = %project.id, client_id = %project.client_id, "Project created");
        Ok(project)
    }

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        self.projects
            .find_by_id(id)
            .await?
            .ok_or_else(|| TimeChatError::not_found(format!("Project with ID: {}", id)))
    }

    pub async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        self.projects.list(filter).await
    }

    pub async fn update_project(&self, id: &str, update: ProjectUpdate) -> Result<Project> {
        let mut project = self.get_project(id).await?;
        if project.deleted_at.is_some() {
            return Err(TimeChatError::conflict("project", "Project has been deactivated"));
        }

        if let Some(name) = update.name {
            project.name = validate_name("name", &name)?;
        }
        if let Some(description) = update.description {
            project.description = Some(description);
        }
        if let Some(billable) = update.is_billable {
            project.is_billable = billable;
        }
        if let Some(rate) = update.hourly_rate_cents {
            project.hourly_rate_cents = Some(validate_rate(rate)?);
        }
        project.updated_at = crate::shared::utils::now();

        self.projects.update(&project).await?;
        Ok(project)
    }

    pub async fn deactivate_project(&self, id: &str) -> Result<Project> {
        let mut project = self.get_project(id).await?;
        if project.deleted_at.is_none() {
            project.deactivate();
            self.projects.update(&project).await?;
        }
        Ok(project)
    }

    /// Active project plus its client, for time tracking against it
    pub async fn trackable_project(&self, project_id: &str) -> Result<(Project, Client)> {
        let project = self.get_project(project_id).await?;
        if !project.is_active || project.deleted_at.is_some() {
            return Err(TimeChatError::not_found(format!("Project with ID: {}", project_id)));
        }
        let client = self.active_client(&project.client_id).await?;
        Ok((project, client))
    }

    async fn active_client(&self, id: &str) -> Result<Client> {
        self.clients
            .find_by_id(id)
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| TimeChatError::not_found(format!("Client with ID: {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{MockClientRepository, MockProjectRepository};
    use std::sync::Mutex;

    /// Client repository over a Vec, filtering the way the Mongo one does
    #[derive(Default)]
    struct InMemoryClients {
        rows: Mutex<Vec<Client>>,
    }

    #[async_trait::async_trait]
    impl ClientRepository for InMemoryClients {
        async fn create(&self, client: &Client) -> Result<()> {
            self.rows.lock().unwrap().push(client.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Client>> {
            Ok(self.rows.lock().unwrap().iter().find(|c| c.id == id).cloned())
        }

        async fn list(&self, include_inactive: bool) -> Result<Vec<Client>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|c| include_inactive || !c.is_deleted())
                .cloned()
                .collect())
        }

        async fn update(&self, client: &Client) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|c| c.id == client.id) {
                *row = client.clone();
            }
            Ok(())
        }
    }

    fn new_client(name: &str) -> NewClient {
        NewClient {
            name: name.into(),
            email: Some(" Billing@Acme.test ".into()),
            hourly_rate_cents: 12_000,
            currency: None,
        }
    }

    #[tokio::test]
    async fn deactivated_client_leaves_default_listing() {
        let service = CatalogService::new(
            Arc::new(InMemoryClients::default()),
            Arc::new(MockProjectRepository::new()),
        );

        let acme = service.create_client(new_client("Acme")).await.unwrap();
        service.create_client(new_client("Globex")).await.unwrap();
        assert_eq!(acme.email.as_deref(), Some("billing@acme.test"));
        assert_eq!(acme.currency, "USD");

        let deactivated = service.deactivate_client(&acme.id).await.unwrap();
        assert!(!deactivated.is_active);
        assert!(deactivated.deleted_at.is_some());

        let visible = service.list_clients(false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Globex");

        let all = service.list_clients(true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn project_requires_live_client() {
        let mut deleted = Client::new("Gone".into(), None, 100, "USD".into());
        deleted.deactivate();
        let deleted_id = deleted.id.clone();

        let mut clients = MockClientRepository::new();
        clients
            .expect_find_by_id()
            .returning(move |_| Ok(Some(deleted.clone())));
        let mut projects = MockProjectRepository::new();
        projects.expect_create().never();

        let service = CatalogService::new(Arc::new(clients), Arc::new(projects));
        let err = service
            .create_project(NewProject {
                client_id: deleted_id,
                name: "Website".into(),
                description: None,
                is_billable: true,
                hourly_rate_cents: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_client_input_is_rejected() {
        let service = CatalogService::new(
            Arc::new(InMemoryClients::default()),
            Arc::new(MockProjectRepository::new()),
        );

        let mut input = new_client("  ");
        assert!(service.create_client(input.clone()).await.is_err());

        input = new_client("Acme");
        input.hourly_rate_cents = -1;
        assert!(service.create_client(input.clone()).await.is_err());

        input = new_client("Acme");
        input.currency = Some("dollars".into());
        assert!(service.create_client(input).await.is_err());
    }
}
