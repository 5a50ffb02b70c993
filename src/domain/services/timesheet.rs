use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::entities::TimeEntry;
use crate::domain::repositories::{TimeEntryFilter, TimeEntryRepository};
use crate::domain::services::catalog::CatalogService;
use crate::domain::services::rbac::capabilities;
use crate::domain::services::TokenClaims;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub project_id: String,
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub is_billable: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct TimeEntryUpdate {
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_billable: Option<bool>,
}

/// Query-string filters as a caller sends them
#[derive(Debug, Clone, Default)]
pub struct TimeEntryQuery {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub billable: Option<bool>,
    pub uninvoiced: bool,
}

#[derive(Clone)]
pub struct TimesheetService {
    entries: Arc<dyn TimeEntryRepository>,
    catalog: CatalogService,
}

impl TimesheetService {
    pub fn new(entries: Arc<dyn TimeEntryRepository>, catalog: CatalogService) -> Self {
        Self { entries, catalog }
    }

    pub async fn create_entry(&self, claims: &TokenClaims, input: NewTimeEntry) -> Result<TimeEntry> {
        if input.ended_at <= input.started_at {
            return Err(TimeChatError::validation("ended_at", "Must be after started_at"));
        }
        let (project, _) = self.catalog.trackable_project(&input.project_id).await?;

        let mut entry = TimeEntry::completed(
            claims.sub.clone(),
            project.id.clone(),
            input.started_at,
            input.ended_at,
        );
        entry.description = input.description;
        entry.is_billable = input.is_billable.unwrap_or(project.is_billable);

        self.entries.create(&entry).await?;
        Ok(entry)
    }

    pub async fn start_timer(
        &self,
        claims: &TokenClaims,
        project_id: &str,
        description: Option<String>,
    ) -> Result<TimeEntry> {
        if let Some(running) = self.entries.find_running_for_user(&claims.sub).await? {
            return Err(TimeChatError::conflict(
                "time_entry",
                format!("Timer already running: {}", running.id),
            ));
        }
        let (project, _) = self.catalog.trackable_project(project_id).await?;

        let mut entry = TimeEntry::start(claims.sub.clone(), project.id.clone(), crate::shared::utils::now());
        entry.description = description;
        entry.is_billable = project.is_billable;

        self.entries.create(&entry).await?;
        info!(user_id = %claims.sub, entry_id = %entry.id, "Timer started");
        Ok(entry)
    }

    pub async fn stop_timer(&self, claims: &TokenClaims) -> Result<TimeEntry> {
        let mut entry = self
            .entries
            .find_running_for_user(&claims.sub)
            .await?
            .ok_or_else(|| TimeChatError::not_found("Running timer"))?;

        entry.stop(crate::shared::utils::now());
        self.entries.update(&entry).await?;
        info!(
            user_id = %claims.sub,
            entry_id = %entry.id,
            minutes = entry.duration_minutes,
            "Timer stopped"
        );
        Ok(entry)
    }

    pub async fn get_entry(&self, claims: &TokenClaims, id: &str) -> Result<TimeEntry> {
        let entry = self
            .entries
            .find_by_id(id)
            .await?
            .filter(|e| e.deleted_at.is_none())
            .ok_or_else(|| TimeChatError::not_found(format!("Time entry with ID: {}", id)))?;

        if entry.user_id != claims.sub && !claims.capability_set().allows(capabilities::TIME_ENTRIES_READ_ALL) {
            return Err(TimeChatError::not_found(format!("Time entry with ID: {}", id)));
        }
        Ok(entry)
    }

    /// Callers without `time_entries:read_all` only ever see their own entries
    pub async fn list_entries(&self, claims: &TokenClaims, query: TimeEntryQuery) -> Result<Vec<TimeEntry>> {
        let user_id = if claims.capability_set().allows(capabilities::TIME_ENTRIES_READ_ALL) {
            query.user_id
        } else {
            Some(claims.sub.clone())
        };

        let filter = TimeEntryFilter {
            user_id,
            project_ids: query.project_id.map(|p| vec![p]),
            from: query.from,
            to: query.to,
            billable: query.billable,
            uninvoiced_only: query.uninvoiced,
            completed_only: false,
        };
        self.entries.list(&filter).await
    }

    pub async fn update_entry(&self, claims: &TokenClaims, id: &str, update: TimeEntryUpdate) -> Result<TimeEntry> {
        let mut entry = self.editable_entry(claims, id).await?;

        if let Some(project_id) = update.project_id {
            let (project, _) = self.catalog.trackable_project(&project_id).await?;
            entry.project_id = project.id;
        }
        if let Some(description) = update.description {
            entry.description = Some(description);
        }
        if let Some(billable) = update.is_billable {
            entry.is_billable = billable;
        }
        if let Some(started_at) = update.started_at {
            entry.started_at = started_at;
        }
        let ended_at = update.ended_at.or(entry.ended_at);
        if let Some(ended_at) = ended_at {
            if ended_at <= entry.started_at {
                return Err(TimeChatError::validation("ended_at", "Must be after started_at"));
            }
            entry.stop(ended_at);
        }
        entry.updated_at = crate::shared::utils::now();

        self.entries.update(&entry).await?;
        Ok(entry)
    }

    pub async fn delete_entry(&self, claims: &TokenClaims, id: &str) -> Result<()> {
        let mut entry = self.editable_entry(claims, id).await?;
        let now = crate::shared::utils::now();
        entry.deleted_at = Some(now);
        entry.updated_at = now;
        self.entries.update(&entry).await
    }

    async fn editable_entry(&self, claims: &TokenClaims, id: &str) -> Result<TimeEntry> {
        let entry = self.get_entry(claims, id).await?;
        if entry.user_id != claims.sub {
            claims.capability_set().require(capabilities::TIME_ENTRIES_READ_ALL)?;
        }
        if entry.is_invoiced() {
            return Err(TimeChatError::conflict(
                "time_entry",
                "Entry is on an invoice and cannot be changed",
            ));
        }
        Ok(entry)
    }
}
