use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::{Client, Project, TimeEntry};
use crate::domain::repositories::{
    ClientRepository, ProjectFilter, ProjectRepository, TimeEntryFilter, TimeEntryRepository,
};
use crate::domain::services::invoicing::line_amount_cents;
use crate::shared::{Result, TimeChatError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Project,
    User,
    Client,
}

impl FromStr for GroupBy {
    type Err = TimeChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "project" => Ok(GroupBy::Project),
            "user" => Ok(GroupBy::User),
            "client" => Ok(GroupBy::Client),
            _ => Err(TimeChatError::validation(
                "group_by",
                "Must be one of project, user, client",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSummaryRow {
    pub key: String,
    pub label: String,
    pub total_minutes: i64,
    pub billable_minutes: i64,
    pub billable_amount_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeSummary {
    pub group_by: GroupBy,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub rows: Vec<TimeSummaryRow>,
    pub total_minutes: i64,
    pub billable_amount_cents: i64,
}

/// Folds completed entries into rows, largest total first (ties by key)
pub fn summarize(
    entries: &[TimeEntry],
    projects: &[Project],
    clients: &[Client],
    group_by: GroupBy,
) -> Vec<TimeSummaryRow> {
    let projects: HashMap<&str, &Project> = projects.iter().map(|p| (p.id.as_str(), p)).collect();
    let clients: HashMap<&str, &Client> = clients.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut rows: HashMap<String, TimeSummaryRow> = HashMap::new();

    for entry in entries.iter().filter(|e| !e.is_running()) {
        let project = projects.get(entry.project_id.as_str()).copied();
        let client = project.and_then(|p| clients.get(p.client_id.as_str()).copied());

        let (key, label) = match group_by {
            GroupBy::Project => (
                entry.project_id.clone(),
                project.map(|p| p.name.clone()).unwrap_or_else(|| entry.project_id.clone()),
            ),
            GroupBy::User => (entry.user_id.clone(), entry.user_id.clone()),
            GroupBy::Client => match (project, client) {
                (_, Some(c)) => (c.id.clone(), c.name.clone()),
                (Some(p), None) => (p.client_id.clone(), p.client_id.clone()),
                (None, None) => ("unknown".to_string(), "Unknown".to_string()),
            },
        };

        let row = rows.entry(key.clone()).or_insert_with(|| TimeSummaryRow {
            key,
            label,
            total_minutes: 0,
            billable_minutes: 0,
            billable_amount_cents: 0,
        });
        row.total_minutes += entry.duration_minutes;
        if entry.is_billable {
            row.billable_minutes += entry.duration_minutes;
            if let (Some(p), Some(c)) = (project, client) {
                row.billable_amount_cents += line_amount_cents(entry.duration_minutes, p.effective_rate_cents(c));
            }
        }
    }

    let mut rows: Vec<TimeSummaryRow> = rows.into_values().collect();
    rows.sort_by(|a, b| b.total_minutes.cmp(&a.total_minutes).then_with(|| a.key.cmp(&b.key)));
    rows
}

#[derive(Clone)]
pub struct ReportService {
    entries: Arc<dyn TimeEntryRepository>,
    projects: Arc<dyn ProjectRepository>,
    clients: Arc<dyn ClientRepository>,
}

impl ReportService {
    pub fn new(
        entries: Arc<dyn TimeEntryRepository>,
        projects: Arc<dyn ProjectRepository>,
        clients: Arc<dyn ClientRepository>,
    ) -> Self {
        Self {
            entries,
            projects,
            clients,
        }
    }

    pub async fn time_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        group_by: GroupBy,
    ) -> Result<TimeSummary> {
        if let (Some(from), Some(to)) = (from, to) {
            if to < from {
                return Err(TimeChatError::validation("to", "Must not be before from"));
            }
        }

        let entries = self
            .entries
            .list(&TimeEntryFilter {
                from,
                to,
                completed_only: true,
                ..Default::default()
            })
            .await?;
        let projects = self
            .projects
            .list(&ProjectFilter {
                client_id: None,
                include_inactive: true,
            })
            .await?;
        let clients = self.clients.list(true).await?;

        let rows = summarize(&entries, &projects, &clients, group_by);
        Ok(TimeSummary {
            group_by,
            from,
            to,
            total_minutes: rows.iter().map(|r| r.total_minutes).sum(),
            billable_amount_cents: rows.iter().map(|r| r.billable_amount_cents).sum(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(user: &str, project: &str, minutes: i64, billable: bool) -> TimeEntry {
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let mut e = TimeEntry::completed(user.into(), project.into(), start, start + Duration::minutes(minutes));
        e.is_billable = billable;
        e
    }

    fn fixtures() -> (Vec<Project>, Vec<Client>) {
        let mut acme = Client::new("Acme".into(), None, 6_000, "USD".into());
        acme.id = "c-acme".into();
        let mut globex = Client::new("Globex".into(), None, 12_000, "USD".into());
        globex.id = "c-globex".into();

        let mut site = Project::new(acme.id.clone(), "Site".into(), true);
        site.id = "p-site".into();
        let mut app = Project::new(acme.id.clone(), "App".into(), true);
        app.id = "p-app".into();
        let mut audit = Project::new(globex.id.clone(), "Audit".into(), true);
        audit.id = "p-audit".into();

        (vec![site, app, audit], vec![acme, globex])
    }

    #[test]
    fn groups_by_client_sorted_by_total() {
        let (projects, clients) = fixtures();
        let entries = vec![
            entry("u1", "p-site", 60, true),
            entry("u2", "p-app", 30, false),
            entry("u1", "p-audit", 120, true),
        ];

        let rows = summarize(&entries, &projects, &clients, GroupBy::Client);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "Globex");
        assert_eq!(rows[0].total_minutes, 120);
        assert_eq!(rows[0].billable_amount_cents, 24_000);
        assert_eq!(rows[1].label, "Acme");
        assert_eq!(rows[1].total_minutes, 90);
        assert_eq!(rows[1].billable_minutes, 60);
        assert_eq!(rows[1].billable_amount_cents, 6_000);
    }

    #[test]
    fn groups_by_user_and_skips_running_timers() {
        let (projects, clients) = fixtures();
        let mut running = TimeEntry::start("u3".into(), "p-site".into(), Utc::now());
        running.duration_minutes = 500;
        let entries = vec![
            entry("u1", "p-site", 15, true),
            entry("u2", "p-site", 45, true),
            entry("u1", "p-app", 45, true),
            running,
        ];

        let rows = summarize(&entries, &projects, &clients, GroupBy::User);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["u1", "u2"]);
        assert_eq!(rows[0].total_minutes, 60);
    }

    #[test]
    fn parses_group_by() {
        assert_eq!("project".parse::<GroupBy>().unwrap(), GroupBy::Project);
        assert!("team".parse::<GroupBy>().is_err());
    }
}
