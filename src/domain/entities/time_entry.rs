use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
    /// `None` while the timer is running
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub is_billable: bool,
    pub invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Whole minutes between two instants, rounded down, never below one
pub fn billable_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    (ended_at - started_at).num_minutes().max(1)
}

impl TimeEntry {
    pub fn start(user_id: String, project_id: String, started_at: DateTime<Utc>) -> Self {
        let now = crate::shared::utils::now();
        Self {
            id: crate::shared::utils::generate_id(),
            user_id,
            project_id,
            description: None,
            started_at,
            ended_at: None,
            duration_minutes: 0,
            is_billable: true,
            invoice_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn completed(
        user_id: String,
        project_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self::start(user_id, project_id, started_at);
        entry.stop(ended_at);
        entry
    }

    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn is_invoiced(&self) -> bool {
        self.invoice_id.is_some()
    }

    pub fn stop(&mut self, ended_at: DateTime<Utc>) {
        self.ended_at = Some(ended_at);
        self.duration_minutes = billable_minutes(self.started_at, ended_at);
        self.updated_at = crate::shared::utils::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn duration_rounds_down_with_one_minute_floor() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        assert_eq!(billable_minutes(start, start + Duration::seconds(20)), 1);
        assert_eq!(billable_minutes(start, start + Duration::seconds(119)), 1);
        assert_eq!(billable_minutes(start, start + Duration::minutes(90)), 90);
    }

    #[test]
    fn stopping_sets_duration() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let mut entry = TimeEntry::start("u".into(), "p".into(), start);
        assert!(entry.is_running());

        entry.stop(start + Duration::minutes(45));
        assert!(!entry.is_running());
        assert_eq!(entry.duration_minutes, 45);
    }
}
