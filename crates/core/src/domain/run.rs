use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::task::{Task, TaskStatus};

/// Timestamp-derived run identifier, `YYYYMMDD-HHMMSS-mmm-xxxx`.
///
/// Lexical order equals start order; the hex suffix keeps two runs started
/// in the same millisecond apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(started_at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}",
            started_at.format("%Y%m%d-%H%M%S-%3f"),
            &suffix[..4]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Overall outcome of a run: counts, not a single pass/fail bit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn from_tasks(tasks: &[Task], cancelled: bool) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        Self {
            total: tasks.len(),
            succeeded: count(TaskStatus::Succeeded),
            failed: count(TaskStatus::Failed),
            skipped: count(TaskStatus::Skipped),
            cancelled,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tasks: {} succeeded, {} failed, {} skipped",
            self.total, self.succeeded, self.failed, self.skipped
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// What the operator sees once a run is over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub roles: Vec<String>,
    pub summary: RunSummary,
    pub tasks: Vec<Task>,
}
