use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn all() -> [TaskStatus; 6] {
        [
            Self::Pending,
            Self::Assigned,
            Self::Running,
            Self::Succeeded,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a task within one run (`T1`, `T2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn from_index(order_index: u32) -> Self {
        Self(format!("T{}", order_index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work derived from the SOW.
///
/// Status is only ever changed through the coordinator's validated
/// transitions; the remaining bookkeeping fields (`assigned_role`,
/// `attempts`, `failure_reason`) are filled in along the way so the operator
/// sees why a task ended where it did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub role_hint: Option<String>,
    pub order_index: u32,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub assigned_role: Option<String>,
    pub attempts: u32,
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(order_index: u32, title: impl Into<String>) -> Self {
        Self {
            id: TaskId::from_index(order_index),
            title: title.into(),
            description: String::new(),
            role_hint: None,
            order_index,
            status: TaskStatus::default(),
            result: None,
            assigned_role: None,
            attempts: 0,
            failure_reason: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_role_hint(mut self, hint: impl Into<String>) -> Self {
        self.role_hint = Some(hint.into());
        self
    }

    /// Title and description joined, the text the role resolver matches on.
    pub fn content(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.description)
        }
    }
}
