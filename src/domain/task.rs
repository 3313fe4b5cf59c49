use crate::domain::board::SectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Durable identifier for a task, assigned by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TaskId {
    type Err = crate::error::HlaviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(crate::error::HlaviError::Other(
                "Task id cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A card on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// `None` until the task has been persisted. Unsaved tasks are rendered
    /// but never draggable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    pub title: String,
    pub order: u32,
    pub section_id: SectionId,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates an unsaved task in the given section
    pub fn new(section_id: SectionId, title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            order: 0,
            section_id,
            created_at: Utc::now(),
        }
    }

    /// Creates a task that already has a durable id
    pub fn persisted(id: TaskId, section_id: SectionId, title: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            ..Self::new(section_id, title)
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Whether the task can take part in drag operations
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn has_id(&self, id: &TaskId) -> bool {
        self.id.as_ref() == Some(id)
    }
}
