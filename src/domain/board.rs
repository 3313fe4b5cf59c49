use crate::domain::task::{Task, TaskId};
use crate::domain::token::DragToken;
use crate::error::{HlaviError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Identifier of the project a board belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a board section (column)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, ordered column of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Section {
    pub fn new(id: SectionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            order: 0,
            is_default: false,
            tasks: Vec::new(),
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Appends a task, taking ownership of it and numbering it last
    pub fn with_task(mut self, mut task: Task) -> Self {
        task.section_id = self.id.clone();
        task.order = self.tasks.len() as u32;
        self.tasks.push(task);
        self
    }

    /// Index of a task within this section
    pub fn task_index(&self, task_id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.has_id(task_id))
    }

    /// Rewrites task `order` values to `0..m-1` in list order
    pub fn renumber_tasks(&mut self) {
        for (index, task) in self.tasks.iter_mut().enumerate() {
            task.order = index as u32;
            task.section_id = self.id.clone();
        }
    }

    fn tasks_dense(&self) -> bool {
        self.tasks
            .iter()
            .enumerate()
            .all(|(index, task)| task.order == index as u32)
    }
}

/// The ordered section/task tree for one project's board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub project_id: ProjectId,
    pub sections: Vec<Section>,
}

impl Board {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            sections: Vec::new(),
        }
    }

    /// Appends a section, numbering it last
    pub fn with_section(mut self, mut section: Section) -> Self {
        section.order = self.sections.len() as u32;
        section.renumber_tasks();
        self.sections.push(section);
        self
    }

    pub fn section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    pub fn section_mut(&mut self, id: &SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| &s.id == id)
    }

    pub fn section_index(&self, id: &SectionId) -> Option<usize> {
        self.sections.iter().position(|s| &s.id == id)
    }

    /// Finds a task, returning `(section index, task index)`
    pub fn locate_task(&self, task_id: &TaskId) -> Option<(usize, usize)> {
        self.sections.iter().enumerate().find_map(|(si, section)| {
            section.task_index(task_id).map(|ti| (si, ti))
        })
    }

    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.locate_task(task_id)
            .map(|(si, ti)| &self.sections[si].tasks[ti])
    }

    /// Flat list of every draggable item in render order: all sections
    /// first, then each persisted task section by section.
    pub fn draggable_tokens(&self) -> Vec<DragToken> {
        let sections = self
            .sections
            .iter()
            .map(|s| DragToken::Section {
                section_id: s.id.clone(),
            });

        let tasks = self.sections.iter().flat_map(|section| {
            section
                .tasks
                .iter()
                .enumerate()
                .filter_map(move |(index, task)| {
                    task.id.as_ref().map(|task_id| DragToken::Task {
                        section_id: section.id.clone(),
                        task_id: task_id.clone(),
                        index,
                    })
                })
        });

        sections.chain(tasks).collect()
    }

    /// Drop targets rendered inside sections that have no tasks
    pub fn placeholder_tokens(&self) -> Vec<DragToken> {
        self.sections
            .iter()
            .filter(|s| s.tasks.is_empty())
            .map(|s| DragToken::Placeholder {
                section_id: s.id.clone(),
            })
            .collect()
    }

    /// Rewrites section `order` values to `0..n-1` in list order
    pub fn renumber_sections(&mut self) {
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.order = index as u32;
        }
    }

    /// Sorts sections and tasks by their stored `order` (stable) and makes
    /// the numbering dense. Storage backends call this on read.
    pub fn normalize(&mut self) {
        self.sections.sort_by_key(|s| s.order);
        self.renumber_sections();
        for section in &mut self.sections {
            section.tasks.sort_by_key(|t| t.order);
            section.renumber_tasks();
        }
    }

    /// Checks the dense ordering invariant at both levels
    pub fn is_dense(&self) -> bool {
        self.sections
            .iter()
            .enumerate()
            .all(|(index, section)| section.order == index as u32 && section.tasks_dense())
    }

    /// Verifies every persisted task appears in exactly one section and
    /// points back at the section holding it.
    pub fn check_ownership(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for section in &self.sections {
            for task in &section.tasks {
                if task.section_id != section.id {
                    return Err(HlaviError::Other(format!(
                        "Task '{}' is listed under section {} but owned by {}",
                        task.title, section.id, task.section_id
                    )));
                }
                if let Some(id) = &task.id {
                    if !seen.insert(id.clone()) {
                        return Err(HlaviError::Other(format!(
                            "Task {} appears in more than one section",
                            id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn task_count(&self) -> usize {
        self.sections.iter().map(|s| s.tasks.len()).sum()
    }
}
