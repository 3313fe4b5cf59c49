use crate::{
    domain::{Board, ProjectId, Section, SectionId, Task, TaskId},
    error::{HlaviError, Result},
    storage::PersistenceGateway,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sections (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    name        TEXT NOT NULL,
    position    INTEGER NOT NULL,
    is_default  INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    section_id  TEXT NOT NULL REFERENCES sections(id),
    title       TEXT NOT NULL,
    position    INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_section ON tasks(section_id, position);
";

/// SQLite-backed store for boards
pub struct SqliteStorage {
    connection: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `database_path`
    pub fn new(database_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(database_path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    // Every call runs to completion under the lock with no await inside.
    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut connection)
    }

    /// Replaces everything stored for the board's project
    pub fn save_board(&self, board: &Board) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM tasks \
                 WHERE section_id IN (SELECT id FROM sections WHERE project_id = ?1)",
                params![board.project_id.as_str()],
            )?;
            tx.execute(
                "DELETE FROM sections WHERE project_id = ?1",
                params![board.project_id.as_str()],
            )?;
            for section in &board.sections {
                tx.execute(
                    "INSERT INTO sections (id, project_id, name, position, is_default) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        section.id.as_str(),
                        board.project_id.as_str(),
                        section.name,
                        section.order,
                        section.is_default
                    ],
                )?;
                for task in &section.tasks {
                    // Unsaved tasks have nowhere to live yet.
                    let Some(task_id) = &task.id else { continue };
                    tx.execute(
                        "INSERT INTO tasks (id, section_id, title, position, created_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            task_id.as_str(),
                            section.id.as_str(),
                            task.title,
                            task.order,
                            task.created_at.to_rfc3339()
                        ],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn section_task_ids(conn: &Connection, section_id: &str) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT id FROM tasks WHERE section_id = ?1 ORDER BY position, id")?;
        let ids = stmt
            .query_map(params![section_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn write_positions(conn: &Connection, section_id: &str, ids: &[String]) -> Result<()> {
        for (position, id) in ids.iter().enumerate() {
            conn.execute(
                "UPDATE tasks SET section_id = ?1, position = ?2 WHERE id = ?3",
                params![section_id, position as i64, id],
            )?;
        }
        Ok(())
    }

    fn load_board(conn: &Connection, project_id: &ProjectId) -> Result<Board> {
        let mut section_stmt = conn.prepare(
            "SELECT id, name, position, is_default FROM sections \
             WHERE project_id = ?1 ORDER BY position, id",
        )?;
        let sections = section_stmt
            .query_map(params![project_id.as_str()], |row| {
                Ok(Section {
                    id: SectionId::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    order: row.get(2)?,
                    is_default: row.get(3)?,
                    tasks: Vec::new(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if sections.is_empty() {
            return Err(HlaviError::BoardNotInitialized(project_id.to_string()));
        }

        let mut task_stmt = conn.prepare(
            "SELECT id, title, position, created_at FROM tasks \
             WHERE section_id = ?1 ORDER BY position, id",
        )?;
        let mut board = Board::new(project_id.clone());
        for mut section in sections {
            section.tasks = task_stmt
                .query_map(params![section.id.as_str()], |row| {
                    let created_at: String = row.get(3)?;
                    Ok(Task {
                        id: Some(TaskId::new(row.get::<_, String>(0)?)),
                        title: row.get(1)?,
                        order: row.get(2)?,
                        section_id: section.id.clone(),
                        created_at: DateTime::parse_from_rfc3339(&created_at)
                            .map(|dt| dt.with_timezone(&Utc))
                            .map_err(|err| {
                                rusqlite::Error::FromSqlConversionFailure(
                                    3,
                                    Type::Text,
                                    Box::new(err),
                                )
                            })?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            board.sections.push(section);
        }

        board.normalize();
        Ok(board)
    }
}

#[async_trait]
impl PersistenceGateway for SqliteStorage {
    async fn reorder_section(&self, section_id: &SectionId, order: u32) -> Result<()> {
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE sections SET position = ?1 WHERE id = ?2",
                params![order, section_id.as_str()],
            )?;
            if updated == 0 {
                return Err(HlaviError::SectionNotFound(section_id.to_string()));
            }
            Ok(())
        })
    }

    async fn move_task(
        &self,
        task_id: &TaskId,
        section_id: &SectionId,
        order: u32,
        project_id: &ProjectId,
    ) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;

            let target_exists = tx
                .query_row(
                    "SELECT 1 FROM sections WHERE id = ?1 AND project_id = ?2",
                    params![section_id.as_str(), project_id.as_str()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !target_exists {
                return Err(HlaviError::SectionNotFound(section_id.to_string()));
            }

            let source: String = tx
                .query_row(
                    "SELECT section_id FROM tasks WHERE id = ?1",
                    params![task_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| HlaviError::TaskNotFound(task_id.to_string()))?;

            let mut source_ids = Self::section_task_ids(&tx, &source)?;
            source_ids.retain(|id| id != task_id.as_str());

            let mut target_ids = if source == section_id.as_str() {
                source_ids.clone()
            } else {
                Self::section_task_ids(&tx, section_id.as_str())?
            };
            let index = (order as usize).min(target_ids.len());
            target_ids.insert(index, task_id.as_str().to_string());

            if source != section_id.as_str() {
                Self::write_positions(&tx, &source, &source_ids)?;
            }
            Self::write_positions(&tx, section_id.as_str(), &target_ids)?;

            tx.commit()?;
            Ok(())
        })
    }

    async fn fetch_board(&self, project_id: &ProjectId) -> Result<Board> {
        self.with_connection(|conn| Self::load_board(conn, project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::tests::sample_board;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_fetch() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.save_board(&sample_board()).unwrap();

        let board = storage.fetch_board(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(board.sections.len(), 2);
        assert_eq!(board.sections[0].tasks.len(), 2);
        assert!(board.sections[0].is_default);
        assert!(board.is_dense());
    }

    #[tokio::test]
    async fn test_move_task_across_sections() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.save_board(&sample_board()).unwrap();
        let project = ProjectId::new("p1");

        storage
            .move_task(&TaskId::new("t1"), &SectionId::new("B"), 0, &project)
            .await
            .unwrap();

        let board = storage.fetch_board(&project).await.unwrap();
        assert_eq!(board.sections[0].tasks[0].id, Some(TaskId::new("t2")));
        assert_eq!(board.sections[0].tasks[0].order, 0);
        assert_eq!(board.sections[1].tasks[0].id, Some(TaskId::new("t1")));
    }

    #[tokio::test]
    async fn test_move_task_within_section() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.save_board(&sample_board()).unwrap();
        let project = ProjectId::new("p1");

        storage
            .move_task(&TaskId::new("t2"), &SectionId::new("A"), 0, &project)
            .await
            .unwrap();

        let board = storage.fetch_board(&project).await.unwrap();
        let ids: Vec<_> = board.sections[0]
            .tasks
            .iter()
            .filter_map(|t| t.id.as_ref().map(|id| id.as_str().to_string()))
            .collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[tokio::test]
    async fn test_unreadable_timestamp_is_an_error() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.save_board(&sample_board()).unwrap();
        storage
            .with_connection(|conn| {
                conn.execute(
                    "UPDATE tasks SET created_at = 'yesterday' WHERE id = 't2'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let err = storage
            .fetch_board(&ProjectId::new("p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, HlaviError::SqliteError(_)));
    }

    #[tokio::test]
    async fn test_reorder_section_persists_to_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("board.db");
        {
            let storage = SqliteStorage::new(&path).unwrap();
            storage.save_board(&sample_board()).unwrap();
            storage
                .reorder_section(&SectionId::new("B"), 0)
                .await
                .unwrap();
            storage
                .reorder_section(&SectionId::new("A"), 1)
                .await
                .unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        let board = storage.fetch_board(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(board.sections[0].id, SectionId::new("B"));

        let err = storage
            .reorder_section(&SectionId::new("Z"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, HlaviError::SectionNotFound(_)));
    }
}
