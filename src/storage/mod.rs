use crate::{
    domain::{Board, ProjectId, SectionId, TaskId},
    error::Result,
};
use async_trait::async_trait;

pub mod file_storage;
pub mod memory_storage;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

pub use file_storage::FileStorage;
pub use memory_storage::{GatewayCall, MemoryStorage};

#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteStorage;

/// Authoritative store the board reconciles against.
///
/// Writes are idempotent; repeating a call with the same arguments leaves
/// the store in the same state. Any `Err` is treated as a transport failure
/// and triggers a full reload of the board.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Sets the position of one section among its siblings
    async fn reorder_section(&self, section_id: &SectionId, order: u32) -> Result<()>;

    /// Places a task in `section_id` at index `order`
    async fn move_task(
        &self,
        task_id: &TaskId,
        section_id: &SectionId,
        order: u32,
        project_id: &ProjectId,
    ) -> Result<()>;

    /// Loads the whole board with sections and tasks grouped and ordered
    async fn fetch_board(&self, project_id: &ProjectId) -> Result<Board>;
}
