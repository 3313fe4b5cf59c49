use crate::{
    domain::{relocate_task, Board, ProjectId, SectionId, TaskId},
    error::{HlaviError, Result},
    storage::PersistenceGateway,
};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::RwLock;

/// A call received by the in-memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ReorderSection {
        section_id: SectionId,
        order: u32,
    },
    MoveTask {
        task_id: TaskId,
        section_id: SectionId,
        order: u32,
        project_id: ProjectId,
    },
    FetchBoard {
        project_id: ProjectId,
    },
}

/// In-process store with failure injection, for embedding and tests
#[derive(Default)]
pub struct MemoryStorage {
    boards: RwLock<HashMap<ProjectId, Board>>,
    calls: Mutex<Vec<GatewayCall>>,
    failing_sections: Mutex<HashSet<SectionId>>,
    fail_moves: AtomicBool,
    fail_fetches: AtomicBool,
    writes_in_flight: AtomicUsize,
    max_writes_in_flight: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding one board
    pub async fn with_board(board: Board) -> Self {
        let storage = Self::new();
        storage.save_board(board).await;
        storage
    }

    pub async fn save_board(&self, mut board: Board) {
        board.normalize();
        self.boards
            .write()
            .await
            .insert(board.project_id.clone(), board);
    }

    /// Every call received so far, in arrival order
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Makes `reorder_section` fail for this section
    pub fn fail_section(&self, section_id: SectionId) {
        self.failing_sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(section_id);
    }

    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Highest number of write calls that were running at the same time
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_writes_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: GatewayCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn section_fails(&self, section_id: &SectionId) -> bool {
        self.failing_sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(section_id)
    }

    async fn enter_write(&self) {
        let now = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writes_in_flight.fetch_max(now, Ordering::SeqCst);
        // Give sibling calls a chance to start before this one finishes.
        tokio::task::yield_now().await;
    }

    fn leave_write(&self) {
        self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStorage {
    async fn reorder_section(&self, section_id: &SectionId, order: u32) -> Result<()> {
        self.record(GatewayCall::ReorderSection {
            section_id: section_id.clone(),
            order,
        });
        self.enter_write().await;

        let result: Result<()> = if self.section_fails(section_id) {
            Err(anyhow!("injected failure reordering section {}", section_id).into())
        } else {
            let mut boards = self.boards.write().await;
            boards
                .values_mut()
                .find_map(|board| board.section_mut(section_id))
                .map(|section| section.order = order)
                .ok_or_else(|| HlaviError::SectionNotFound(section_id.to_string()))
        };

        self.leave_write();
        result
    }

    async fn move_task(
        &self,
        task_id: &TaskId,
        section_id: &SectionId,
        order: u32,
        project_id: &ProjectId,
    ) -> Result<()> {
        self.record(GatewayCall::MoveTask {
            task_id: task_id.clone(),
            section_id: section_id.clone(),
            order,
            project_id: project_id.clone(),
        });
        self.enter_write().await;

        let result: Result<()> = if self.fail_moves.load(Ordering::SeqCst) {
            Err(anyhow!("injected failure moving task {}", task_id).into())
        } else {
            let mut boards = self.boards.write().await;
            match boards.get_mut(project_id) {
                Some(board) => {
                    relocate_task(board, task_id, section_id, order as usize).map(drop)
                }
                None => Err(HlaviError::BoardNotInitialized(project_id.to_string())),
            }
        };

        self.leave_write();
        result
    }

    async fn fetch_board(&self, project_id: &ProjectId) -> Result<Board> {
        self.record(GatewayCall::FetchBoard {
            project_id: project_id.clone(),
        });

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(anyhow!("injected failure fetching board {}", project_id).into());
        }

        let boards = self.boards.read().await;
        let mut board = boards
            .get(project_id)
            .cloned()
            .ok_or_else(|| HlaviError::BoardNotInitialized(project_id.to_string()))?;
        board.normalize();
        Ok(board)
    }
}
