use crate::domain::{Board, Reordered};
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// The board as currently shown. Only the reconciler replaces it.
#[derive(Debug)]
pub struct BoardState {
    board: RwLock<Board>,
    revision: AtomicU64,
}

impl BoardState {
    pub fn new(board: Board) -> Self {
        Self {
            board: RwLock::new(board),
            revision: AtomicU64::new(0),
        }
    }

    /// Copy of the current board
    pub async fn snapshot(&self) -> Board {
        self.board.read().await.clone()
    }

    /// Runs `f` against the current board without cloning it
    pub async fn with<R>(&self, f: impl FnOnce(&Board) -> R) -> R {
        f(&*self.board.read().await)
    }

    /// Swaps in a whole new board, returning the new revision
    pub(crate) async fn replace(&self, board: Board) -> u64 {
        let mut current = self.board.write().await;
        *current = board;
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Computes the next board from the current one and swaps it in under a
    /// single write lock, so no reload can land between the two. Nothing is
    /// written when `f` fails or reports no change.
    pub(crate) async fn update(
        &self,
        f: impl FnOnce(&Board) -> Result<Reordered>,
    ) -> Result<(Reordered, u64)> {
        let mut current = self.board.write().await;
        let reordered = f(&*current)?;
        if reordered.change.is_unchanged() {
            return Ok((reordered, self.revision()));
        }
        *current = reordered.board.clone();
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((reordered, revision))
    }

    /// Bumped on every replacement; last applied wins.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}
