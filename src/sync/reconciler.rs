//! Optimistic commit with reload-on-failure.
//!
//! A drop is applied to [`BoardState`] before the store hears about it. If
//! the store then rejects the change, the local board is thrown away and
//! refetched wholesale; there is no attempt to patch it back.

use crate::domain::{reorder, Board, BoardChange, DragSubject, DropTarget, ProjectId, SubjectKey};
use crate::error::{HlaviError, Result};
use crate::storage::PersistenceGateway;
use crate::sync::events::SyncEvent;
use crate::sync::locks::SubjectLocks;
use crate::sync::state::BoardState;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// How a persistence attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Nothing needed saving
    Skipped,
    Persisted,
    /// The store rejected the change; the board was reloaded from it
    RolledBack,
    /// The store rejected the change and the reload failed too
    ReloadFailed,
}

#[derive(Clone)]
pub struct Reconciler {
    project_id: ProjectId,
    gateway: Arc<dyn PersistenceGateway>,
    state: Arc<BoardState>,
    locks: Arc<SubjectLocks>,
    events: broadcast::Sender<SyncEvent>,
}

/// A change applied locally, with its persistence still to run
pub struct Commit {
    pub applied: Board,
    pub change: BoardChange,
    pub persist: PendingPersist,
}

impl Reconciler {
    pub fn new(
        project_id: ProjectId,
        gateway: Arc<dyn PersistenceGateway>,
        state: Arc<BoardState>,
        locks: Arc<SubjectLocks>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            project_id,
            gateway,
            state,
            locks,
            events,
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn state(&self) -> &Arc<BoardState> {
        &self.state
    }

    pub fn locks(&self) -> &Arc<SubjectLocks> {
        &self.locks
    }

    /// Applies a drop to the board right away and hands back the
    /// persistence step. A stale subject or target aborts the commit and
    /// reloads the board instead.
    pub async fn commit(&self, subject: &DragSubject, target: &DropTarget) -> Result<Commit> {
        let key = subject.key();
        if !self.locks.acquire(&key) {
            return Err(HlaviError::SubjectBusy(key.to_string()));
        }
        // From here on the lock is released when `persist` drops.
        let mut persist = PendingPersist {
            reconciler: self.clone(),
            key,
            change: BoardChange::Unchanged,
        };

        let update = self
            .state
            .update(|current| reorder(current, subject, target))
            .await;
        let reordered = match update {
            Ok((reordered, revision)) => {
                if !reordered.change.is_unchanged() {
                    info!(change = ?reordered.change, revision, "drop applied");
                    self.emit(SyncEvent::Committed {
                        change: reordered.change.clone(),
                    });
                }
                reordered
            }
            Err(err) if err.is_stale() => {
                warn!(%err, "drop refers to missing board items, reloading");
                drop(persist);
                if let Err(reload_err) = self.reload().await {
                    error!(%reload_err, "reload after stale drop failed");
                    self.emit(SyncEvent::ReloadFailed {
                        message: reload_err.to_string(),
                    });
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        persist.change = reordered.change.clone();
        Ok(Commit {
            applied: reordered.board,
            change: reordered.change,
            persist,
        })
    }

    /// Replaces the board with the store's copy
    pub async fn reload(&self) -> Result<Board> {
        let board = self.gateway.fetch_board(&self.project_id).await?;
        let revision = self.state.replace(board.clone()).await;
        info!(project = %self.project_id, revision, "board reloaded");
        Ok(board)
    }

    /// Reload requested from outside a drag (CRUD elsewhere in the app)
    pub async fn refresh(&self) -> Result<Board> {
        let board = self.reload().await?;
        self.emit(SyncEvent::Refreshed {
            revision: self.state.revision(),
        });
        Ok(board)
    }

    async fn persist(&self, change: &BoardChange) -> Result<()> {
        match change {
            BoardChange::Unchanged => Ok(()),
            BoardChange::SectionsReordered { orders } => {
                let calls = orders
                    .iter()
                    .map(|(section_id, order)| self.gateway.reorder_section(section_id, *order));
                let failures: Vec<HlaviError> = join_all(calls)
                    .await
                    .into_iter()
                    .filter_map(|r| r.err())
                    .collect();

                match failures.into_iter().next() {
                    None => Ok(()),
                    Some(first) => Err(first),
                }
            }
            BoardChange::TaskMoved {
                task_id,
                section_id,
                order,
                ..
            } => {
                self.gateway
                    .move_task(task_id, section_id, *order, &self.project_id)
                    .await
            }
        }
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// Persistence for one commit. Holds the subject's in-flight lock until it
/// is run or dropped.
pub struct PendingPersist {
    reconciler: Reconciler,
    key: SubjectKey,
    change: BoardChange,
}

impl PendingPersist {
    pub fn key(&self) -> &SubjectKey {
        &self.key
    }

    /// Sends the change to the store. On failure the board is reloaded and
    /// whatever was applied optimistically is discarded.
    pub async fn run(self) -> PersistOutcome {
        let reconciler = &self.reconciler;
        if self.change.is_unchanged() {
            return PersistOutcome::Skipped;
        }

        match reconciler.persist(&self.change).await {
            Ok(()) => {
                info!(key = %self.key, "change persisted");
                reconciler.emit(SyncEvent::Persisted {
                    key: self.key.clone(),
                });
                PersistOutcome::Persisted
            }
            Err(err) => {
                warn!(key = %self.key, %err, "persisting change failed, rolling back");
                match reconciler.reload().await {
                    Ok(_) => {
                        reconciler.emit(SyncEvent::RolledBack {
                            key: self.key.clone(),
                            message: err.to_string(),
                        });
                        PersistOutcome::RolledBack
                    }
                    Err(reload_err) => {
                        error!(key = %self.key, %reload_err, "rollback reload failed");
                        reconciler.emit(SyncEvent::ReloadFailed {
                            message: reload_err.to_string(),
                        });
                        PersistOutcome::ReloadFailed
                    }
                }
            }
        }
    }
}

impl Drop for PendingPersist {
    fn drop(&mut self) {
        self.reconciler.locks.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::tests::sample_board;
    use crate::domain::{DragToken, SectionId, Task, TaskId};
    use crate::storage::{GatewayCall, MemoryStorage};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        reconciler: Reconciler,
        events: broadcast::Receiver<SyncEvent>,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::with_board(sample_board()).await);
        let (sender, events) = broadcast::channel(16);
        let reconciler = Reconciler::new(
            ProjectId::new("p1"),
            storage.clone(),
            Arc::new(BoardState::new(sample_board())),
            Arc::new(SubjectLocks::new()),
            sender,
        );
        Fixture {
            storage,
            reconciler,
            events,
        }
    }

    fn t1() -> DragSubject {
        DragSubject::Task {
            section_id: SectionId::new("A"),
            task_id: TaskId::new("t1"),
            index: 0,
        }
    }

    fn b_placeholder() -> DropTarget {
        DragToken::Placeholder {
            section_id: SectionId::new("B"),
        }
    }

    #[tokio::test]
    async fn test_task_move_applies_then_persists() {
        let mut fx = fixture().await;

        let commit = fx.reconciler.commit(&t1(), &b_placeholder()).await.unwrap();

        // visible before the store hears about it
        let shown = fx.reconciler.state().snapshot().await;
        assert_eq!(shown, commit.applied);
        assert_eq!(shown.sections[1].tasks[0].id, Some(TaskId::new("t1")));
        let t1_key = SubjectKey::Task(TaskId::new("t1"));
        assert!(fx.reconciler.locks().is_locked(&t1_key));
        assert!(fx.storage.calls().is_empty());

        assert_eq!(commit.persist.run().await, PersistOutcome::Persisted);

        assert_eq!(
            fx.storage.calls(),
            vec![GatewayCall::MoveTask {
                task_id: TaskId::new("t1"),
                section_id: SectionId::new("B"),
                order: 0,
                project_id: ProjectId::new("p1"),
            }]
        );
        assert!(fx.reconciler.locks().is_empty());
        assert!(matches!(
            fx.events.recv().await.unwrap(),
            SyncEvent::Committed { .. }
        ));
        assert!(matches!(
            fx.events.recv().await.unwrap(),
            SyncEvent::Persisted { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back_to_store_state() {
        let mut fx = fixture().await;
        fx.storage.fail_moves(true);

        let commit = fx.reconciler.commit(&t1(), &b_placeholder()).await.unwrap();
        assert_eq!(commit.persist.run().await, PersistOutcome::RolledBack);

        let shown = fx.reconciler.state().snapshot().await;
        let stored = fx.storage.fetch_board(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(shown, stored);
        assert_eq!(shown.sections[0].tasks[0].id, Some(TaskId::new("t1")));
        assert!(shown.sections[1].tasks.is_empty());

        fx.events.recv().await.unwrap();
        assert!(matches!(
            fx.events.recv().await.unwrap(),
            SyncEvent::RolledBack { .. }
        ));
    }

    #[tokio::test]
    async fn test_section_reorder_fires_concurrent_calls() {
        let fx = fixture().await;
        let subject = DragSubject::Section {
            section_id: SectionId::new("B"),
        };
        let target = DragToken::Section {
            section_id: SectionId::new("A"),
        };

        let commit = fx.reconciler.commit(&subject, &target).await.unwrap();
        let order: Vec<_> = commit
            .applied
            .sections
            .iter()
            .map(|s| (s.id.as_str(), s.order))
            .collect();
        assert_eq!(order, vec![("B", 0), ("A", 1)]);

        assert_eq!(commit.persist.run().await, PersistOutcome::Persisted);

        let calls = fx.storage.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&GatewayCall::ReorderSection {
            section_id: SectionId::new("B"),
            order: 0
        }));
        assert!(calls.contains(&GatewayCall::ReorderSection {
            section_id: SectionId::new("A"),
            order: 1
        }));
        assert_eq!(fx.storage.max_concurrent_writes(), 2);
    }

    #[tokio::test]
    async fn test_one_failed_section_call_reloads_whole_board() {
        let fx = fixture().await;
        fx.storage.fail_section(SectionId::new("A"));
        let subject = DragSubject::Section {
            section_id: SectionId::new("B"),
        };
        let target = DragToken::Section {
            section_id: SectionId::new("A"),
        };

        let commit = fx.reconciler.commit(&subject, &target).await.unwrap();
        assert_eq!(commit.persist.run().await, PersistOutcome::RolledBack);

        // B's call went through, A's did not; the board shows whatever the
        // store now holds.
        let shown = fx.reconciler.state().snapshot().await;
        let stored = fx.storage.fetch_board(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(shown, stored);
        assert!(shown.is_dense());
    }

    #[tokio::test]
    async fn test_reload_failure_is_reported() {
        let mut fx = fixture().await;
        fx.storage.fail_moves(true);
        fx.storage.fail_fetches(true);

        let commit = fx.reconciler.commit(&t1(), &b_placeholder()).await.unwrap();
        assert_eq!(commit.persist.run().await, PersistOutcome::ReloadFailed);
        assert!(fx.reconciler.locks().is_empty());

        fx.events.recv().await.unwrap();
        assert!(matches!(
            fx.events.recv().await.unwrap(),
            SyncEvent::ReloadFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_noop_drop_skips_persistence() {
        let fx = fixture().await;
        let target = DragToken::Task {
            section_id: SectionId::new("A"),
            task_id: TaskId::new("t1"),
            index: 0,
        };

        let commit = fx.reconciler.commit(&t1(), &target).await.unwrap();
        assert!(commit.change.is_unchanged());
        assert_eq!(fx.reconciler.state().revision(), 0);
        assert_eq!(commit.persist.run().await, PersistOutcome::Skipped);
        assert!(fx.storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_subject_aborts_and_reloads() {
        let fx = fixture().await;
        let ghost = DragSubject::Task {
            section_id: SectionId::new("A"),
            task_id: TaskId::new("deleted"),
            index: 0,
        };

        let err = fx.reconciler
            .commit(&ghost, &b_placeholder())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, HlaviError::StaleSubject(_)));
        assert_eq!(
            fx.storage.calls(),
            vec![GatewayCall::FetchBoard {
                project_id: ProjectId::new("p1")
            }]
        );
        assert_eq!(fx.reconciler.state().revision(), 1);
        assert!(fx.reconciler.locks().is_empty());
    }

    #[tokio::test]
    async fn test_second_commit_for_busy_subject_is_refused() {
        let fx = fixture().await;

        let first = fx.reconciler.commit(&t1(), &b_placeholder()).await.unwrap();
        let err = fx.reconciler
            .commit(&t1(), &b_placeholder())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HlaviError::SubjectBusy(_)));

        first.persist.run().await;
        let moved_back = DragSubject::Task {
            section_id: SectionId::new("B"),
            task_id: TaskId::new("t1"),
            index: 0,
        };
        let target = DragToken::Section {
            section_id: SectionId::new("A"),
        };
        assert!(fx.reconciler.commit(&moved_back, &target).await.is_ok());
    }

    #[tokio::test]
    async fn test_move_past_unsaved_task_matches_store() {
        let mut stored = sample_board();
        stored.sections[1].tasks.push(Task::persisted(
            TaskId::new("t4"),
            SectionId::new("B"),
            "Fourth",
        ));
        let mut shown = stored.clone();
        shown.sections[1]
            .tasks
            .insert(0, Task::new(SectionId::new("B"), "Draft"));
        shown.sections[1].renumber_tasks();

        let storage = Arc::new(MemoryStorage::with_board(stored).await);
        let (sender, _events) = broadcast::channel(16);
        let reconciler = Reconciler::new(
            ProjectId::new("p1"),
            storage.clone(),
            Arc::new(BoardState::new(shown)),
            Arc::new(SubjectLocks::new()),
            sender,
        );
        let onto_t4 = DragToken::Task {
            section_id: SectionId::new("B"),
            task_id: TaskId::new("t4"),
            index: 1,
        };

        let commit = reconciler.commit(&t1(), &onto_t4).await.unwrap();
        assert_eq!(commit.persist.run().await, PersistOutcome::Persisted);

        assert_eq!(
            storage.calls(),
            vec![GatewayCall::MoveTask {
                task_id: TaskId::new("t1"),
                section_id: SectionId::new("B"),
                order: 0,
                project_id: ProjectId::new("p1"),
            }]
        );
        let persisted_ids = |board: &Board| -> Vec<TaskId> {
            board.sections[1]
                .tasks
                .iter()
                .filter_map(|task| task.id.clone())
                .collect()
        };
        let local = reconciler.state().snapshot().await;
        let remote = storage.fetch_board(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(persisted_ids(&local), persisted_ids(&remote));
        assert_eq!(
            persisted_ids(&remote),
            vec![TaskId::new("t1"), TaskId::new("t4")]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refresh_racing_commit_is_never_undone() {
        // t2 is gone from the store; once a refresh has landed it must stay
        // gone no matter how the commit interleaves with it.
        let mut stored = sample_board();
        stored.sections[0].tasks.pop();

        for _ in 0..200 {
            let storage = Arc::new(MemoryStorage::with_board(stored.clone()).await);
            let (sender, _events) = broadcast::channel(16);
            let reconciler = Reconciler::new(
                ProjectId::new("p1"),
                storage,
                Arc::new(BoardState::new(sample_board())),
                Arc::new(SubjectLocks::new()),
                sender,
            );

            let refresher = reconciler.clone();
            let refresh = tokio::spawn(async move { refresher.refresh().await });
            let commit = reconciler.commit(&t1(), &b_placeholder()).await;
            refresh.await.unwrap().unwrap();
            drop(commit);

            let shown = reconciler.state().snapshot().await;
            assert!(shown.task(&TaskId::new("t2")).is_none());
        }
    }

    #[tokio::test]
    async fn test_dropping_pending_persist_releases_lock() {
        let fx = fixture().await;

        let commit = fx.reconciler.commit(&t1(), &b_placeholder()).await.unwrap();
        drop(commit);

        assert!(fx.reconciler.locks().is_empty());
    }
}
