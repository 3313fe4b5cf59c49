use crate::config::SyncConfig;
use crate::domain::{Board, DragToken, ProjectId, SectionId, Task, TaskId};
use crate::drag::{
    DragController, DragOutcome, DropRequest, DropSurface, Key, Point, PointerKind,
};
use crate::error::{HlaviError, Result};
use crate::storage::PersistenceGateway;
use crate::sync::events::{BoardSignal, SyncEvent};
use crate::sync::locks::SubjectLocks;
use crate::sync::reconciler::{PersistOutcome, Reconciler};
use crate::sync::state::BoardState;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Click interactions the board hands back to the embedding application
pub trait BoardHandler: Send + Sync {
    fn on_edit_task(&self, _task: &Task) {}

    fn on_delete_task(&self, _task_id: &TaskId) {}

    fn on_add_task(&self, _section_id: &SectionId) {}
}

/// Handler that ignores every interaction
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl BoardHandler for NoopHandler {}

/// A mounted board: drag input in, optimistic board state and sync events
/// out.
pub struct BoardSync {
    reconciler: Reconciler,
    drag: DragController,
    handler: Box<dyn BoardHandler>,
    events: broadcast::Sender<SyncEvent>,
    in_flight: Vec<JoinHandle<PersistOutcome>>,
    listener: Option<JoinHandle<()>>,
}

impl BoardSync {
    /// Fetches the board and wires up the drag controller and reconciler
    pub async fn mount(
        project_id: ProjectId,
        gateway: Arc<dyn PersistenceGateway>,
        config: SyncConfig,
        handler: impl BoardHandler + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let board = gateway.fetch_board(&project_id).await?;
        info!(
            project = %project_id,
            sections = board.sections.len(),
            tasks = board.task_count(),
            "board mounted"
        );

        let (events, _) = broadcast::channel(config.signal_capacity);
        let locks = Arc::new(SubjectLocks::new());
        let reconciler = Reconciler::new(
            project_id,
            gateway,
            Arc::new(BoardState::new(board)),
            locks.clone(),
            events.clone(),
        );

        Ok(Self {
            reconciler,
            drag: DragController::with_locks(config, locks),
            handler: Box::new(handler),
            events,
            in_flight: Vec::new(),
            listener: None,
        })
    }

    pub fn project_id(&self) -> &ProjectId {
        self.reconciler.project_id()
    }

    /// The board as currently shown
    pub async fn board(&self) -> Board {
        self.reconciler.state().snapshot().await
    }

    pub fn revision(&self) -> u64 {
        self.reconciler.state().revision()
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn refresh(&self) -> Result<Board> {
        self.reconciler.refresh().await
    }

    /// Refreshes the board whenever a signal for this project arrives.
    /// Replaces any previous listener.
    pub fn listen(&mut self, mut signals: broadcast::Receiver<BoardSignal>) {
        if let Some(previous) = self.listener.take() {
            previous.abort();
        }

        let reconciler = self.reconciler.clone();
        self.listener = Some(tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        if signal.project_id() != reconciler.project_id() {
                            debug!(?signal, "signal for another project ignored");
                            continue;
                        }
                        debug!(?signal, "board signal received");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // One refresh covers everything that was missed.
                        warn!(skipped, "board signals dropped, refreshing");
                    }
                    Err(RecvError::Closed) => break,
                }

                if let Err(err) = reconciler.refresh().await {
                    warn!(%err, "refresh after board signal failed");
                    reconciler.emit(SyncEvent::ReloadFailed {
                        message: err.to_string(),
                    });
                }
            }
            debug!("signal bus closed, listener stopped");
        }));
    }

    pub fn pointer_down(
        &mut self,
        raw_token: &str,
        kind: PointerKind,
        point: Point,
        at: Instant,
    ) -> DragOutcome {
        self.drag.pointer_down(raw_token, kind, point, at)
    }

    pub fn pointer_move(
        &mut self,
        point: Point,
        at: Instant,
        surface: &DropSurface,
    ) -> DragOutcome {
        self.drag.pointer_move(point, at, surface)
    }

    pub fn tick(&mut self, at: Instant, surface: &DropSurface) -> DragOutcome {
        self.drag.tick(at, surface)
    }

    pub async fn pointer_up(
        &mut self,
        point: Point,
        at: Instant,
        surface: &DropSurface,
    ) -> Result<DragOutcome> {
        let outcome = self.drag.pointer_up(point, at, surface);
        self.handle(outcome).await
    }

    pub async fn key(&mut self, key: Key, focused: Option<&str>) -> Result<DragOutcome> {
        let board = self.board().await;
        let outcome = self.drag.key(key, focused, &board);
        self.handle(outcome).await
    }

    /// Drops the current drag with no side effects
    pub fn cancel(&mut self) -> DragOutcome {
        self.drag.cancel()
    }

    /// Commits a drop and sends it to the store in the background. Returns
    /// the board as now shown.
    pub async fn apply_drop(&mut self, request: &DropRequest) -> Result<Board> {
        let commit = self.reconciler
            .commit(&request.subject, &request.target)
            .await?;
        if !commit.change.is_unchanged() {
            self.in_flight.retain(|handle| !handle.is_finished());
            self.in_flight.push(tokio::spawn(commit.persist.run()));
        }
        Ok(commit.applied)
    }

    /// Waits for every background persistence call started so far
    pub async fn settle(&mut self) -> Vec<PersistOutcome> {
        let mut outcomes = Vec::with_capacity(self.in_flight.len());
        for handle in self.in_flight.drain(..) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(%err, "persistence task did not complete"),
            }
        }
        outcomes
    }

    /// The delete control on a task card
    pub async fn delete_clicked(&self, task_id: &TaskId) -> Result<()> {
        let exists = self.reconciler
            .state()
            .with(|b| b.task(task_id).is_some())
            .await;
        if !exists {
            return Err(HlaviError::TaskNotFound(task_id.to_string()));
        }
        self.handler.on_delete_task(task_id);
        Ok(())
    }

    /// The add control on a section
    pub async fn add_clicked(&self, section_id: &SectionId) -> Result<()> {
        let exists = self.reconciler
            .state()
            .with(|b| b.section(section_id).is_some())
            .await;
        if !exists {
            return Err(HlaviError::SectionNotFound(section_id.to_string()));
        }
        self.handler.on_add_task(section_id);
        Ok(())
    }

    async fn handle(&mut self, outcome: DragOutcome) -> Result<DragOutcome> {
        match &outcome {
            DragOutcome::Dropped(request) => {
                self.apply_drop(request).await?;
            }
            DragOutcome::Click(DragToken::Task { task_id, .. }) => {
                let task = self.reconciler
                    .state()
                    .with(|b| b.task(task_id).cloned())
                    .await;
                match task {
                    Some(task) => self.handler.on_edit_task(&task),
                    None => debug!(%task_id, "click on a task that is gone"),
                }
            }
            _ => {}
        }
        Ok(outcome)
    }
}

impl Drop for BoardSync {
    fn drop(&mut self) {
        // Persistence already in flight is left to finish.
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
