//! Signals into the board and notifications out of it.
//!
//! CRUD flows elsewhere in the application publish [`BoardSignal`]s on a
//! [`SignalBus`] that the board subscribes to. The board in turn broadcasts
//! [`SyncEvent`]s, which the UI shows as transient notifications.

use crate::domain::{BoardChange, ProjectId, SectionId, SubjectKey, TaskId};
use tokio::sync::broadcast;

/// Something changed outside of drag operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardSignal {
    TaskCreated {
        project_id: ProjectId,
        task_id: TaskId,
    },
    TaskUpdated {
        project_id: ProjectId,
        task_id: TaskId,
    },
    TaskDeleted {
        project_id: ProjectId,
        task_id: TaskId,
    },
    SectionChanged {
        project_id: ProjectId,
        section_id: SectionId,
    },
}

impl BoardSignal {
    pub fn project_id(&self) -> &ProjectId {
        match self {
            Self::TaskCreated { project_id, .. }
            | Self::TaskUpdated { project_id, .. }
            | Self::TaskDeleted { project_id, .. }
            | Self::SectionChanged { project_id, .. } => project_id,
        }
    }
}

/// Injected channel carrying [`BoardSignal`]s
#[derive(Debug, Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<BoardSignal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a signal. Having no subscribers is not an error.
    pub fn publish(&self, signal: BoardSignal) {
        let _ = self.sender.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardSignal> {
        self.sender.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Outcome notifications from the reconciler
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A drop was applied locally
    Committed { change: BoardChange },
    /// The store accepted the change
    Persisted { key: SubjectKey },
    /// The store rejected the change and the board was reloaded
    RolledBack { key: SubjectKey, message: String },
    /// Reloading from the store failed; local state may be ahead of it
    ReloadFailed { message: String },
    /// The board was refetched outside of a drag
    Refreshed { revision: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_delivers_to_every_subscriber() {
        let bus = SignalBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let signal = BoardSignal::TaskUpdated {
            project_id: ProjectId::new("p1"),
            task_id: TaskId::new("t1"),
        };
        bus.publish(signal.clone());

        assert_eq!(first.recv().await.unwrap(), signal);
        assert_eq!(second.recv().await.unwrap(), signal);
        assert_eq!(signal.project_id(), &ProjectId::new("p1"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = SignalBus::default();
        bus.publish(BoardSignal::SectionChanged {
            project_id: ProjectId::new("p1"),
            section_id: SectionId::new("A"),
        });
    }
}
