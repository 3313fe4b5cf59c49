//! Keeping the shown board in step with the store.

pub mod board;
pub mod events;
pub mod locks;
pub mod reconciler;
pub mod state;

pub use board::{BoardHandler, BoardSync, NoopHandler};
pub use events::{BoardSignal, SignalBus, SyncEvent};
pub use locks::SubjectLocks;
pub use reconciler::{Commit, PendingPersist, PersistOutcome, Reconciler};
pub use state::BoardState;
