//! # Hlavi Sync
//!
//! Drag-and-drop ordering for Hlavi kanban boards.
//!
//! Sections and task cards are reordered locally the moment they are dropped,
//! then the change is sent to a [`PersistenceGateway`]. If the store rejects
//! it, the whole board is reloaded from the store. Nothing here depends on a
//! particular UI toolkit; the embedding application feeds pointer and
//! keyboard input in and renders the [`Board`] it gets back.

pub mod config;
pub mod domain;
pub mod drag;
pub mod error;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use config::{CollisionStrategy, SyncConfig};
pub use domain::{
    board::{Board, ProjectId, Section, SectionId},
    reorder::{reorder, BoardChange, DragSubject, DropTarget},
    task::{Task, TaskId},
    token::DragToken,
};
pub use drag::{DragController, DragOutcome, DropSurface, Key, Point, PointerKind, Rect};
pub use error::{HlaviError, Result};
pub use storage::PersistenceGateway;
pub use sync::{BoardHandler, BoardSignal, BoardSync, SignalBus, SyncEvent};
