pub mod board;
pub mod reorder;
pub mod task;
pub mod token;

pub use board::{Board, ProjectId, Section, SectionId};
pub use reorder::{
    relocate_task, reorder, BoardChange, DragSubject, DropTarget, Reordered, SubjectKey,
};
pub use task::{Task, TaskId};
pub use token::DragToken;
