//! Keyboard sensor: moving the "over" target with arrow keys.

use crate::domain::{Board, DragSubject, DragToken, DropTarget, Section};

/// Keys the drag controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Space,
    Enter,
    Escape,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl Key {
    pub fn is_arrow(self) -> bool {
        matches!(
            self,
            Key::ArrowUp | Key::ArrowDown | Key::ArrowLeft | Key::ArrowRight
        )
    }

    pub fn is_activator(self) -> bool {
        matches!(self, Key::Space | Key::Enter)
    }
}

/// Next drop target after pressing an arrow key. Returns `over` unchanged
/// when there is nowhere to go.
pub fn next_target(
    board: &Board,
    subject: &DragSubject,
    over: &DropTarget,
    key: Key,
) -> DropTarget {
    let Some(section_index) = board.section_index(over.section_id()) else {
        return over.clone();
    };

    let moved = match (subject, key) {
        (_, Key::ArrowLeft) => section_index
            .checked_sub(1)
            .and_then(|i| board.sections.get(i))
            .map(|s| column_target(subject, s)),
        (_, Key::ArrowRight) => board
            .sections
            .get(section_index + 1)
            .map(|s| column_target(subject, s)),
        (DragSubject::Section { .. }, _) => None,
        (DragSubject::Task { .. }, Key::ArrowDown) => {
            step_down(&board.sections[section_index], over)
        }
        (DragSubject::Task { .. }, Key::ArrowUp) => step_up(&board.sections[section_index], over),
        _ => None,
    };

    moved.unwrap_or_else(|| over.clone())
}

/// Target representing a whole column for the given subject kind
fn column_target(subject: &DragSubject, section: &Section) -> DropTarget {
    if matches!(subject, DragSubject::Task { .. }) && section.tasks.is_empty() {
        DragToken::Placeholder {
            section_id: section.id.clone(),
        }
    } else {
        DragToken::Section {
            section_id: section.id.clone(),
        }
    }
}

fn task_target(section: &Section, index: usize) -> Option<DropTarget> {
    let task = section.tasks.get(index)?;
    let task_id = task.id.clone()?;
    Some(DragToken::Task {
        section_id: section.id.clone(),
        task_id,
        index,
    })
}

fn step_down(section: &Section, over: &DropTarget) -> Option<DropTarget> {
    match over {
        DragToken::Task { index, .. } => {
            // Past the last card lands on the column, i.e. "append".
            task_target(section, index + 1).or_else(|| {
                Some(DragToken::Section {
                    section_id: section.id.clone(),
                })
            })
        }
        _ => None,
    }
}

fn step_up(section: &Section, over: &DropTarget) -> Option<DropTarget> {
    match over {
        DragToken::Task { index, .. } => index.checked_sub(1).and_then(|i| task_target(section, i)),
        DragToken::Section { .. } => section
            .tasks
            .len()
            .checked_sub(1)
            .and_then(|last| task_target(section, last)),
        DragToken::Placeholder { .. } => None,
    }
}
