//! Pure reordering of sections and tasks.
//!
//! Nothing here touches shared state: every function takes a board and
//! returns the next one, leaving the input untouched.

use crate::domain::board::{Board, SectionId};
use crate::domain::task::TaskId;
use crate::domain::token::DragToken;
use crate::error::{HlaviError, Result};
use std::fmt;
use tracing::debug;

/// Anything a drag can land on. Every token shape is a valid target.
pub type DropTarget = DragToken;

/// The item being dragged
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DragSubject {
    /// A whole section, carrying its tasks with it
    Section { section_id: SectionId },
    /// A single task plus where it was picked up from
    Task {
        section_id: SectionId,
        task_id: TaskId,
        index: usize,
    },
}

/// Identity of a subject independent of its position, used to lock
/// subjects with persistence in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectKey {
    Section(SectionId),
    Task(TaskId),
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section(id) => write!(f, "section {}", id),
            Self::Task(id) => write!(f, "task {}", id),
        }
    }
}

impl DragSubject {
    pub fn key(&self) -> SubjectKey {
        match self {
            Self::Section { section_id } => SubjectKey::Section(section_id.clone()),
            Self::Task { task_id, .. } => SubjectKey::Task(task_id.clone()),
        }
    }

    pub fn section_id(&self) -> &SectionId {
        match self {
            Self::Section { section_id } | Self::Task { section_id, .. } => section_id,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Self::Section { .. })
    }
}

impl TryFrom<DragToken> for DragSubject {
    type Error = HlaviError;

    fn try_from(token: DragToken) -> Result<Self> {
        match token {
            DragToken::Section { section_id } => Ok(Self::Section { section_id }),
            DragToken::Task {
                section_id,
                task_id,
                index,
            } => Ok(Self::Task {
                section_id,
                task_id,
                index,
            }),
            DragToken::Placeholder { .. } => Err(HlaviError::InvalidToken(format!(
                "{} is a drop target, not a draggable item",
                token
            ))),
        }
    }
}

/// What changed between the input board and the reordered one. Drives
/// which persistence calls are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardChange {
    Unchanged,
    /// New dense order for every section on the board
    SectionsReordered { orders: Vec<(SectionId, u32)> },
    TaskMoved {
        task_id: TaskId,
        from_section_id: SectionId,
        section_id: SectionId,
        order: u32,
    },
}

impl BoardChange {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Result of a reorder
#[derive(Debug, Clone, PartialEq)]
pub struct Reordered {
    pub board: Board,
    pub change: BoardChange,
}

impl Reordered {
    fn unchanged(board: &Board) -> Self {
        Self {
            board: board.clone(),
            change: BoardChange::Unchanged,
        }
    }
}

/// Computes the board after dropping `subject` on `target`
pub fn reorder(board: &Board, subject: &DragSubject, target: &DropTarget) -> Result<Reordered> {
    let result = match subject {
        DragSubject::Section { section_id } => {
            reorder_sections(board, section_id, target.section_id())
        }
        DragSubject::Task {
            section_id,
            task_id,
            index,
        } => reorder_task(board, section_id, task_id, *index, target),
    }?;

    debug!(?subject, target = %target, change = ?result.change, "reorder computed");
    Ok(result)
}

fn reorder_sections(board: &Board, source: &SectionId, target: &SectionId) -> Result<Reordered> {
    let from = board
        .section_index(source)
        .ok_or_else(|| HlaviError::StaleSubject(format!("section {}", source)))?;
    let to = board
        .section_index(target)
        .ok_or_else(|| HlaviError::StaleTarget(format!("section {}", target)))?;

    if from == to {
        return Ok(Reordered::unchanged(board));
    }

    let mut next = board.clone();
    let moved = next.sections.remove(from);
    next.sections.insert(to, moved);
    next.renumber_sections();

    let orders = next
        .sections
        .iter()
        .map(|s| (s.id.clone(), s.order))
        .collect();

    Ok(Reordered {
        board: next,
        change: BoardChange::SectionsReordered { orders },
    })
}

fn reorder_task(
    board: &Board,
    origin: &SectionId,
    task_id: &TaskId,
    picked_index: usize,
    target: &DropTarget,
) -> Result<Reordered> {
    let (from_section, from_index) = board
        .locate_task(task_id)
        .ok_or_else(|| HlaviError::StaleSubject(format!("task {}", task_id)))?;

    if &board.sections[from_section].id != origin {
        return Err(HlaviError::StaleSubject(format!(
            "task {} left section {} during the drag",
            task_id, origin
        )));
    }
    if from_index != picked_index {
        debug!(%task_id, picked_index, from_index, "task shifted during drag");
    }

    let target_section_id = target.section_id();
    let to_section = board
        .section_index(target_section_id)
        .ok_or_else(|| HlaviError::StaleTarget(format!("section {}", target_section_id)))?;
    let same_section = to_section == from_section;
    let target_len = board.sections[to_section].tasks.len();

    let to_index = match target {
        // Dropping on the column itself appends.
        DragToken::Section { .. } if same_section => target_len - 1,
        DragToken::Section { .. } => target_len,
        DragToken::Placeholder { .. } => 0,
        DragToken::Task {
            task_id: over_id, ..
        } if over_id == task_id => from_index,
        DragToken::Task { index, .. } if same_section => (*index).min(target_len - 1),
        DragToken::Task { index, .. } => (*index).min(target_len),
    };

    if same_section && to_index == from_index {
        return Ok(Reordered::unchanged(board));
    }

    let mut next = board.clone();
    let index = relocate_task(&mut next, task_id, target_section_id, to_index)? as usize;
    // The store only knows persisted tasks, so unsaved cards ahead of the
    // drop do not count toward the index it is sent.
    let order = next.sections[to_section].tasks[..index]
        .iter()
        .filter(|task| task.is_persisted())
        .count() as u32;

    Ok(Reordered {
        board: next,
        change: BoardChange::TaskMoved {
            task_id: task_id.clone(),
            from_section_id: origin.clone(),
            section_id: target_section_id.clone(),
            order,
        },
    })
}

/// Moves a task into `section_id` at `index` (clamped to the list), fixing
/// the owning section reference and renumbering both affected sections.
/// Returns the index the task ended up at.
pub fn relocate_task(
    board: &mut Board,
    task_id: &TaskId,
    section_id: &SectionId,
    index: usize,
) -> Result<u32> {
    let to_section = board
        .section_index(section_id)
        .ok_or_else(|| HlaviError::SectionNotFound(section_id.to_string()))?;
    let (from_section, from_index) = board
        .locate_task(task_id)
        .ok_or_else(|| HlaviError::TaskNotFound(task_id.to_string()))?;

    let mut task = board.sections[from_section].tasks.remove(from_index);
    task.section_id = section_id.clone();

    let tasks = &mut board.sections[to_section].tasks;
    let index = index.min(tasks.len());
    tasks.insert(index, task);

    board.sections[from_section].renumber_tasks();
    if to_section != from_section {
        board.sections[to_section].renumber_tasks();
    }

    Ok(index as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::tests::sample_board;
    use crate::domain::board::Section;
    use crate::domain::task::Task;

    fn task_subject(section: &str, task: &str, index: usize) -> DragSubject {
        DragSubject::Task {
            section_id: SectionId::new(section),
            task_id: TaskId::new(task),
            index,
        }
    }

    fn task_target(section: &str, task: &str, index: usize) -> DropTarget {
        DragToken::Task {
            section_id: SectionId::new(section),
            task_id: TaskId::new(task),
            index,
        }
    }

    fn section_target(section: &str) -> DropTarget {
        DragToken::Section {
            section_id: SectionId::new(section),
        }
    }

    fn task_ids(board: &Board, section: usize) -> Vec<&str> {
        board.sections[section]
            .tasks
            .iter()
            .map(|t| t.id.as_ref().map(|id| id.as_str()).unwrap_or("?"))
            .collect()
    }

    /// Three sections: A [t1, t2, t3], B [t4], C []
    fn wide_board() -> Board {
        let mut board = sample_board();
        board.sections[0]
            .tasks
            .push(Task::persisted(TaskId::new("t3"), SectionId::new("A"), "Third"));
        board.sections[0].renumber_tasks();
        board.sections[1]
            .tasks
            .push(Task::persisted(TaskId::new("t4"), SectionId::new("B"), "Fourth"));
        board.sections[1].renumber_tasks();
        board.with_section(Section::new(SectionId::new("C"), "Done"))
    }

    #[test]
    fn test_task_onto_empty_placeholder() {
        let board = sample_board();
        let target = DragToken::Placeholder {
            section_id: SectionId::new("B"),
        };

        let subject = task_subject("A", "t1", 0);
        let result = reorder(&board, &subject, &target).unwrap();

        assert_eq!(task_ids(&result.board, 0), vec!["t2"]);
        assert_eq!(task_ids(&result.board, 1), vec!["t1"]);
        assert_eq!(result.board.sections[0].tasks[0].order, 0);
        assert_eq!(result.board.sections[1].tasks[0].order, 0);
        assert_eq!(
            result.board.sections[1].tasks[0].section_id,
            SectionId::new("B")
        );
        assert_eq!(
            result.change,
            BoardChange::TaskMoved {
                task_id: TaskId::new("t1"),
                from_section_id: SectionId::new("A"),
                section_id: SectionId::new("B"),
                order: 0,
            }
        );
        // input untouched
        assert_eq!(board, sample_board());
    }

    #[test]
    fn test_section_to_front() {
        let board = sample_board();
        let subject = DragSubject::Section {
            section_id: SectionId::new("B"),
        };

        let result = reorder(&board, &subject, &section_target("A")).unwrap();

        assert_eq!(result.board.sections[0].id, SectionId::new("B"));
        assert_eq!(result.board.sections[0].order, 0);
        assert_eq!(result.board.sections[1].id, SectionId::new("A"));
        assert_eq!(result.board.sections[1].order, 1);
        // tasks travel with their section
        assert_eq!(task_ids(&result.board, 1), vec!["t1", "t2"]);
        assert_eq!(
            result.change,
            BoardChange::SectionsReordered {
                orders: vec![(SectionId::new("B"), 0), (SectionId::new("A"), 1)]
            }
        );
    }

    #[test]
    fn test_section_dropped_on_task_resolves_to_its_section() {
        let board = wide_board();
        let subject = DragSubject::Section {
            section_id: SectionId::new("C"),
        };

        let target = task_target("A", "t2", 1);
        let result = reorder(&board, &subject, &target).unwrap();

        let order: Vec<_> = result
            .board
            .sections
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(order, vec!["C", "A", "B"]);
        assert!(result.board.is_dense());
    }

    #[test]
    fn test_section_onto_itself_is_noop() {
        let board = sample_board();
        let subject = DragSubject::Section {
            section_id: SectionId::new("A"),
        };

        let target = task_target("A", "t2", 1);
        let result = reorder(&board, &subject, &target).unwrap();

        assert!(result.change.is_unchanged());
        assert_eq!(result.board, board);
    }

    #[test]
    fn test_same_section_move_down_takes_target_index() {
        let board = wide_board();

        let subject = task_subject("A", "t1", 0);
        let target = task_target("A", "t3", 2);
        let result = reorder(&board, &subject, &target).unwrap();

        assert_eq!(task_ids(&result.board, 0), vec!["t2", "t3", "t1"]);
        assert!(result.board.is_dense());
    }

    #[test]
    fn test_same_section_move_up() {
        let board = wide_board();

        let subject = task_subject("A", "t3", 2);
        let target = task_target("A", "t1", 0);
        let result = reorder(&board, &subject, &target).unwrap();

        assert_eq!(task_ids(&result.board, 0), vec!["t3", "t1", "t2"]);
        assert_eq!(
            result.change,
            BoardChange::TaskMoved {
                task_id: TaskId::new("t3"),
                from_section_id: SectionId::new("A"),
                section_id: SectionId::new("A"),
                order: 0,
            }
        );
    }

    #[test]
    fn test_task_onto_itself_is_noop() {
        let board = wide_board();

        let subject = task_subject("A", "t2", 1);
        let target = task_target("A", "t2", 1);
        let result = reorder(&board, &subject, &target).unwrap();

        assert!(result.change.is_unchanged());
        assert_eq!(result.board, board);
    }

    #[test]
    fn test_last_task_onto_own_section_is_noop() {
        let board = wide_board();

        let subject = task_subject("A", "t3", 2);
        let target = section_target("A");
        let result = reorder(&board, &subject, &target).unwrap();

        assert!(result.change.is_unchanged());
        assert_eq!(result.board, board);
    }

    #[test]
    fn test_cross_section_onto_task_inserts_before_it() {
        let board = wide_board();

        let subject = task_subject("A", "t2", 1);
        let target = task_target("B", "t4", 0);
        let result = reorder(&board, &subject, &target).unwrap();

        assert_eq!(task_ids(&result.board, 0), vec!["t1", "t3"]);
        assert_eq!(task_ids(&result.board, 1), vec!["t2", "t4"]);
        assert!(result.board.is_dense());
        assert!(result.board.check_ownership().is_ok());
    }

    #[test]
    fn test_persisted_order_skips_unsaved_tasks() {
        let mut board = wide_board();
        board.sections[1]
            .tasks
            .insert(0, Task::new(SectionId::new("B"), "Draft"));
        board.sections[1].renumber_tasks();

        let result = reorder(
            &board,
            &task_subject("A", "t1", 0),
            &task_target("B", "t4", 1),
        )
        .unwrap();

        // shown after the draft, sent as the first task the store knows
        assert_eq!(task_ids(&result.board, 1), vec!["?", "t1", "t4"]);
        assert_eq!(
            result.change,
            BoardChange::TaskMoved {
                task_id: TaskId::new("t1"),
                from_section_id: SectionId::new("A"),
                section_id: SectionId::new("B"),
                order: 0,
            }
        );
    }

    #[test]
    fn test_cross_section_onto_section_appends() {
        let board = wide_board();

        let subject = task_subject("A", "t1", 0);
        let target = section_target("B");
        let result = reorder(&board, &subject, &target).unwrap();

        assert_eq!(task_ids(&result.board, 1), vec!["t4", "t1"]);
        match result.change {
            BoardChange::TaskMoved { order, .. } => assert_eq!(order, 1),
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_index_is_clamped() {
        let board = wide_board();

        let subject = task_subject("A", "t1", 0);
        let target = task_target("B", "t4", 99);
        let result = reorder(&board, &subject, &target).unwrap();

        assert_eq!(task_ids(&result.board, 1), vec!["t4", "t1"]);
    }

    #[test]
    fn test_single_ownership_after_every_move() {
        let board = wide_board();
        let targets = [
            section_target("A"),
            section_target("B"),
            section_target("C"),
            task_target("A", "t1", 0),
            task_target("B", "t4", 0),
            DragToken::Placeholder {
                section_id: SectionId::new("C"),
            },
        ];

        let subject = task_subject("A", "t2", 1);

        for target in &targets {
            let result = reorder(&board, &subject, target).unwrap();
            let holders = result
                .board
                .sections
                .iter()
                .filter(|s| s.task_index(&TaskId::new("t2")).is_some())
                .count();
            assert_eq!(holders, 1, "target {}", target);
            assert!(result.board.is_dense(), "target {}", target);
            assert_eq!(result.board.task_count(), board.task_count());
        }
    }

    #[test]
    fn test_missing_subject_is_stale() {
        let board = sample_board();

        let subject = task_subject("A", "gone", 0);
        let target = section_target("B");
        let err = reorder(&board, &subject, &target).unwrap_err();
        assert!(matches!(err, HlaviError::StaleSubject(_)));

        let subject = DragSubject::Section {
            section_id: SectionId::new("gone"),
        };
        let err = reorder(&board, &subject, &section_target("A")).unwrap_err();
        assert!(matches!(err, HlaviError::StaleSubject(_)));
    }

    #[test]
    fn test_subject_that_changed_section_is_stale() {
        let board = sample_board();

        let subject = task_subject("B", "t1", 0);
        let target = section_target("A");
        let err = reorder(&board, &subject, &target).unwrap_err();
        assert!(matches!(err, HlaviError::StaleSubject(_)));
    }

    #[test]
    fn test_missing_target_section_is_stale() {
        let board = sample_board();

        let subject = task_subject("A", "t1", 0);
        let target = section_target("Z");
        let err = reorder(&board, &subject, &target).unwrap_err();
        assert!(matches!(err, HlaviError::StaleTarget(_)));
    }

    #[test]
    fn test_placeholder_is_not_a_subject() {
        let token = DragToken::Placeholder {
            section_id: SectionId::new("B"),
        };
        assert!(DragSubject::try_from(token).is_err());
    }

    #[test]
    fn test_relocate_task_reports_final_index() {
        let mut board = wide_board();

        let order = relocate_task(
            &mut board,
            &TaskId::new("t4"),
            &SectionId::new("A"),
            1,
        )
        .unwrap();

        assert_eq!(order, 1);
        assert_eq!(task_ids(&board, 0), vec!["t1", "t4", "t2", "t3"]);
        assert!(board.sections[1].tasks.is_empty());
        assert!(board.is_dense());

        assert!(matches!(
            relocate_task(&mut board, &TaskId::new("t4"), &SectionId::new("Z"), 0),
            Err(HlaviError::SectionNotFound(_))
        ));
    }
}
