use crate::config::SyncConfig;
use crate::domain::{token, Board, DragSubject, DragToken, DropTarget};
use crate::drag::collision::{DropSurface, Point};
use crate::drag::keyboard::{self, Key};
use crate::sync::SubjectLocks;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Kind of pointer that pressed a draggable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

/// Input device driving an active drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Pointer,
    Keyboard,
}

/// Press that has not met its activation constraint yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDrag {
    pub token: DragToken,
    pub kind: PointerKind,
    pub origin: Point,
    pub pressed_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDrag {
    pub subject: DragSubject,
    pub over: Option<DropTarget>,
    pub sensor: Sensor,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Pending(PendingDrag),
    Active(ActiveDrag),
}

/// A valid drop, ready for the reconciler
#[derive(Debug, Clone, PartialEq)]
pub struct DropRequest {
    pub subject: DragSubject,
    pub target: DropTarget,
}

/// What an input event did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// The input had no effect
    Ignored,
    /// A press was recorded and is waiting for its activation constraint
    Pending,
    /// The press moved or scrolled away before activating
    Aborted,
    Started(DragSubject),
    Over(Option<DropTarget>),
    Dropped(DropRequest),
    /// The drag ended without a valid target or was cancelled
    Cancelled,
    /// Press and release without activating a drag
    Click(DragToken),
}

/// Owns the lifecycle of one drag at a time
pub struct DragController {
    config: SyncConfig,
    locks: Arc<SubjectLocks>,
    state: DragState,
}

impl DragController {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_locks(config, Arc::new(SubjectLocks::new()))
    }

    /// Shares in-flight locks with the reconciler so busy subjects cannot be
    /// picked up.
    pub fn with_locks(config: SyncConfig, locks: Arc<SubjectLocks>) -> Self {
        Self {
            config,
            locks,
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DragState::Idle)
    }

    pub fn active_subject(&self) -> Option<&DragSubject> {
        match &self.state {
            DragState::Active(active) => Some(&active.subject),
            _ => None,
        }
    }

    pub fn over(&self) -> Option<&DropTarget> {
        match &self.state {
            DragState::Active(active) => active.over.as_ref(),
            _ => None,
        }
    }

    /// Task cards cannot be picked up while a section is being dragged,
    /// since the section carries them along.
    pub fn task_drags_enabled(&self) -> bool {
        !matches!(self.active_subject(), Some(DragSubject::Section { .. }))
    }

    /// Whether `token` may start a drag right now
    pub fn is_draggable(&self, token: &DragToken) -> bool {
        if !self.is_idle() || (token.is_task() && !self.task_drags_enabled()) {
            return false;
        }
        match DragSubject::try_from(token.clone()) {
            Ok(subject) => !self.locks.is_locked(&subject.key()),
            Err(_) => false,
        }
    }

    pub fn pointer_down(
        &mut self,
        raw_token: &str,
        kind: PointerKind,
        point: Point,
        at: Instant,
    ) -> DragOutcome {
        if !self.is_idle() {
            return DragOutcome::Ignored;
        }
        let token = match token::decode(raw_token) {
            Ok(token) => token,
            Err(err) => {
                debug!(%err, "press on undecodable token ignored");
                return DragOutcome::Ignored;
            }
        };
        if matches!(token, DragToken::Placeholder { .. }) {
            return DragOutcome::Ignored;
        }

        self.state = DragState::Pending(PendingDrag {
            token,
            kind,
            origin: point,
            pressed_at: at,
        });
        DragOutcome::Pending
    }

    pub fn pointer_move(
        &mut self,
        point: Point,
        at: Instant,
        surface: &DropSurface,
    ) -> DragOutcome {
        match &mut self.state {
            DragState::Idle => DragOutcome::Ignored,
            DragState::Pending(pending) => {
                let pending = pending.clone();
                self.check_activation(&pending, point, at, surface)
            }
            DragState::Active(active) if active.sensor == Sensor::Pointer => {
                let over = detect_over(&self.config, surface, &active.subject, point);
                active.over = over.clone();
                DragOutcome::Over(over)
            }
            DragState::Active(_) => DragOutcome::Ignored,
        }
    }

    /// Re-evaluates time-based activation (touch hold) without movement
    pub fn tick(&mut self, at: Instant, surface: &DropSurface) -> DragOutcome {
        match &self.state {
            DragState::Pending(pending) if pending.kind == PointerKind::Touch => {
                let pending = pending.clone();
                self.check_activation(&pending, pending.origin, at, surface)
            }
            _ => DragOutcome::Ignored,
        }
    }

    pub fn pointer_up(&mut self, point: Point, at: Instant, surface: &DropSurface) -> DragOutcome {
        if let DragState::Pending(pending) = &self.state {
            let pending = pending.clone();
            match self.check_activation(&pending, point, at, surface) {
                // Activated on release; drop right where it is.
                DragOutcome::Started(_) => {}
                DragOutcome::Pending => {
                    self.state = DragState::Idle;
                    return DragOutcome::Click(pending.token);
                }
                other => {
                    self.state = DragState::Idle;
                    return other;
                }
            }
        }

        match std::mem::take(&mut self.state) {
            DragState::Active(mut active) if active.sensor == Sensor::Pointer => {
                active.over = detect_over(&self.config, surface, &active.subject, point);
                finish(active)
            }
            other => {
                self.state = other;
                DragOutcome::Ignored
            }
        }
    }

    /// Keyboard sensor. `focused` is the token of the focused element, used
    /// to pick something up.
    pub fn key(&mut self, key: Key, focused: Option<&str>, board: &Board) -> DragOutcome {
        match std::mem::take(&mut self.state) {
            DragState::Idle => {
                if !key.is_activator() {
                    return DragOutcome::Ignored;
                }
                let Some(token) = focused.and_then(|raw| token::decode(raw).ok()) else {
                    return DragOutcome::Ignored;
                };
                self.activate(token, Sensor::Keyboard)
            }
            DragState::Active(mut active) => match key {
                Key::Escape => {
                    debug!(subject = ?active.subject, "drag cancelled");
                    DragOutcome::Cancelled
                }
                Key::Space | Key::Enter if active.sensor == Sensor::Keyboard => finish(active),
                arrow if arrow.is_arrow() && active.sensor == Sensor::Keyboard => {
                    let next = active.over.as_ref().map(|over| {
                        keyboard::next_target(board, &active.subject, over, arrow)
                    });
                    active.over = next.clone();
                    self.state = DragState::Active(active);
                    DragOutcome::Over(next)
                }
                _ => {
                    self.state = DragState::Active(active);
                    DragOutcome::Ignored
                }
            },
            pending @ DragState::Pending(_) => {
                if key == Key::Escape {
                    return DragOutcome::Aborted;
                }
                self.state = pending;
                DragOutcome::Ignored
            }
        }
    }

    /// Explicit cancel, e.g. the board losing focus
    pub fn cancel(&mut self) -> DragOutcome {
        match std::mem::take(&mut self.state) {
            DragState::Idle => DragOutcome::Ignored,
            DragState::Pending(_) => DragOutcome::Aborted,
            DragState::Active(active) => {
                debug!(subject = ?active.subject, "drag cancelled");
                DragOutcome::Cancelled
            }
        }
    }

    fn check_activation(
        &mut self,
        pending: &PendingDrag,
        point: Point,
        at: Instant,
        surface: &DropSurface,
    ) -> DragOutcome {
        let moved = pending.origin.distance_to(point);
        let ready = match pending.kind {
            PointerKind::Mouse => moved >= self.config.pointer_activation_distance,
            PointerKind::Touch => {
                let held = at.saturating_duration_since(pending.pressed_at);
                if moved > self.config.touch_tolerance {
                    if held < self.config.touch_activation_delay() {
                        // Treated as a scroll, not a drag.
                        self.state = DragState::Idle;
                        return DragOutcome::Aborted;
                    }
                    true
                } else {
                    held >= self.config.touch_activation_delay()
                }
            }
        };
        if !ready {
            return DragOutcome::Pending;
        }

        self.state = DragState::Idle;
        let outcome = self.activate(pending.token.clone(), Sensor::Pointer);
        if let DragState::Active(active) = &mut self.state {
            active.over = detect_over(&self.config, surface, &active.subject, point);
        }
        outcome
    }

    fn activate(&mut self, token: DragToken, sensor: Sensor) -> DragOutcome {
        let subject = match DragSubject::try_from(token.clone()) {
            Ok(subject) => subject,
            Err(_) => return DragOutcome::Ignored,
        };
        if self.locks.is_locked(&subject.key()) {
            debug!(key = %subject.key(), "subject has persistence in flight, drag refused");
            return DragOutcome::Aborted;
        }

        debug!(?subject, ?sensor, "drag started");
        // Keyboard drags begin hovering over the item they picked up.
        let over = match sensor {
            Sensor::Keyboard => Some(resolve_for(&subject, &token)),
            Sensor::Pointer => None,
        };
        self.state = DragState::Active(ActiveDrag {
            subject: subject.clone(),
            over,
            sensor,
        });
        DragOutcome::Started(subject)
    }
}

fn finish(active: ActiveDrag) -> DragOutcome {
    match active.over {
        Some(target) => {
            debug!(subject = ?active.subject, %target, "drag resolved");
            DragOutcome::Dropped(DropRequest {
                subject: active.subject,
                target,
            })
        }
        None => {
            debug!(subject = ?active.subject, "dropped outside any target");
            DragOutcome::Cancelled
        }
    }
}

fn detect_over(
    config: &SyncConfig,
    surface: &DropSurface,
    subject: &DragSubject,
    point: Point,
) -> Option<DropTarget> {
    surface
        .detect(config.collision, point, |_| true)
        .map(|hit| resolve_for(subject, hit))
}

/// Section drags only ever target sections: a card or placeholder stands
/// for the column it is in.
fn resolve_for(subject: &DragSubject, hit: &DragToken) -> DropTarget {
    match subject {
        DragSubject::Section { .. } => DragToken::Section {
            section_id: hit.section_id().clone(),
        },
        DragSubject::Task { .. } => hit.clone(),
    }
}
