//! Drag session handling: input sensors, hit testing and the session
//! state machine.

pub mod collision;
pub mod controller;
pub mod keyboard;

pub use collision::{DropSurface, Droppable, Point, Rect};
pub use controller::{DragController, DragOutcome, DragState, DropRequest, PointerKind, Sensor};
pub use keyboard::Key;
