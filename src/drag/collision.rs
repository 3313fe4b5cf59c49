//! Hit testing for drop targets.

use crate::config::CollisionStrategy;
use crate::domain::DragToken;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle in board coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// A rendered drop target
#[derive(Debug, Clone, PartialEq)]
pub struct Droppable {
    pub token: DragToken,
    pub rect: Rect,
}

/// Every drop target currently on screen, as laid out by the renderer
#[derive(Debug, Clone, Default)]
pub struct DropSurface {
    droppables: Vec<Droppable>,
}

impl DropSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: DragToken, rect: Rect) -> Self {
        self.add(token, rect);
        self
    }

    pub fn add(&mut self, token: DragToken, rect: Rect) {
        self.droppables.push(Droppable { token, rect });
    }

    pub fn is_empty(&self) -> bool {
        self.droppables.is_empty()
    }

    /// Finds the target under `point`, considering only droppables `accept`
    /// allows.
    pub fn detect(
        &self,
        strategy: CollisionStrategy,
        point: Point,
        accept: impl Fn(&DragToken) -> bool,
    ) -> Option<&DragToken> {
        let candidates = self.droppables.iter().filter(|d| accept(&d.token));

        let hit = match strategy {
            // Smallest containing rect wins, so a card beats the column it
            // sits in and the whole column still counts when no card is hit.
            CollisionStrategy::PointerWithin => candidates
                .filter(|d| d.rect.contains(point))
                .min_by(|a, b| a.rect.area().total_cmp(&b.rect.area())),
            CollisionStrategy::ClosestCenter => candidates.min_by(|a, b| {
                a.rect
                    .center()
                    .distance_to(point)
                    .total_cmp(&b.rect.center().distance_to(point))
            }),
        };
        hit.map(|d| &d.token)
    }
}
