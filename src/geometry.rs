//! Screen-space geometry primitives

use serde::{Deserialize, Serialize};

/// A point in screen coordinates (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Swaps width and height
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rectangle {
    pub top_left: Point,
    pub size: Size,
}

impl Rectangle {
    pub const fn new(top_left: Point, size: Size) -> Self {
        Self { top_left, size }
    }

    /// Convenience constructor from x, y, width, height
    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            top_left: Point { x, y },
            size: Size { width, height },
        }
    }

    /// Exclusive bottom-right corner
    pub fn bottom_right(&self) -> Point {
        Point {
            x: self.top_left.x + self.size.width,
            y: self.top_left.y + self.size.height,
        }
    }

    pub fn left(&self) -> i32 {
        self.top_left.x
    }

    pub fn top(&self) -> i32 {
        self.top_left.y
    }

    pub fn right(&self) -> i32 {
        self.bottom_right().x
    }

    pub fn bottom(&self) -> i32 {
        self.bottom_right().y
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.top_left.x as f32 + self.size.width as f32 / 2.0,
            self.top_left.y as f32 + self.size.height as f32 / 2.0,
        )
    }

    /// Whether the two share at least one pixel
    pub fn overlaps(&self, other: &Rectangle) -> bool {
        !self.size.is_empty()
            && !other.size.is_empty()
            && self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    pub fn contains(&self, other: &Rectangle) -> bool {
        other.left() >= self.left()
            && other.top() >= self.top()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Display orientation, in degrees of counter-clockwise rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Normal,
    Left,
    Inverted,
    Right,
}

impl Orientation {
    pub fn degrees(self) -> f32 {
        match self {
            Orientation::Normal => 0.0,
            Orientation::Left => 90.0,
            Orientation::Inverted => 180.0,
            Orientation::Right => 270.0,
        }
    }

    /// Whether this orientation swaps the display's width and height
    pub fn is_transposed(self) -> bool {
        matches!(self, Orientation::Left | Orientation::Right)
    }
}
