//! Axis-aligned rectangles in world space.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle. Bounds are inclusive on every side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

/// The visible world rectangle for the current camera.
pub type Viewport = Rect;

impl Rect {
    /// Create a rectangle from its four bounds.
    pub const fn new(min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Smallest rectangle containing every point, or `None` for an empty input.
    pub fn from_points<I: IntoIterator<Item = Vec2>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Self::new(first.x, first.x, first.y, first.y);
        for p in iter {
            rect.min_x = rect.min_x.min(p.x);
            rect.max_x = rect.max_x.max(p.x);
            rect.min_y = rect.min_y.min(p.y);
            rect.max_y = rect.max_y.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    /// Check whether a point lies inside (boundary included).
    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Check whether two rectangles overlap (touching counts).
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Grow the rectangle by `padding` on every side.
    pub fn expand(&self, padding: f32) -> Self {
        Self::new(
            self.min_x - padding,
            self.max_x + padding,
            self.min_y - padding,
            self.max_y + padding,
        )
    }

    /// Split into four quadrants: NW, NE, SW, SE (y grows downward).
    pub fn quadrants(&self) -> [Rect; 4] {
        let c = self.center();
        [
            Rect::new(self.min_x, c.x, self.min_y, c.y),
            Rect::new(c.x, self.max_x, self.min_y, c.y),
            Rect::new(self.min_x, c.x, c.y, self.max_y),
            Rect::new(c.x, self.max_x, c.y, self.max_y),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_of_points() {
        let rect = Rect::from_points([
            Vec2::new(1.0, 5.0),
            Vec2::new(-3.0, 2.0),
            Vec2::new(4.0, -1.0),
        ])
        .unwrap();
        assert_eq!(rect, Rect::new(-3.0, 4.0, -1.0, 5.0));
        assert!(Rect::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn boundary_points_are_contained() {
        let rect = Rect::new(0.0, 10.0, 0.0, 10.0);
        assert!(rect.contains(Vec2::new(0.0, 10.0)));
        assert!(!rect.contains(Vec2::new(10.01, 5.0)));
    }

    #[test]
    fn expand_and_intersect() {
        let a = Rect::new(0.0, 10.0, 0.0, 10.0);
        let b = Rect::new(12.0, 20.0, 0.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.expand(2.0).intersects(&b));
    }

    #[test]
    fn quadrants_cover_parent() {
        let rect = Rect::new(0.0, 8.0, 0.0, 4.0);
        let q = rect.quadrants();
        assert_eq!(q[0], Rect::new(0.0, 4.0, 0.0, 2.0));
        assert_eq!(q[3], Rect::new(4.0, 8.0, 2.0, 4.0));
    }
}
