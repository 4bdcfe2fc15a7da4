//! Signed integer geometry used for window bounds and event locations.
//!
//! Origins are signed so a pointer dragged off the top-left of a window keeps
//! a meaningful local location.

/// A location in some window's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The same size anchored at the origin, i.e. the rect in its own space.
    pub fn local(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Shrinks the rect by `insets`; never produces a negative size.
    pub fn inset(&self, insets: Insets) -> Rect {
        let width = self.width.saturating_sub(insets.left.saturating_add(insets.right));
        let height = self
            .height
            .saturating_sub(insets.top.saturating_add(insets.bottom));
        Rect {
            x: self.x.saturating_add(insets.left),
            y: self.y.saturating_add(insets.top),
            width: width.max(0),
            height: height.max(0),
        }
    }
}

/// Edge distances, used for client areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Insets {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

impl Insets {
    pub const fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub const fn top(top: i32) -> Self {
        Self::new(top, 0, 0, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.left == 0 && self.bottom == 0 && self.right == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_half_open() {
        let r = Rect::new(10, 10, 5, 5);
        assert!(r.contains(Point::new(10, 10)));
        assert!(r.contains(Point::new(14, 14)));
        assert!(!r.contains(Point::new(15, 14)));
        assert!(!r.contains(Point::new(9, 10)));
    }

    #[test]
    fn inset_clamps_to_zero() {
        let r = Rect::new(0, 0, 10, 4);
        let shrunk = r.inset(Insets::new(3, 3, 3, 3));
        assert_eq!(shrunk, Rect::new(3, 3, 4, 0));
        assert!(shrunk.is_empty());
    }

    #[test]
    fn local_drops_origin() {
        assert_eq!(Rect::new(4, 5, 6, 7).local(), Rect::new(0, 0, 6, 7));
    }
}
