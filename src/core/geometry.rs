//! Grid coordinates and rectangles.
//!
//! Coordinates are 16-bit like the console's `COORD`; rectangles are
//! inclusive on all four edges like `SMALL_RECT`. Widths and heights are
//! computed in `i32` so they cannot wrap.

/// A cell position
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Grid or buffer dimensions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i16,
    pub height: i16,
}

impl Size {
    pub const fn new(width: i16, height: i16) -> Self {
        Self { width, height }
    }

    /// Whole area as an inclusive rectangle
    pub fn to_rect(self) -> Rect {
        Rect::new(0, 0, self.width.saturating_sub(1), self.height.saturating_sub(1))
    }

    pub fn contains(&self, at: Point) -> bool {
        at.x >= 0 && at.y >= 0 && at.x < self.width && at.y < self.height
    }

    pub fn area(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize
    }
}

/// Inclusive rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl Rect {
    pub const fn new(left: i16, top: i16, right: i16, bottom: i16) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle of `size` cells with its top-left corner at `origin`.
    pub fn from_origin(origin: Point, size: Size) -> Self {
        let right = (origin.x as i32 + size.width as i32 - 1).clamp(i16::MIN as i32, i16::MAX as i32);
        let bottom = (origin.y as i32 + size.height as i32 - 1).clamp(i16::MIN as i32, i16::MAX as i32);
        Self::new(origin.x, origin.y, right as i16, bottom as i16)
    }

    /// Zero-area rectangle anchored at `origin`.
    pub fn empty_at(origin: Point) -> Self {
        match (origin.x.checked_sub(1), origin.y.checked_sub(1)) {
            (Some(right), Some(bottom)) => Self::new(origin.x, origin.y, right, bottom),
            _ => Self::new(0, 0, -1, -1),
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn width(&self) -> i32 {
        self.right as i32 - self.left as i32 + 1
    }

    pub fn height(&self) -> i32 {
        self.bottom as i32 - self.top as i32 + 1
    }

    /// Positive width and height
    pub fn is_valid(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    pub fn area(&self) -> usize {
        if self.is_valid() {
            self.width() as usize * self.height() as usize
        } else {
            0
        }
    }

    pub fn contains(&self, at: Point) -> bool {
        at.x >= self.left && at.x <= self.right && at.y >= self.top && at.y <= self.bottom
    }

    /// Intersection with a grid of `bounds`; may come back invalid.
    pub fn clamp(&self, bounds: Size) -> Rect {
        Rect::new(
            self.left.max(0),
            self.top.max(0),
            self.right.min(bounds.width.saturating_sub(1)),
            self.bottom.min(bounds.height.saturating_sub(1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_dimensions() {
        let rect = Rect::new(2, 3, 4, 3);
        assert_eq!(rect.width(), 3);
        assert_eq!(rect.height(), 1);
        assert_eq!(rect.area(), 3);
        assert!(rect.is_valid());
    }

    #[test]
    fn test_clamp_to_bounds() {
        let bounds = Size::new(10, 5);
        assert_eq!(Rect::new(-2, -1, 3, 2).clamp(bounds), Rect::new(0, 0, 3, 2));
        assert_eq!(Rect::new(8, 3, 20, 9).clamp(bounds), Rect::new(8, 3, 9, 4));
        assert!(!Rect::new(10, 0, 12, 1).clamp(bounds).is_valid());
        assert!(!Rect::new(-5, 0, -1, 1).clamp(bounds).is_valid());
    }

    #[test]
    fn test_empty_at() {
        let rect = Rect::empty_at(Point::new(4, 7));
        assert_eq!(rect.origin(), Point::new(4, 7));
        assert_eq!(rect.area(), 0);
        assert!(!Rect::empty_at(Point::new(i16::MIN, 0)).is_valid());
    }

    #[test]
    fn test_from_origin() {
        let rect = Rect::from_origin(Point::new(1, 1), Size::new(3, 2));
        assert_eq!(rect, Rect::new(1, 1, 3, 2));
        assert_eq!(Size::new(4, 2).to_rect(), Rect::new(0, 0, 3, 1));
    }
}
