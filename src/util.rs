// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Utils of rect algebra and size rounding used by the texture
//! and surface subsystem

use serde::{Deserialize, Serialize};
use std::cmp::{max, min};

/// pixel rectangle, top-left origin
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Rect {
        Rect { x, y, w, h }
    }

    pub fn is_empty(self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn right(self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(self) -> i32 {
        self.y + self.h as i32
    }

    pub fn contains(self, other: Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn contains_point(self, px: i32, py: i32) -> bool {
        px >= self.x && py >= self.y && px < self.right() && py < self.bottom()
    }

    /// bounding union, an empty rect is the identity
    pub fn union(self, other: Rect) -> Rect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let x = min(self.x, other.x);
        let y = min(self.y, other.y);
        let r = max(self.right(), other.right());
        let b = max(self.bottom(), other.bottom());
        Rect::new(x, y, (r - x) as u32, (b - y) as u32)
    }

    /// intersection, empty when the rects are disjoint
    pub fn intersect(self, other: Rect) -> Rect {
        let x = max(self.x, other.x);
        let y = max(self.y, other.y);
        let r = min(self.right(), other.right());
        let b = min(self.bottom(), other.bottom());
        if r <= x || b <= y {
            return Rect::default();
        }
        Rect::new(x, y, (r - x) as u32, (b - y) as u32)
    }
}

/// smallest power of two >= n, used for texture padding on
/// contexts without NPOT support
pub fn next_power_of_two(n: u32) -> u32 {
    if n == 0 {
        return 1;
    }
    let mut p = 1u32;
    while p < n {
        p <<= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_identity() {
        let a = Rect::new(10, 20, 30, 40);
        assert_eq!(Rect::default().union(a), a);
        assert_eq!(a.union(Rect::default()), a);
        // same rect twice yields the same rect
        assert_eq!(a.union(a), a);
    }

    #[test]
    fn test_union_disjoint() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 30, 5, 5);
        let u = a.union(b);
        assert_eq!(u, Rect::new(0, 0, 25, 35));
        assert!(u.contains(a));
        assert!(u.contains(b));
    }

    #[test]
    fn test_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(b), Rect::new(5, 5, 5, 5));
        let c = Rect::new(100, 100, 5, 5);
        assert!(a.intersect(c).is_empty());
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(2), 2);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(320), 512);
        assert_eq!(next_power_of_two(512), 512);
        assert_eq!(next_power_of_two(513), 1024);
    }
}
