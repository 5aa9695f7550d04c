//! Geometric primitives for signature placement.

use serde::{Deserialize, Serialize};

/// A rectangle in PDF user-space units, stored as its four edges.
///
/// PDF user space grows upward, so `bottom < top` for a non-degenerate
/// rectangle. This matches the `[left bottom right top]` ordering of the
/// `/Rect` entry the rectangle is ultimately written into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge x-coordinate
    pub left: f32,
    /// Bottom edge y-coordinate
    pub bottom: f32,
    /// Right edge x-coordinate
    pub right: f32,
    /// Top edge y-coordinate
    pub top: f32,
}

impl Rect {
    /// Create a rectangle from its four edges.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_signet::geometry::Rect;
    ///
    /// let rect = Rect::new(250.0, 5.0, 550.0, 150.0);
    /// assert_eq!(rect.width(), 300.0);
    /// assert_eq!(rect.height(), 145.0);
    /// ```
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Get the width of the rectangle.
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Get the height of the rectangle.
    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Check that the rectangle has positive extent on both axes.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_signet::geometry::Rect;
    ///
    /// assert!(Rect::new(100.0, 50.0, 200.0, 150.0).is_valid());
    /// assert!(!Rect::new(100.0, 50.0, 100.0, 200.0).is_valid()); // zero width
    /// assert!(!Rect::new(100.0, 200.0, 300.0, 50.0).is_valid()); // inverted height
    /// ```
    pub fn is_valid(&self) -> bool {
        self.left < self.right && self.bottom < self.top
    }
}
