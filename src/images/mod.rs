//! Progressive image extraction.
//!
//! Images in a direct-mode document start as placeholders. The
//! [`ImageEngine`] extracts them from the archive in viewport order under a
//! concurrency budget, and re-plans when the reader scrolls.
//!
//! ```text
//! Pending ──► Queued ──► Extracting ──► Displayed
//!    ▲          │              │
//!    └─abandon──┘              └──────► Failed
//! ```

mod engine;

pub use engine::{ImageEngine, Partition};

use std::fmt;

/// Position of an image placeholder in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "img#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Pending,
    Queued,
    Extracting,
    Displayed,
    /// The archive could not produce the image. Terminal.
    Failed,
}

impl ImageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Displayed | Self::Failed)
    }
}

/// Vertical extent of a placeholder on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub top: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Visible region of the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub top: f64,
    pub height: f64,
}

impl Viewport {
    /// Viewport covering the whole document.
    pub const UNBOUNDED: Self = Self {
        top: 0.0,
        height: f64::INFINITY,
    };

    /// Whether `bounds` intersects the viewport grown by `margin` on both sides.
    pub fn contains(&self, bounds: Bounds, margin: f64) -> bool {
        let top = self.top - margin;
        let bottom = self.top + self.height + margin;
        bounds.top <= bottom && bounds.top + bounds.height >= top
    }

    /// Grow the viewport by `amount` in one direction.
    pub fn extend(self, direction: ScrollDirection, amount: f64) -> Self {
        match direction {
            ScrollDirection::Down => Self {
                top: self.top,
                height: self.height + amount,
            },
            ScrollDirection::Up => Self {
                top: self.top - amount,
                height: self.height + amount,
            },
        }
    }
}

/// An image placeholder found in a transformed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlaceholder {
    pub node: NodeId,
    /// Resolved archive path.
    pub path: String,
}

/// Engine bookkeeping for one placeholder.
#[derive(Debug, Clone)]
pub struct ImageQueueEntry {
    pub node: NodeId,
    pub source_path: String,
    pub queued: bool,
    pub state: ImageState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_contains() {
        let vp = Viewport {
            top: 100.0,
            height: 100.0,
        };
        let inside = Bounds {
            top: 150.0,
            height: 10.0,
        };
        let below = Bounds {
            top: 250.0,
            height: 10.0,
        };
        let straddling = Bounds {
            top: 90.0,
            height: 20.0,
        };
        assert!(vp.contains(inside, 0.0));
        assert!(vp.contains(straddling, 0.0));
        assert!(!vp.contains(below, 0.0));
        assert!(vp.contains(below, 60.0));
    }

    #[test]
    fn test_viewport_extend() {
        let vp = Viewport {
            top: 500.0,
            height: 100.0,
        };
        assert_eq!(
            vp.extend(ScrollDirection::Down, 200.0),
            Viewport {
                top: 500.0,
                height: 300.0
            }
        );
        assert_eq!(
            vp.extend(ScrollDirection::Up, 200.0),
            Viewport {
                top: 300.0,
                height: 300.0
            }
        );
    }

    #[test]
    fn test_unbounded_contains_everything() {
        let far = Bounds {
            top: 1.0e9,
            height: 10.0,
        };
        assert!(Viewport::UNBOUNDED.contains(far, 0.0));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ImageState::Displayed.is_terminal());
        assert!(ImageState::Failed.is_terminal());
        assert!(!ImageState::Queued.is_terminal());
    }
}
