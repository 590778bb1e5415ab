//! Tri-color marking state with atomic, forward-only transitions.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Reachability classification used by the marker.
///
/// Colors are totally ordered (`White < Grey < Black`) and only move forward
/// within a collection cycle: discovery turns a white object grey, finishing
/// its children turns it black. The ordering is what lets
/// [`AtomicColor::compare_exchange`] reject regressions outright.
///
/// # Examples
///
/// ```
/// use trimark::color::Color;
///
/// assert!(Color::White < Color::Grey);
/// assert!(Color::Grey < Color::Black);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Color {
    /// Unvisited; garbage if still white at sweep time.
    White = 0,
    /// Visited, children pending on the gray queue.
    Grey = 1,
    /// Fully visited; survives the cycle.
    Black = 2,
}

impl Color {
    fn from_u8(raw: u8) -> Color {
        match raw {
            0 => Color::White,
            1 => Color::Grey,
            _ => Color::Black,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Grey => write!(f, "grey"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// Lock-free color cell shared by the marker, the write barrier, and the
/// driver.
///
/// Many independent writers update a node's color concurrently, so the color
/// is never guarded by a mutex; all phase-critical movement goes through
/// [`compare_exchange`](AtomicColor::compare_exchange). A plain
/// [`store`](AtomicColor::store) exists only for the non-contested cases:
/// initialization and the post-sweep reset.
///
/// # Examples
///
/// ```
/// use trimark::color::{AtomicColor, Color};
///
/// let color = AtomicColor::new(Color::White);
/// assert!(color.compare_exchange(Color::White, Color::Grey));
/// // A competing actor already advanced it; losing the race is not an error.
/// assert!(!color.compare_exchange(Color::White, Color::Grey));
/// assert_eq!(color.load(), Color::Grey);
/// ```
#[derive(Debug)]
pub struct AtomicColor(AtomicU8);

impl AtomicColor {
    pub fn new(color: Color) -> Self {
        AtomicColor(AtomicU8::new(color as u8))
    }

    /// Atomic load of the current color.
    pub fn load(&self) -> Color {
        Color::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Unconditional store. Reserved for initialization and the sweep-time
    /// reset, where no other actor can be racing on the cell.
    pub fn store(&self, color: Color) {
        self.0.store(color as u8, Ordering::Release);
    }

    /// Atomically advance from `old` to `new`. Returns `false` when another
    /// actor already moved the color, or when the transition would go
    /// backwards; neither case is an error.
    pub fn compare_exchange(&self, old: Color, new: Color) -> bool {
        if new < old {
            // Once marked, always marked: the wavefront only advances.
            return false;
        }
        self.0
            .compare_exchange(old as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicColor {
    fn default() -> Self {
        AtomicColor::new(Color::White)
    }
}
