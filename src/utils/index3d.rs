//! Flat addressing of width × height × depth tensors.

use std::fmt;

/// Shape of a 3D tensor stored as a flat buffer.
///
/// Elements are laid out channel-major, then row-major inside each channel:
/// `index = (z * height + y) * width + x`. Layers compute every index they
/// need once, while building their links, so the hot paths only ever see
/// plain `usize` offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Index3D {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Index3D {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Flat offset of `(x, y, z)`.
    ///
    /// Coordinates are checked in debug builds only.
    #[inline]
    pub fn get_index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.width, "x={} out of width {}", x, self.width);
        debug_assert!(y < self.height, "y={} out of height {}", y, self.height);
        debug_assert!(z < self.depth, "z={} out of depth {}", z, self.depth);
        (z * self.height + y) * self.width + x
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Number of elements in one channel.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for Index3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}
