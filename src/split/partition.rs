//! Grid partitioning.
//!
//! Turns a requested sub-image count and the tile grid's aspect ratio into a
//! split factor: how many sub-images span the grid horizontally and
//! vertically.
//!
//! The rule only covers two cases:
//! - a single image, split `1x1`
//! - an even count on a grid twice as wide as it is tall, split
//!   `(count / 2) x 2`
//!
//! Every other combination is a [`ConfigurationError`].

use std::fmt;

use crate::error::ConfigurationError;

// =============================================================================
// GridAspect
// =============================================================================

/// Normalized aspect ratio of a tile grid.
///
/// The shorter side is 1 and the longer side is the rounded ratio between
/// the two, so a 10x7 grid is `1:1` and a 20x9 grid is `2:1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridAspect {
    /// Horizontal share
    pub wide: u32,

    /// Vertical share
    pub tall: u32,
}

impl GridAspect {
    /// Create an aspect from explicit shares.
    pub const fn new(wide: u32, tall: u32) -> Self {
        Self { wide, tall }
    }

    /// Derive the aspect of a `width` x `height` tile grid.
    ///
    /// Ratios exactly halfway between two integers round to the even one.
    pub fn from_grid(width: u32, height: u32) -> Result<Self, ConfigurationError> {
        if width == 0 || height == 0 {
            return Err(ConfigurationError::EmptyGrid);
        }

        if width < height {
            let ratio = (height as f64 / width as f64).round_ties_even() as u32;
            Ok(Self::new(1, ratio))
        } else {
            let ratio = (width as f64 / height as f64).round_ties_even() as u32;
            Ok(Self::new(ratio, 1))
        }
    }

    /// The aspect as a `(wide, tall)` pair.
    pub const fn as_pair(&self) -> (u32, u32) {
        (self.wide, self.tall)
    }
}

impl fmt::Display for GridAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.wide, self.tall)
    }
}

// =============================================================================
// SplitFactor
// =============================================================================

/// Number of sub-images across and down the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SplitFactor {
    /// Sub-images per row
    pub columns: u32,

    /// Sub-images per column
    pub rows: u32,
}

impl SplitFactor {
    /// Create a split factor from explicit counts.
    pub const fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Total number of sub-images.
    pub const fn count(&self) -> u32 {
        self.columns * self.rows
    }

    /// Choose the split factor for `requested` sub-images.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::NoImages`] for a count of zero
    /// - [`ConfigurationError::UnsupportedSplit`] for any count/aspect pair
    ///   the rule does not cover
    pub fn for_count(requested: u32, aspect: GridAspect) -> Result<Self, ConfigurationError> {
        if requested == 0 {
            return Err(ConfigurationError::NoImages);
        }

        if requested == 1 {
            return Ok(Self::new(1, 1));
        }

        if requested % 2 == 0 && aspect == GridAspect::new(2, 1) {
            let columns = requested / 2;
            let rows = requested / columns;
            return Ok(Self::new(columns, rows));
        }

        Err(ConfigurationError::UnsupportedSplit {
            requested,
            aspect: aspect.as_pair(),
        })
    }
}

impl fmt::Display for SplitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

// =============================================================================
// Tests
// =============================================================================
