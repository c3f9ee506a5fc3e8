//! Region indexing.
//!
//! Cuts a tile grid into one rectangular region per sub-image. Every region
//! gets `grid / split` tiles in each direction; the leftover tiles go to the
//! last column and the last row, so the bottom-right region absorbs both
//! remainders.
//!
//! ```text
//!   grid 10x7, split 3x2  (base 3x3, remainder 1x1)
//!
//!        0     3     6       10
//!      0 ┌─────┬─────┬───────┐
//!        │ 1,1 │ 2,1 │  3,1  │
//!      3 ├─────┼─────┼───────┤
//!        │ 1,2 │ 2,2 │  3,2  │
//!        │     │     │       │
//!      7 └─────┴─────┴───────┘
//! ```

use std::fmt;

use crate::error::ConfigurationError;

use super::partition::SplitFactor;

// =============================================================================
// TileBox
// =============================================================================

/// Inclusive-exclusive rectangle of tile indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileBox {
    /// First tile column
    pub start_col: u32,

    /// First tile row
    pub start_row: u32,

    /// One past the last tile column
    pub end_col: u32,

    /// One past the last tile row
    pub end_row: u32,
}

impl TileBox {
    /// Number of tile columns covered.
    pub const fn cols(&self) -> u32 {
        self.end_col - self.start_col
    }

    /// Number of tile rows covered.
    pub const fn rows(&self) -> u32 {
        self.end_row - self.start_row
    }

    /// Number of tiles covered.
    pub const fn area(&self) -> u64 {
        self.cols() as u64 * self.rows() as u64
    }

    /// Whether the tile `(x, y)` lies inside the box.
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.start_col && x < self.end_col && y >= self.start_row && y < self.end_row
    }

    /// Whether two boxes share at least one tile.
    pub const fn overlaps(&self, other: &TileBox) -> bool {
        self.start_col < other.end_col
            && other.start_col < self.end_col
            && self.start_row < other.end_row
            && other.start_row < self.end_row
    }

    /// Iterate every tile index in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> {
        let (start_col, end_col) = (self.start_col, self.end_col);
        (self.start_row..self.end_row)
            .flat_map(move |y| (start_col..end_col).map(move |x| (x, y)))
    }
}

impl fmt::Display for TileBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{})x[{},{})",
            self.start_col, self.end_col, self.start_row, self.end_row
        )
    }
}

// =============================================================================
// TileRegion
// =============================================================================

/// One sub-image's share of the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRegion {
    /// 1-based column label
    pub column: u32,

    /// 1-based row label
    pub row: u32,

    /// Tiles this region covers
    pub tiles: TileBox,
}

impl TileRegion {
    /// Identifier for the sub-image cut from slide `slide_name`.
    ///
    /// Formatted as `<slide>_<column>_<row>`.
    pub fn identifier(&self, slide_name: &str) -> String {
        format!("{}_{}_{}", slide_name, self.column, self.row)
    }

    /// Pixel dimensions of the stitched raster for this region.
    pub const fn pixel_size(&self, tile_size: u32) -> (u32, u32) {
        (self.tiles.cols() * tile_size, self.tiles.rows() * tile_size)
    }

    /// Number of tiles to fetch.
    pub const fn tile_count(&self) -> u64 {
        self.tiles.area()
    }
}

impl fmt::Display for TileRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {}", self.column, self.row, self.tiles)
    }
}

// =============================================================================
// Indexing
// =============================================================================

/// Cut a `tiles_x` x `tiles_y` grid into regions for `split`.
///
/// Regions are returned in row-major order. The result depends only on the
/// arguments.
///
/// # Errors
///
/// - [`ConfigurationError::EmptyGrid`] if the grid has no tiles
/// - [`ConfigurationError::GridTooSmall`] if the split has more columns or
///   rows than the grid, which would leave regions without tiles
pub fn regions(
    split: SplitFactor,
    tiles_x: u32,
    tiles_y: u32,
) -> Result<Vec<TileRegion>, ConfigurationError> {
    if tiles_x == 0 || tiles_y == 0 {
        return Err(ConfigurationError::EmptyGrid);
    }
    if split.columns == 0 || split.rows == 0 {
        return Err(ConfigurationError::NoImages);
    }

    let base_cols = tiles_x / split.columns;
    let base_rows = tiles_y / split.rows;
    if base_cols == 0 || base_rows == 0 {
        return Err(ConfigurationError::GridTooSmall {
            columns: split.columns,
            rows: split.rows,
            tiles_x,
            tiles_y,
        });
    }
    let rem_cols = tiles_x % split.columns;
    let rem_rows = tiles_y % split.rows;

    let mut out = Vec::with_capacity(split.count() as usize);
    for row in 0..split.rows {
        for col in 0..split.columns {
            let start_col = col * base_cols;
            let start_row = row * base_rows;

            let mut end_col = start_col + base_cols;
            let mut end_row = start_row + base_rows;
            if col == split.columns - 1 {
                end_col += rem_cols;
            }
            if row == split.rows - 1 {
                end_row += rem_rows;
            }

            out.push(TileRegion {
                column: col + 1,
                row: row + 1,
                tiles: TileBox {
                    start_col,
                    start_row,
                    end_col,
                    end_row,
                },
            });
        }
    }

    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
