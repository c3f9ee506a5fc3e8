//! PyramidSource trait for format-agnostic tile access.
//!
//! This module defines the `PyramidSource` trait, the capability the splitter
//! consumes: a read-only view of a multi-resolution tile pyramid plus the
//! slide's metadata.
//!
//! # Level Numbering
//!
//! Levels follow the Deep Zoom convention: level 0 is the coarsest image and
//! `level_count() - 1` is full resolution. The splitter always works on the
//! last level.
//!
//! # Implementations
//!
//! - [`crate::slide::DeepZoomSource`] for Deep Zoom tile directories
//! - [`crate::slide::RasterSource`] for a single decoded raster
//! - [`crate::slide::SlideSource`] dispatching between the two

use async_trait::async_trait;
use image::RgbImage;

use crate::error::SourceError;

use super::metadata::SlideMetadata;

// =============================================================================
// Level Information
// =============================================================================

/// Information about a single pyramid level.
///
/// This struct provides a snapshot of level metadata that can be queried
/// without async operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Edge length of the square tiles in pixels
    pub tile_size: u32,

    /// Number of tiles in X direction
    pub tiles_x: u32,

    /// Number of tiles in Y direction
    pub tiles_y: u32,
}

impl LevelInfo {
    /// Build level info from pixel dimensions, deriving the tile grid.
    ///
    /// The grid is `ceil(dimension / tile_size)` in each direction.
    pub fn from_dimensions(width: u32, height: u32, tile_size: u32) -> Self {
        let tile_size = tile_size.max(1);
        Self {
            width,
            height,
            tile_size,
            tiles_x: width.div_ceil(tile_size),
            tiles_y: height.div_ceil(tile_size),
        }
    }

    /// Total number of tiles in this level.
    pub fn tile_total(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }
}

// =============================================================================
// PyramidSource Trait
// =============================================================================

/// Read-only access to a tiled image pyramid.
///
/// Implementations must be safe to share across tasks: the splitter fetches
/// tiles for many regions concurrently from one source.
#[async_trait]
pub trait PyramidSource: Send + Sync {
    /// Get the number of pyramid levels.
    fn level_count(&self) -> usize;

    /// Get dimensions of a specific level.
    ///
    /// Returns `(width, height)` in pixels, or `None` if level is out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Get the number of tiles in X and Y directions for a level.
    ///
    /// Returns `(tiles_x, tiles_y)`, or `None` if level is out of range.
    fn tile_count(&self, level: usize) -> Option<(u32, u32)>;

    /// Edge length of the square tiles, identical for every level.
    fn tile_size(&self) -> u32;

    /// Slide properties carried alongside the pixels.
    fn metadata(&self) -> &SlideMetadata;

    /// Get complete information about a level.
    ///
    /// Returns `None` if level is out of range.
    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let (tiles_x, tiles_y) = self.tile_count(level)?;

        Some(LevelInfo {
            width,
            height,
            tile_size: self.tile_size(),
            tiles_x,
            tiles_y,
        })
    }

    /// Index of the full-resolution level.
    fn deepest_level(&self) -> Option<usize> {
        self.level_count().checked_sub(1)
    }

    /// Read one tile as an RGB raster.
    ///
    /// Tiles are at most `tile_size` on each edge. Whether edge tiles are
    /// padded to the full size is up to the source.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Level is out of range
    /// - Tile coordinates are out of range
    /// - The tile cannot be read or decoded
    async fn read_tile(&self, level: usize, tile_x: u32, tile_y: u32)
        -> Result<RgbImage, SourceError>;
}

/// Check a tile request against the source's level table.
///
/// Shared by the concrete sources so out-of-range requests fail identically.
pub fn check_tile_bounds<S: PyramidSource + ?Sized>(
    source: &S,
    level: usize,
    tile_x: u32,
    tile_y: u32,
) -> Result<(), SourceError> {
    let max_levels = source.level_count();
    let (max_x, max_y) = source
        .tile_count(level)
        .ok_or(SourceError::InvalidLevel { level, max_levels })?;

    if tile_x >= max_x || tile_y >= max_y {
        return Err(SourceError::TileOutOfBounds {
            level,
            x: tile_x,
            y: tile_y,
            max_x,
            max_y,
        });
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
