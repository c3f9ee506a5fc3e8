//! Test utilities for integration tests.
//!
//! This module provides synthetic pyramid sources, a Deep Zoom directory
//! builder and a small TIFF reader for checking emitted pyramids.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use wsi_splitter::error::{IoError, SourceError};
use wsi_splitter::slide::{
    check_tile_bounds, level_dimensions, max_level, DeepZoomDescriptor, LevelInfo, PyramidSource,
    SlideMetadata,
};

// =============================================================================
// Scratch Directories
// =============================================================================

#[path = "../../src/test_support.rs"]
mod test_support;

pub use test_support::ScratchDir;

// =============================================================================
// Tile Patterns
// =============================================================================

/// Color identifying tile `(x, y)`.
pub fn tile_color(x: u32, y: u32) -> Rgb<u8> {
    Rgb([(x * 20 % 256) as u8, (y * 20 % 256) as u8, 200])
}

/// A solid tile in the color of `(x, y)`.
pub fn solid_tile(x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, tile_color(x, y))
}

// =============================================================================
// Pattern Source
// =============================================================================

/// Single-level source whose tiles are solid colors derived from their
/// coordinates.
///
/// Tracks every read, can fail chosen tiles permanently, and can fail the
/// first N reads of any tile with a transient filesystem error.
#[derive(Debug)]
pub struct PatternSource {
    level: LevelInfo,
    metadata: SlideMetadata,
    broken: HashSet<(u32, u32)>,
    transient_failures: usize,
    reads: AtomicUsize,
    attempts: Mutex<HashMap<(u32, u32), usize>>,
}

impl PatternSource {
    /// A `tiles_x` x `tiles_y` grid of full tiles.
    pub fn new(tiles_x: u32, tiles_y: u32, tile_size: u32) -> Self {
        Self::with_dimensions(tiles_x * tile_size, tiles_y * tile_size, tile_size)
    }

    /// A level of the given pixel size; the last column and row may be partial.
    pub fn with_dimensions(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            level: LevelInfo::from_dimensions(width, height, tile_size),
            metadata: SlideMetadata::empty(),
            broken: HashSet::new(),
            transient_failures: 0,
            reads: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_broken_tile(mut self, x: u32, y: u32) -> Self {
        self.broken.insert((x, y));
        self
    }

    pub fn with_transient_failures(mut self, failures: usize) -> Self {
        self.transient_failures = failures;
        self
    }

    pub fn with_metadata(mut self, metadata: SlideMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Total tile reads, successful or not.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PyramidSource for PatternSource {
    fn level_count(&self) -> usize {
        1
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        (level == 0).then_some((self.level.width, self.level.height))
    }

    fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        (level == 0).then_some((self.level.tiles_x, self.level.tiles_y))
    }

    fn tile_size(&self) -> u32 {
        self.level.tile_size
    }

    fn metadata(&self) -> &SlideMetadata {
        &self.metadata
    }

    async fn read_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RgbImage, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        check_tile_bounds(self, level, tile_x, tile_y)?;

        if self.broken.contains(&(tile_x, tile_y)) {
            return Err(SourceError::Decode {
                message: format!("corrupt tile {}_{}", tile_x, tile_y),
            });
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry((tile_x, tile_y)).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt <= self.transient_failures {
            return Err(SourceError::Io(IoError::Fs {
                path: format!("{}_{}", tile_x, tile_y),
                message: "resource temporarily unavailable".to_string(),
            }));
        }

        let ts = self.level.tile_size;
        let width = ts.min(self.level.width - tile_x * ts);
        let height = ts.min(self.level.height - tile_y * ts);
        Ok(solid_tile(tile_x, tile_y, width, height))
    }
}

// =============================================================================
// Deep Zoom Builder
// =============================================================================

/// Write `<dir>/<stem>.dzi` and a full `<stem>_files` tile tree.
///
/// Every tile is a solid color from [`tile_color`] and sized like a real
/// Deep Zoom tile (edge tiles are cropped). Returns the descriptor path.
pub fn write_deepzoom(
    dir: &Path,
    stem: &str,
    width: u32,
    height: u32,
    tile_size: u32,
    format: &str,
) -> PathBuf {
    let descriptor = DeepZoomDescriptor {
        width,
        height,
        tile_size,
        overlap: 0,
        format: format.to_string(),
    };
    let dzi = dir.join(format!("{}.dzi", stem));
    std::fs::write(&dzi, descriptor.to_xml()).unwrap();

    let top = max_level(width, height);
    for level in 0..=top {
        let (w, h) = level_dimensions(width, height, level, top);
        let level_dir = dir.join(format!("{}_files", stem)).join(level.to_string());
        std::fs::create_dir_all(&level_dir).unwrap();

        for y in 0..h.div_ceil(tile_size) {
            for x in 0..w.div_ceil(tile_size) {
                let tw = tile_size.min(w - x * tile_size);
                let th = tile_size.min(h - y * tile_size);
                solid_tile(x, y, tw, th)
                    .save(level_dir.join(format!("{}_{}.{}", x, y, format)))
                    .unwrap();
            }
        }
    }

    dzi
}

// =============================================================================
// TIFF Reader
// =============================================================================

/// One directory of a classic little-endian TIFF, numeric values only.
#[derive(Debug, Default)]
pub struct TestIfd {
    pub entries: HashMap<u16, Vec<u64>>,
    pub ascii: HashMap<u16, String>,
}

impl TestIfd {
    pub fn value(&self, tag: u16) -> Option<u64> {
        self.entries.get(&tag).and_then(|v| v.first().copied())
    }
}

fn u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Whether `data` starts with a BigTIFF header.
pub fn is_bigtiff(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..2] == b"II" && u16_at(data, 2) == 43
}

/// Parse every IFD of a classic little-endian TIFF.
pub fn read_ifds(data: &[u8]) -> Vec<TestIfd> {
    assert_eq!(&data[0..2], b"II", "expected little-endian TIFF");
    assert_eq!(u16_at(data, 2), 42, "expected classic TIFF");

    let mut ifds = Vec::new();
    let mut offset = u32_at(data, 4) as usize;
    while offset != 0 {
        let count = u16_at(data, offset) as usize;
        let mut ifd = TestIfd::default();

        for i in 0..count {
            let entry = offset + 2 + i * 12;
            let tag = u16_at(data, entry);
            let field_type = u16_at(data, entry + 2);
            let n = u32_at(data, entry + 4) as usize;
            let size = match field_type {
                2 => 1,
                3 => 2,
                4 => 4,
                5 => 8,
                _ => panic!("unexpected field type {}", field_type),
            };
            let start = if size * n <= 4 {
                entry + 8
            } else {
                u32_at(data, entry + 8) as usize
            };

            match field_type {
                2 => {
                    let raw = &data[start..start + n];
                    let text = raw.split(|b| *b == 0).next().unwrap_or_default();
                    ifd.ascii
                        .insert(tag, String::from_utf8_lossy(text).into_owned());
                }
                3 => {
                    let values = (0..n).map(|k| u16_at(data, start + k * 2) as u64);
                    ifd.entries.insert(tag, values.collect());
                }
                4 => {
                    let values = (0..n).map(|k| u32_at(data, start + k * 4) as u64);
                    ifd.entries.insert(tag, values.collect());
                }
                _ => {
                    // Rationals as numerator, denominator pairs
                    let values = (0..n * 2).map(|k| u32_at(data, start + k * 4) as u64);
                    ifd.entries.insert(tag, values.collect());
                }
            }
        }

        ifds.push(ifd);
        offset = u32_at(data, offset + 2 + count * 12) as usize;
    }

    ifds
}
