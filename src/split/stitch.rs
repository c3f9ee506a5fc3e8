//! Region stitching.
//!
//! Rebuilds one sub-image from the tiles its region covers. The canvas is
//! allocated at the region's full tile extent and zero-filled, then every
//! tile is pasted at its offset from the region's top-left tile. Offsets of
//! distinct tiles never overlap, so fetch order does not matter.
//!
//! A region either stitches completely or fails as a unit; a partially
//! filled canvas is never handed out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use image::{ImageFormat, RgbImage};
use tracing::debug;

use crate::error::{IoError, RegionError, SinkError, SourceError};
use crate::slide::PyramidSource;

use super::region::TileRegion;

/// Base delay between tile fetch attempts; multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

// =============================================================================
// Save Format
// =============================================================================

/// Raster encoding used when saving stitched sub-images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SaveFormat {
    /// Lossy JPEG
    #[default]
    Jpeg,

    /// Lossless PNG
    Png,

    /// Uncompressed TIFF
    Tiff,
}

impl SaveFormat {
    /// File extension without the dot.
    pub const fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Jpeg => "jpeg",
            SaveFormat::Png => "png",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Matching `image` encoder.
    pub const fn image_format(&self) -> ImageFormat {
        match self {
            SaveFormat::Jpeg => ImageFormat::Jpeg,
            SaveFormat::Png => ImageFormat::Png,
            SaveFormat::Tiff => ImageFormat::Tiff,
        }
    }
}

/// Where and how stitched sub-images are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    /// Output directory
    pub dir: PathBuf,

    /// Raster encoding
    pub format: SaveFormat,
}

impl SaveTarget {
    pub fn new(dir: impl Into<PathBuf>, format: SaveFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// Path of the file for `identifier`: `<dir>/<identifier>.<ext>`.
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", identifier, self.format.extension()))
    }

    /// Encode and write one raster, returning it together with the path.
    ///
    /// Runs on the blocking pool; the raster is moved in and handed back so
    /// no copy is made.
    pub async fn save(
        &self,
        identifier: &str,
        image: RgbImage,
    ) -> Result<(RgbImage, PathBuf), SinkError> {
        let path = self.path_for(identifier);
        let format = self.format.image_format();

        let task_path = path.clone();
        let (image, result) = tokio::task::spawn_blocking(move || {
            let result = image.save_with_format(&task_path, format);
            (image, result)
        })
        .await
        .map_err(|e| SinkError::Encode {
            message: format!("save task failed: {}", e),
        })?;

        result.map_err(|e| save_error(&path, e))?;
        Ok((image, path))
    }
}

fn save_error(path: &Path, err: image::ImageError) -> SinkError {
    match err {
        image::ImageError::IoError(io) => SinkError::Io(IoError::from_std(path, &io)),
        other => SinkError::Encode {
            message: format!("{}: {}", path.display(), other),
        },
    }
}

// =============================================================================
// StitchedImage
// =============================================================================

/// A fully assembled sub-image.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchedImage {
    identifier: String,
    region: TileRegion,
    image: RgbImage,
    saved_to: Option<PathBuf>,
}

impl StitchedImage {
    /// `<slide>_<column>_<row>`
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The region this image was cut from.
    pub fn region(&self) -> &TileRegion {
        &self.region
    }

    /// The assembled pixels.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Take ownership of the pixels.
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// File written for this image, if saving was enabled.
    pub fn saved_to(&self) -> Option<&Path> {
        self.saved_to.as_deref()
    }
}

// =============================================================================
// RegionStitcher
// =============================================================================

/// Stitches regions of one pyramid level.
///
/// Cheap to clone; clones share the source.
#[derive(Debug)]
pub struct RegionStitcher<S: ?Sized> {
    source: Arc<S>,
    level: usize,
    tile_size: u32,
    slide_name: String,
    retries: u32,
    save: Option<SaveTarget>,
}

impl<S: ?Sized> Clone for RegionStitcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            level: self.level,
            tile_size: self.tile_size,
            slide_name: self.slide_name.clone(),
            retries: self.retries,
            save: self.save.clone(),
        }
    }
}

impl<S: PyramidSource + ?Sized> RegionStitcher<S> {
    /// Create a stitcher reading tiles of `level` from `source`.
    ///
    /// `slide_name` prefixes every identifier this stitcher produces.
    pub fn new(source: Arc<S>, level: usize, slide_name: impl Into<String>) -> Self {
        let tile_size = source.tile_size();
        Self {
            source,
            level,
            tile_size,
            slide_name: slide_name.into(),
            retries: 0,
            save: None,
        }
    }

    /// Retry transient tile fetch failures up to `retries` extra times.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Write every stitched image to `target`.
    pub fn with_save(mut self, target: Option<SaveTarget>) -> Self {
        self.save = target;
        self
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn slide_name(&self) -> &str {
        &self.slide_name
    }

    /// Stitch one region.
    ///
    /// # Errors
    ///
    /// Fails if any covered tile cannot be fetched, or if saving is enabled
    /// and the write fails. The save is attempted once.
    pub async fn stitch(&self, region: TileRegion) -> Result<StitchedImage, RegionError> {
        let (width, height) = region.pixel_size(self.tile_size);
        let mut canvas = RgbImage::new(width, height);

        debug!(
            column = region.column,
            row = region.row,
            tiles = %region.tiles,
            width,
            height,
            "Stitching region"
        );

        for (x, y) in region.tiles.tiles() {
            let tile = self.fetch_tile(x, y).await?;
            let dx = (x - region.tiles.start_col) * self.tile_size;
            let dy = (y - region.tiles.start_row) * self.tile_size;
            paste_tile(&mut canvas, &tile, dx, dy, self.tile_size);
        }

        let identifier = region.identifier(&self.slide_name);
        let (image, saved_to) = match &self.save {
            Some(target) => {
                let (image, path) = target.save(&identifier, canvas).await?;
                debug!(identifier = %identifier, path = %path.display(), "Saved sub-image");
                (image, Some(path))
            }
            None => (canvas, None),
        };

        Ok(StitchedImage {
            identifier,
            region,
            image,
            saved_to,
        })
    }

    async fn fetch_tile(&self, x: u32, y: u32) -> Result<RgbImage, SourceError> {
        let mut attempt = 0u32;
        loop {
            match self.source.read_tile(self.level, x, y).await {
                Ok(tile) => return Ok(tile),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    debug!(
                        tile_x = x,
                        tile_y = y,
                        attempt,
                        error = %e,
                        "Retrying tile fetch"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Copy `tile` into `canvas` with its top-left corner at `(dx, dy)`.
///
/// Anything beyond `tile_size` on either axis or beyond the canvas edge is
/// dropped; a smaller tile leaves the rest of its cell untouched.
pub fn paste_tile(canvas: &mut RgbImage, tile: &RgbImage, dx: u32, dy: u32, tile_size: u32) {
    let w = tile.width().min(tile_size);
    let h = tile.height().min(tile_size);

    if (w, h) == tile.dimensions() {
        image::imageops::replace(canvas, tile, dx as i64, dy as i64);
    } else {
        let clipped = image::imageops::crop_imm(tile, 0, 0, w, h).to_image();
        image::imageops::replace(canvas, &clipped, dx as i64, dy as i64);
    }
}

// =============================================================================
// Tests
// =============================================================================
