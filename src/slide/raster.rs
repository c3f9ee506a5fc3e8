//! Single-raster pyramid source.
//!
//! Exposes one decoded image as a one-level pyramid, cut into square tiles on
//! demand. Tiles on the right and bottom edges are zero-padded to the full
//! tile size, so every tile this source returns is `tile_size` x `tile_size`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;

use crate::error::{IoError, SourceError};

use super::metadata::SlideMetadata;
use super::reader::{check_tile_bounds, LevelInfo, PyramidSource};

/// Default tile edge length for raster sources.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Pyramid source over a single in-memory raster.
#[derive(Debug, Clone)]
pub struct RasterSource {
    /// Full-resolution pixels
    image: Arc<RgbImage>,

    /// The only level
    level: LevelInfo,

    /// Slide properties
    metadata: SlideMetadata,
}

impl RasterSource {
    /// Wrap a decoded raster.
    pub fn new(image: RgbImage, tile_size: u32) -> Result<Self, SourceError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SourceError::InvalidDescriptor {
                reason: format!("raster is empty ({}x{})", width, height),
            });
        }
        if tile_size == 0 {
            return Err(SourceError::InvalidDescriptor {
                reason: "tile size must be positive".to_string(),
            });
        }

        Ok(Self {
            image: Arc::new(image),
            level: LevelInfo::from_dimensions(width, height, tile_size),
            metadata: SlideMetadata::empty(),
        })
    }

    /// Decode an image file (JPEG, PNG or TIFF) into a raster source.
    pub async fn open(path: impl AsRef<Path>, tile_size: u32) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || {
            image::open(&path).map_err(|e| match e {
                image::ImageError::IoError(io) => SourceError::Io(IoError::from_std(&path, &io)),
                other => SourceError::Decode {
                    message: format!("{}: {}", path.display(), other),
                },
            })
        })
        .await
        .map_err(|e| SourceError::Decode {
            message: format!("decode task failed: {}", e),
        })??;

        Self::new(decoded.to_rgb8(), tile_size)
    }

    /// Attach slide properties.
    pub fn with_metadata(mut self, metadata: SlideMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Borrow the full-resolution raster.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

#[async_trait]
impl PyramidSource for RasterSource {
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
        check_tile_bounds(self, level, tile_x, tile_y)?;

        let size = self.level.tile_size;
        let x0 = tile_x * size;
        let y0 = tile_y * size;
        let w = size.min(self.level.width - x0);
        let h = size.min(self.level.height - y0);

        let mut tile = RgbImage::new(size, size);
        let pixels = image::imageops::crop_imm(self.image.as_ref(), x0, y0, w, h).to_image();
        image::imageops::replace(&mut tile, &pixels, 0, 0);
        Ok(tile)
    }
}
