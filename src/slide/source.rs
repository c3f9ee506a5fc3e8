//! Source auto-selection.
//!
//! Slides are opened through [`SlideSource`], which picks a concrete pyramid
//! source from the file name and then dispatches every call to it.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;

use crate::error::SourceError;

use super::deepzoom::DeepZoomSource;
use super::metadata::SlideMetadata;
use super::raster::RasterSource;
use super::reader::{LevelInfo, PyramidSource};

// =============================================================================
// SlideFormat
// =============================================================================

/// Detected slide layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    /// Deep Zoom descriptor plus tile directory
    DeepZoom,

    /// A single raster image file
    Raster,
}

impl SlideFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::DeepZoom => "Deep Zoom",
            SlideFormat::Raster => "Raster image",
        }
    }
}

/// Detect the slide layout from its path.
///
/// `.dzi` (any case) is a Deep Zoom descriptor; everything else is decoded
/// as a raster image.
pub fn detect_format(path: &Path) -> SlideFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("dzi") => SlideFormat::DeepZoom,
        _ => SlideFormat::Raster,
    }
}

// =============================================================================
// SlideSource
// =============================================================================

/// An opened slide of any supported layout.
///
/// We use an enum instead of trait objects so callers can stay generic over
/// `PyramidSource` without boxing.
#[derive(Debug, Clone)]
pub enum SlideSource {
    DeepZoom(DeepZoomSource),
    Raster(RasterSource),
}

impl SlideSource {
    /// Open a slide, detecting its layout from the path.
    ///
    /// `tile_size` only applies to raster inputs; Deep Zoom pyramids carry
    /// their own tile size.
    pub async fn open(path: impl AsRef<Path>, tile_size: u32) -> Result<Self, SourceError> {
        let path = path.as_ref();
        match detect_format(path) {
            SlideFormat::DeepZoom => Ok(SlideSource::DeepZoom(DeepZoomSource::open(path).await?)),
            SlideFormat::Raster => Ok(SlideSource::Raster(
                RasterSource::open(path, tile_size).await?,
            )),
        }
    }

    /// Get the layout of this slide.
    pub fn format(&self) -> SlideFormat {
        match self {
            SlideSource::DeepZoom(_) => SlideFormat::DeepZoom,
            SlideSource::Raster(_) => SlideFormat::Raster,
        }
    }
}

#[async_trait]
impl PyramidSource for SlideSource {
    fn level_count(&self) -> usize {
        match self {
            SlideSource::DeepZoom(s) => s.level_count(),
            SlideSource::Raster(s) => s.level_count(),
        }
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        match self {
            SlideSource::DeepZoom(s) => s.level_dimensions(level),
            SlideSource::Raster(s) => s.level_dimensions(level),
        }
    }

    fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        match self {
            SlideSource::DeepZoom(s) => s.tile_count(level),
            SlideSource::Raster(s) => s.tile_count(level),
        }
    }

    fn tile_size(&self) -> u32 {
        match self {
            SlideSource::DeepZoom(s) => s.tile_size(),
            SlideSource::Raster(s) => s.tile_size(),
        }
    }

    fn metadata(&self) -> &SlideMetadata {
        match self {
            SlideSource::DeepZoom(s) => s.metadata(),
            SlideSource::Raster(s) => s.metadata(),
        }
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        match self {
            SlideSource::DeepZoom(s) => s.level_info(level),
            SlideSource::Raster(s) => s.level_info(level),
        }
    }

    async fn read_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RgbImage, SourceError> {
        match self {
            SlideSource::DeepZoom(s) => s.read_tile(level, tile_x, tile_y).await,
            SlideSource::Raster(s) => s.read_tile(level, tile_x, tile_y).await,
        }
    }
}
