//! JPEG tile codec.
//!
//! Source tiles arrive as encoded bytes (JPEG or PNG in a Deep Zoom
//! directory) and are decoded to RGB rasters. Output pyramids store their
//! tiles as JPEG at a configurable quality.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

use crate::error::{SinkError, SourceError};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// JPEG Encoder
// =============================================================================

/// Encodes RGB tiles as baseline JPEG.
///
/// # Example
///
/// ```
/// use image::RgbImage;
/// use wsi_splitter::tile::JpegTileEncoder;
///
/// let encoder = JpegTileEncoder::new(85);
/// let tile = RgbImage::new(256, 256);
/// let jpeg = encoder.encode(&tile).unwrap();
/// assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct JpegTileEncoder {
    quality: u8,
}

impl Default for JpegTileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegTileEncoder {
    /// Create an encoder; quality is clamped to 1-100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    /// Quality used for every tile.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one RGB tile.
    ///
    /// # Errors
    ///
    /// Returns an error if the tile is empty or encoding fails.
    pub fn encode(&self, tile: &RgbImage) -> Result<Bytes, SinkError> {
        let (width, height) = tile.dimensions();
        if width == 0 || height == 0 {
            return Err(SinkError::InvalidRaster {
                reason: format!("cannot encode empty tile {}x{}", width, height),
            });
        }

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);
        encoder
            .encode(tile.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| SinkError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode tile bytes of any supported format into an RGB raster.
pub fn decode_tile(data: &[u8]) -> Result<RgbImage, SourceError> {
    let img = image::load_from_memory(data).map_err(|e| SourceError::Decode {
        message: e.to_string(),
    })?;
    Ok(img.to_rgb8())
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
///
/// Values below 1 become 1, values above 100 become 100.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
