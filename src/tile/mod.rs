//! Tile codec layer.
//!
//! Decodes source tiles into RGB rasters and encodes output tiles as JPEG.
//!
//! # Components
//!
//! - [`decode_tile`]: Decodes JPEG/PNG/TIFF tile bytes to an `RgbImage`
//! - [`JpegTileEncoder`]: Encodes `RgbImage` tiles at a fixed JPEG quality

mod encoder;

pub use encoder::{
    clamp_quality, decode_tile, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
