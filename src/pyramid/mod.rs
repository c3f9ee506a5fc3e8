//! Pyramid TIFF output.
//!
//! Writes stitched sub-images (or any raster) as tiled, multi-resolution
//! TIFF files.
//!
//! # Structure
//!
//! ```text
//! PyramidInput ──▶ PyramidEmitter ──▶ TiffWriter ──▶ <name>.tiff
//!                   │                   │
//!                   │ EmitOptions       │ IFD per level
//!                   │ (from metadata)   │ (TIFF or BigTIFF)
//!                   └ JpegTileEncoder   └ tags
//! ```

mod emitter;
mod tags;
mod writer;

pub use emitter::{
    image_description, level_sizes, EmitOptions, EmitReport, EmittedPyramid, PyramidEmitter,
    PyramidInput, DEFAULT_MICRONS_PER_PIXEL, DEFAULT_PYRAMID_TILE_SIZE, DEFAULT_SUBRESOLUTIONS,
    SOFTWARE,
};
pub use tags::{Compression, FieldType, ResolutionUnit, TiffTag};
pub use writer::{IfdEntry, TiffValue, TiffWriter};
