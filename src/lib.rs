//! # WSI Splitter
//!
//! Splits a Whole Slide Image (WSI) pyramid into a small number of stitched
//! sub-images covering the whole slide.
//!
//! A slide is read as a tile pyramid. The lowest-resolution level is chosen,
//! its tile grid is divided into `N` rectangular regions following the grid's
//! aspect ratio, and each region is stitched into one RGB raster. Regions are
//! fetched concurrently and a failed region never prevents the others from
//! being produced.
//!
//! ## Features
//!
//! - **Pyramid sources**: Deep Zoom (`.dzi` + tile directory) and plain rasters
//! - **Partitioning**: Aspect-aware split of the tile grid into 1 or an even number of regions
//! - **Parallel assembly**: Bounded concurrency, per-region failure isolation
//! - **Outputs**: In-memory images, optional saving, JSON metadata export,
//!   tiled multi-resolution TIFF pyramids
//!
//! ## Architecture
//!
//! - [`slide`] - Pyramid source abstraction, Deep Zoom and raster readers, metadata
//! - [`tile`] - Tile decoding and JPEG encoding
//! - [`split`] - Grid partitioning, region stitching and parallel assembly
//! - [`pyramid`] - Tiled pyramid TIFF writer
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_splitter::{SlideSplitter, SplitOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let splitter = SlideSplitter::open("slide.dzi", 2, 256).await?;
//!     let assembly = splitter.split(&SplitOptions::default()).await?;
//!
//!     for id in assembly.identifiers() {
//!         let image = &assembly.images[id];
//!         println!("{}: {}x{}", id, image.width(), image.height());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pyramid;
pub mod slide;
pub mod split;
pub mod tile;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Cli, Command, InspectConfig, PyramidConfig, SplitConfig};
pub use error::{ConfigurationError, IoError, RegionError, SinkError, SourceError, SplitError};
pub use pyramid::{EmitReport, EmittedPyramid, PyramidEmitter, PyramidInput};
pub use slide::{
    DeepZoomSource, LevelInfo, MetadataValue, PyramidSource, RasterSource, SlideFormat,
    SlideMetadata, SlideSource,
};
pub use split::{
    Assembly, GridAspect, ParallelAssembler, RegionFailure, RegionStitcher, SaveFormat,
    SaveTarget, SlideSplitter, SplitFactor, SplitOptions, StitchedImage, TileBox, TileRegion,
};
pub use tile::{decode_tile, JpegTileEncoder};
