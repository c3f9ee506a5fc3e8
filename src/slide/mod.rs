//! Slide abstraction layer.
//!
//! This module provides the pyramid source capability the splitter consumes,
//! regardless of how the pyramid is stored.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             SlideSplitter               │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          PyramidSource Trait            │
//! │   (levels, tile grid, metadata, tiles)  │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ DeepZoomSource  │    │   RasterSource      │
//! │ (.dzi + tiles)  │    │ (one decoded image) │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! [`SlideSource`] picks one of the two from the slide's path.

mod deepzoom;
mod metadata;
mod raster;
mod reader;
mod source;

pub use deepzoom::{level_dimensions, max_level, DeepZoomDescriptor, DeepZoomSource};
pub use metadata::{property_kind, MetadataValue, PropertyKind, SlideMetadata, SLIDE_PROPERTIES};
pub use raster::{RasterSource, DEFAULT_TILE_SIZE};
pub use reader::{check_tile_bounds, LevelInfo, PyramidSource};
pub use source::{detect_format, SlideFormat, SlideSource};
