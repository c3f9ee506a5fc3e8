//! Tile-grid partitioning and stitching.
//!
//! This is the core of the crate: it turns "give me N sub-images" into
//! concrete tile regions and rebuilds each region into one raster.
//!
//! # Pipeline
//!
//! ```text
//!  (count, grid aspect)      (split, tile grid)           regions
//!  ┌──────────────┐          ┌──────────────┐          ┌────────────────────┐
//!  │ SplitFactor  │─────────▶│   regions()  │─────────▶│ ParallelAssembler  │
//!  │ ::for_count  │          │              │          │  ├ RegionStitcher  │
//!  └──────────────┘          └──────────────┘          │  ├ RegionStitcher  │
//!                                                      │  └ ...             │
//!                                                      └─────────┬──────────┘
//!                                                                ▼
//!                                                  Assembly { images, failures }
//! ```
//!
//! [`SlideSplitter`] runs the whole pipeline against a
//! [`PyramidSource`](crate::slide::PyramidSource).

mod assemble;
mod partition;
mod region;
mod splitter;
mod stitch;

pub use assemble::{default_concurrency, Assembly, ParallelAssembler, RegionFailure};
pub use partition::{GridAspect, SplitFactor};
pub use region::{regions, TileBox, TileRegion};
pub use splitter::{slide_name, SlideSplitter, SplitOptions};
pub use stitch::{paste_tile, RegionStitcher, SaveFormat, SaveTarget, StitchedImage};
