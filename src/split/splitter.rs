//! Slide splitting orchestration.
//!
//! [`SlideSplitter`] ties the pieces together for one slide:
//!
//! 1. pick the full-resolution level of the source
//! 2. derive the grid aspect and split factor for the requested count
//! 3. index the regions
//! 4. on [`SlideSplitter::split`], stitch every region in parallel
//!
//! Steps 1-3 run in the constructor, so a bad image count fails before any
//! tile is read.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{IoError, SinkError, SourceError, SplitError};
use crate::slide::{LevelInfo, PyramidSource, SlideMetadata, SlideSource};

use super::assemble::{default_concurrency, Assembly, ParallelAssembler};
use super::partition::{GridAspect, SplitFactor};
use super::region::{regions, TileRegion};
use super::stitch::{RegionStitcher, SaveTarget};

// =============================================================================
// Options
// =============================================================================

/// Knobs for one split run.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Write each sub-image here when set
    pub save: Option<SaveTarget>,

    /// Maximum regions stitched at once
    pub max_concurrency: usize,

    /// Extra attempts for tile fetches that fail transiently
    pub retries: u32,

    /// Per-region deadline
    pub region_timeout: Option<Duration>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            save: None,
            max_concurrency: default_concurrency(),
            retries: 0,
            region_timeout: None,
        }
    }
}

// =============================================================================
// SlideSplitter
// =============================================================================

/// Splits one slide into stitched sub-images.
#[derive(Debug)]
pub struct SlideSplitter<S: ?Sized> {
    name: String,
    source: Arc<S>,
    requested: u32,
    level_to_split: usize,
    level: LevelInfo,
    aspect: GridAspect,
    split: SplitFactor,
    regions: Vec<TileRegion>,
}

impl SlideSplitter<SlideSource> {
    /// Open the slide at `path` and plan a split into `requested` images.
    ///
    /// The slide name is the file stem.
    pub async fn open(
        path: impl AsRef<Path>,
        requested: u32,
        tile_size: u32,
    ) -> Result<Self, SplitError> {
        let path = path.as_ref();
        let source = SlideSource::open(path, tile_size).await?;
        Self::new(slide_name(path), Arc::new(source), requested)
    }
}

impl<S: PyramidSource + ?Sized + 'static> SlideSplitter<S> {
    /// Plan a split of `source` into `requested` images.
    ///
    /// # Errors
    ///
    /// - [`SplitError::Source`] if the source has no levels
    /// - [`SplitError::Configuration`] if the count does not fit the grid
    pub fn new(
        name: impl Into<String>,
        source: Arc<S>,
        requested: u32,
    ) -> Result<Self, SplitError> {
        let name = name.into();
        let max_levels = source.level_count();
        let invalid = SourceError::InvalidLevel {
            level: 0,
            max_levels,
        };

        let level_to_split = source.deepest_level().ok_or_else(|| invalid.clone())?;
        let level = source.level_info(level_to_split).ok_or(invalid)?;

        let aspect = GridAspect::from_grid(level.tiles_x, level.tiles_y)?;
        let split = SplitFactor::for_count(requested, aspect)?;
        let regions = regions(split, level.tiles_x, level.tiles_y)?;

        info!(
            slide = %name,
            level = level_to_split,
            width = level.width,
            height = level.height,
            tiles_x = level.tiles_x,
            tiles_y = level.tiles_y,
            aspect = %aspect,
            split = %split,
            "Planned split"
        );

        Ok(Self {
            name,
            source,
            requested,
            level_to_split,
            level,
            aspect,
            split,
            regions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn level_count(&self) -> usize {
        self.source.level_count()
    }

    /// Index of the level being split (the deepest one).
    pub fn level_to_split(&self) -> usize {
        self.level_to_split
    }

    /// Pixel width of the split level.
    pub fn image_width(&self) -> u32 {
        self.level.width
    }

    /// Pixel height of the split level.
    pub fn image_height(&self) -> u32 {
        self.level.height
    }

    pub fn level_info(&self) -> &LevelInfo {
        &self.level
    }

    pub fn grid_aspect(&self) -> GridAspect {
        self.aspect
    }

    pub fn split_factor(&self) -> SplitFactor {
        self.split
    }

    pub fn regions(&self) -> &[TileRegion] {
        &self.regions
    }

    pub fn metadata(&self) -> &SlideMetadata {
        self.source.metadata()
    }

    pub fn number_of_images(&self) -> u32 {
        self.requested
    }

    /// Stitch every region.
    ///
    /// Creates the save directory first when saving is enabled. Region
    /// failures land in [`Assembly::failures`].
    pub async fn split(&self, options: &SplitOptions) -> Result<Assembly, SplitError> {
        if let Some(target) = &options.save {
            tokio::fs::create_dir_all(&target.dir)
                .await
                .map_err(|e| SinkError::Io(IoError::from_std(&target.dir, &e)))?;
        }

        let stitcher = RegionStitcher::new(
            Arc::clone(&self.source),
            self.level_to_split,
            self.name.clone(),
        )
        .with_retries(options.retries)
        .with_save(options.save.clone());

        ParallelAssembler::new(options.max_concurrency)
            .with_region_timeout(options.region_timeout)
            .assemble(&self.regions, move |region| {
                let stitcher = stitcher.clone();
                async move { stitcher.stitch(region).await }
            })
            .await
    }

    /// Write the slide metadata to `<dir>/<name>.metadata.json`.
    pub async fn export_metadata(&self, dir: impl AsRef<Path>) -> Result<PathBuf, SinkError> {
        let path = dir
            .as_ref()
            .join(format!("{}.metadata.json", self.name));
        self.metadata().write_json(&path).await?;
        Ok(path)
    }
}

/// Slide name used in identifiers: the file stem, or `slide` without one.
pub fn slide_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slide".to_string())
}

// =============================================================================
// Tests
// =============================================================================
