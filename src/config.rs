//! Command-line configuration for WSI Splitter.
//!
//! This module defines the CLI surface:
//! - `split`: cut a slide into stitched sub-images (and optionally pyramids)
//! - `inspect`: print a slide's levels, tile grid, split plan and metadata
//! - `pyramid`: build a pyramid TIFF from a plain raster file
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_splitter::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.into_command() {
//!     Command::Split(config) => println!("splitting {}", config.slide.display()),
//!     _ => {}
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_IMAGES` - Number of sub-images to produce (default: 1)
//! - `WSI_OUTPUT_DIR` - Output directory (default: the slide's directory)
//! - `WSI_JPEG_QUALITY` - JPEG quality for pyramid tiles (default: 80)
//! - `WSI_MAX_CONCURRENCY` - Regions stitched at once (default: CPU count)

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::pyramid::{Compression, DEFAULT_SUBRESOLUTIONS};
use crate::slide::DEFAULT_TILE_SIZE;
use crate::split::{SaveFormat, SaveTarget, SplitOptions};
use crate::tile::{is_valid_quality, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default number of sub-images.
pub const DEFAULT_IMAGES: u32 = 1;

/// Default number of tile fetch retries.
pub const DEFAULT_RETRIES: u32 = 0;

/// Largest tile edge accepted for raster inputs.
pub const MAX_TILE_SIZE: u32 = 8192;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Splitter - Split Whole Slide Images into stitched sub-images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-splitter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Split a slide into stitched sub-images.
    Split(SplitConfig),

    /// Describe a slide and the split it would get.
    Inspect(InspectConfig),

    /// Build a pyramid TIFF from a raster image file.
    Pyramid(PyramidConfig),
}

// =============================================================================
// Split Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct SplitConfig {
    /// Slide to split: a Deep Zoom descriptor (.dzi) or a raster image.
    pub slide: PathBuf,

    /// Number of sub-images to produce (1, or an even count on a 2:1 grid).
    #[arg(short = 'n', long, default_value_t = DEFAULT_IMAGES, env = "WSI_IMAGES")]
    pub images: u32,

    // =========================================================================
    // Output
    // =========================================================================
    /// Save every stitched sub-image as a raster file.
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Raster format for saved sub-images.
    #[arg(long, value_enum, default_value_t = SaveFormat::Jpeg)]
    pub format: SaveFormat,

    /// Output directory; defaults to the slide's directory.
    #[arg(short, long, env = "WSI_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Also write one pyramid TIFF per sub-image.
    #[arg(long, default_value_t = false)]
    pub pyramid: bool,

    /// Write the slide metadata as <slide>.metadata.json.
    #[arg(long, default_value_t = false)]
    pub export_metadata: bool,

    // =========================================================================
    // Tiles and Pyramids
    // =========================================================================
    /// Tile edge for raster inputs (Deep Zoom pyramids carry their own).
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: u32,

    /// JPEG quality for pyramid tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Reduced-resolution images per pyramid.
    #[arg(long, default_value_t = DEFAULT_SUBRESOLUTIONS)]
    pub subresolutions: u32,

    // =========================================================================
    // Execution
    // =========================================================================
    /// Maximum regions stitched at once; defaults to the CPU count.
    #[arg(long, env = "WSI_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Extra attempts for tile reads that fail with a transient I/O error.
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Abandon any region that takes longer than this many seconds.
    #[arg(long)]
    pub region_timeout_secs: Option<u64>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SplitConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.images == 0 {
            return Err("images must be at least 1".to_string());
        }

        validate_tile_size(self.tile_size)?;

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be greater than 0".to_string());
        }

        if self.region_timeout_secs == Some(0) {
            return Err("region_timeout_secs must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Directory all outputs go to.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| parent_dir(&self.slide))
    }

    /// Build the split run options.
    pub fn split_options(&self) -> SplitOptions {
        let defaults = SplitOptions::default();
        SplitOptions {
            save: self
                .save
                .then(|| SaveTarget::new(self.resolved_output_dir(), self.format)),
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            retries: self.retries,
            region_timeout: self.region_timeout_secs.map(Duration::from_secs),
        }
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Slide to inspect.
    pub slide: PathBuf,

    /// Image count to plan a split for.
    #[arg(short = 'n', long, default_value_t = DEFAULT_IMAGES, env = "WSI_IMAGES")]
    pub images: u32,

    /// Tile edge for raster inputs.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: u32,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_tile_size(self.tile_size)
    }
}

// =============================================================================
// Pyramid Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct PyramidConfig {
    /// Raster image (JPEG, PNG or TIFF) to convert.
    pub raster: PathBuf,

    /// Output directory; defaults to the raster's directory.
    #[arg(short, long, env = "WSI_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// JPEG quality for pyramid tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Reduced-resolution images per pyramid.
    #[arg(long, default_value_t = DEFAULT_SUBRESOLUTIONS)]
    pub subresolutions: u32,

    /// Store tiles uncompressed instead of JPEG.
    #[arg(long, default_value_t = false)]
    pub uncompressed: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl PyramidConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| parent_dir(&self.raster))
    }

    pub fn compression(&self) -> Compression {
        if self.uncompressed {
            Compression::None
        } else {
            Compression::Jpeg
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_tile_size(tile_size: u32) -> Result<(), String> {
    if tile_size == 0 || tile_size > MAX_TILE_SIZE {
        return Err(format!("tile_size must be between 1 and {}", MAX_TILE_SIZE));
    }
    Ok(())
}

/// Directory containing `path`; `.` for bare file names.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// =============================================================================
// Tests
// =============================================================================
