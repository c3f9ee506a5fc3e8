use thiserror::Error;

/// I/O errors that can occur when reading slide data from disk
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Filesystem error while reading or writing a path
    #[error("I/O error on {path}: {message}")]
    Fs { path: String, message: String },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    /// Build an `IoError` from a `std::io::Error`, keeping the offending path.
    pub fn from_std(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        let path = path.as_ref().display().to_string();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::Fs {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised by a pyramid source when describing levels or fetching tiles
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// I/O error while reading the source
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: slide has {max_levels} levels")]
    InvalidLevel { level: usize, max_levels: usize },

    /// Requested tile lies outside the level's tile grid
    #[error("Tile ({x}, {y}) out of bounds for level {level} (grid is {max_x}x{max_y})")]
    TileOutOfBounds {
        level: usize,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    /// Tile or raster bytes could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Pyramid descriptor is malformed
    #[error("Invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// Source uses a layout this crate cannot read
    #[error("Unsupported source: {reason}")]
    Unsupported { reason: String },
}

impl SourceError {
    /// Whether retrying the same request might succeed.
    ///
    /// Only filesystem errors other than a missing file qualify; bad indices
    /// and undecodable data fail identically every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Io(IoError::Fs { .. }))
    }
}

/// Unsupported combination of requested image count and tile grid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Zero sub-images were requested
    #[error("Requested image count must be at least 1")]
    NoImages,

    /// The partitioning rule has no split factor for this combination
    #[error(
        "Cannot split into {requested} images with grid aspect {}:{}: only 1, or an even count on a 2:1 grid, is supported",
        aspect.0,
        aspect.1
    )]
    UnsupportedSplit { requested: u32, aspect: (u32, u32) },

    /// The split factor asks for more regions than there are tiles
    #[error("Split {columns}x{rows} does not fit a {tiles_x}x{tiles_y} tile grid")]
    GridTooSmall {
        columns: u32,
        rows: u32,
        tiles_x: u32,
        tiles_y: u32,
    },

    /// The level to split has no tiles at all
    #[error("Tile grid is empty")]
    EmptyGrid,
}

/// Errors writing a raster or pyramid file
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// I/O error while writing the output
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Encoding pixels into the output format failed
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// The raster cannot be written (e.g. zero-sized)
    #[error("Invalid raster: {reason}")]
    InvalidRaster { reason: String },
}

/// Failure of a single region task; never aborts sibling regions
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    /// A tile fetch failed
    #[error("Tile fetch failed: {0}")]
    Source(#[from] SourceError),

    /// Saving the stitched raster failed
    #[error("Save failed: {0}")]
    Sink(#[from] SinkError),

    /// The region did not finish within its deadline
    #[error("Region timed out after {millis}ms")]
    TimedOut { millis: u64 },

    /// The region task panicked
    #[error("Region task panicked: {message}")]
    Panicked { message: String },
}

/// Whole-run failures that propagate to the caller
#[derive(Debug, Clone, Error)]
pub enum SplitError {
    /// Bad image count / grid combination
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The source could not be opened or described
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Writing a run-level artifact failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Nothing to assemble
    #[error("No regions to assemble")]
    NoRegions,
}
