//! Deep Zoom tile directory source.
//!
//! A Deep Zoom pyramid is a descriptor file plus a directory of pre-cut tiles:
//!
//! ```text
//! slide.dzi
//! slide_files/
//!   0/0_0.jpeg          (1x1 pixel, coarsest)
//!   ...
//!   15/0_0.jpeg ...     (full resolution)
//! slide.properties.json (optional slide metadata)
//! ```
//!
//! # Level Numbering
//!
//! - Level 0 = 1x1 pixel (lowest resolution)
//! - Max level = full resolution, `ceil(log2(max(width, height)))`
//!
//! Each level halves the one above it, rounding up. Tiles on the right and
//! bottom edges are usually narrower than the tile size; they are returned
//! exactly as stored.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use tracing::debug;

use crate::error::{IoError, SourceError};
use crate::tile::decode_tile;

use super::metadata::SlideMetadata;
use super::reader::{check_tile_bounds, LevelInfo, PyramidSource};

// =============================================================================
// Level Math
// =============================================================================

/// Calculate the maximum Deep Zoom level for given image dimensions.
///
/// max_level = ceil(log2(max(width, height)))
pub fn max_level(width: u32, height: u32) -> usize {
    let max_dim = width.max(height);
    if max_dim <= 1 {
        return 0;
    }
    (u32::BITS - (max_dim - 1).leading_zeros()) as usize
}

/// Calculate dimensions at a specific Deep Zoom level.
///
/// At level L, the dimensions are:
/// - width = ceil(original_width / 2^(max_level - L))
/// - height = ceil(original_height / 2^(max_level - L))
pub fn level_dimensions(width: u32, height: u32, level: usize, max_level: usize) -> (u32, u32) {
    if level > max_level {
        return (0, 0);
    }

    let shift = (max_level - level) as u32;
    let scale = 1u64 << shift;
    let level_width = (width as u64).div_ceil(scale) as u32;
    let level_height = (height as u64).div_ceil(scale) as u32;

    (level_width.max(1), level_height.max(1))
}

// =============================================================================
// Descriptor
// =============================================================================

/// Parsed `.dzi` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepZoomDescriptor {
    /// Full-resolution width in pixels
    pub width: u32,

    /// Full-resolution height in pixels
    pub height: u32,

    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Pixels of overlap between neighbouring tiles
    pub overlap: u32,

    /// Tile file extension (e.g. "jpeg", "png")
    pub format: String,
}

impl DeepZoomDescriptor {
    /// Parse a descriptor from its XML text.
    ///
    /// # Example Input
    ///
    /// ```xml
    /// <?xml version="1.0" encoding="UTF-8"?>
    /// <Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
    ///        TileSize="256"
    ///        Overlap="0"
    ///        Format="jpeg">
    ///   <Size Width="46920" Height="33600" />
    /// </Image>
    /// ```
    pub fn parse(xml: &str) -> Result<Self, SourceError> {
        let tile_size = parse_number(xml, "Image", "TileSize")?;
        let overlap = parse_number(xml, "Image", "Overlap")?;
        let format = xml_attribute(xml, "Image", "Format")
            .ok_or_else(|| missing("Image", "Format"))?
            .to_ascii_lowercase();
        let width = parse_number(xml, "Size", "Width")?;
        let height = parse_number(xml, "Size", "Height")?;

        if tile_size == 0 {
            return Err(SourceError::InvalidDescriptor {
                reason: "TileSize must be positive".to_string(),
            });
        }
        if width == 0 || height == 0 {
            return Err(SourceError::InvalidDescriptor {
                reason: format!("image size {}x{} is empty", width, height),
            });
        }

        Ok(Self {
            width,
            height,
            tile_size,
            overlap,
            format,
        })
    }

    /// Render the descriptor as XML.
    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
       TileSize="{}"
       Overlap="{}"
       Format="{}">
  <Size Width="{}" Height="{}" />
</Image>"#,
            self.tile_size, self.overlap, self.format, self.width, self.height
        )
    }
}

fn missing(element: &str, attribute: &str) -> SourceError {
    SourceError::InvalidDescriptor {
        reason: format!("missing {} attribute on <{}>", attribute, element),
    }
}

fn parse_number(xml: &str, element: &str, attribute: &str) -> Result<u32, SourceError> {
    let raw = xml_attribute(xml, element, attribute).ok_or_else(|| missing(element, attribute))?;
    raw.trim()
        .parse()
        .map_err(|_| SourceError::InvalidDescriptor {
            reason: format!("{} on <{}> is not a number: {:?}", attribute, element, raw),
        })
}

/// Find an attribute value on the first occurrence of an element.
fn xml_attribute<'a>(xml: &'a str, element: &str, attribute: &str) -> Option<&'a str> {
    let open = format!("<{}", element);
    let mut search_from = 0;
    let tag = loop {
        let start = search_from + xml[search_from..].find(&open)?;
        let after = start + open.len();
        // Reject prefixes such as <ImageFoo when looking for <Image
        match xml[after..].chars().next() {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => {
                let end = after + xml[after..].find('>')?;
                break &xml[after..end];
            }
            _ => search_from = after,
        }
    };

    let mut rest = tag;
    while let Some(pos) = rest.find(attribute) {
        let preceded_by_space = rest[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace());
        let tail = rest[pos + attribute.len()..].trim_start();
        if preceded_by_space {
            if let Some(tail) = tail.strip_prefix('=') {
                let tail = tail.trim_start();
                let quote = tail.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let value = &tail[1..];
                    let end = value.find(quote)?;
                    return Some(&value[..end]);
                }
            }
        }
        rest = &rest[pos + attribute.len()..];
    }

    None
}

// =============================================================================
// DeepZoomSource
// =============================================================================

/// Pyramid source backed by a Deep Zoom descriptor and tile directory.
#[derive(Debug, Clone)]
pub struct DeepZoomSource {
    /// Directory holding one sub-directory per level
    tiles_dir: PathBuf,

    /// Parsed descriptor
    descriptor: DeepZoomDescriptor,

    /// Level table, coarsest first
    levels: Vec<LevelInfo>,

    /// Sidecar metadata, or all-absent
    metadata: SlideMetadata,
}

impl DeepZoomSource {
    /// Open a `.dzi` descriptor and its sibling `<stem>_files` directory.
    ///
    /// Metadata is read from `<stem>.properties.json` when that file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let xml = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SourceError::Io(IoError::from_std(path, &e)))?;
        let descriptor = DeepZoomDescriptor::parse(&xml)?;

        if descriptor.overlap != 0 {
            return Err(SourceError::Unsupported {
                reason: format!(
                    "tile overlap {} is not supported, only 0",
                    descriptor.overlap
                ),
            });
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SourceError::InvalidDescriptor {
                reason: format!("cannot derive slide name from {}", path.display()),
            })?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let tiles_dir = parent.join(format!("{}_files", stem));

        if !tokio::fs::try_exists(&tiles_dir).await.unwrap_or(false) {
            return Err(SourceError::Io(IoError::NotFound(
                tiles_dir.display().to_string(),
            )));
        }

        let properties_path = parent.join(format!("{}.properties.json", stem));
        let metadata = match tokio::fs::read_to_string(&properties_path).await {
            Ok(json) => SlideMetadata::from_json_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SlideMetadata::empty(),
            Err(e) => return Err(SourceError::Io(IoError::from_std(&properties_path, &e))),
        };

        let source = Self::from_descriptor(tiles_dir, descriptor, metadata);
        debug!(
            slide = %path.display(),
            levels = source.levels.len(),
            width = source.descriptor.width,
            height = source.descriptor.height,
            "Opened Deep Zoom pyramid"
        );
        Ok(source)
    }

    /// Build a source from an already parsed descriptor.
    pub fn from_descriptor(
        tiles_dir: impl Into<PathBuf>,
        descriptor: DeepZoomDescriptor,
        metadata: SlideMetadata,
    ) -> Self {
        let top = max_level(descriptor.width, descriptor.height);
        let levels = (0..=top)
            .map(|level| {
                let (w, h) = level_dimensions(descriptor.width, descriptor.height, level, top);
                LevelInfo::from_dimensions(w, h, descriptor.tile_size)
            })
            .collect();

        Self {
            tiles_dir: tiles_dir.into(),
            descriptor,
            levels,
            metadata,
        }
    }

    /// Get the parsed descriptor.
    pub fn descriptor(&self) -> &DeepZoomDescriptor {
        &self.descriptor
    }

    /// Path of the file holding one tile.
    pub fn tile_path(&self, level: usize, tile_x: u32, tile_y: u32) -> PathBuf {
        self.tiles_dir.join(level.to_string()).join(format!(
            "{}_{}.{}",
            tile_x, tile_y, self.descriptor.format
        ))
    }
}

#[async_trait]
impl PyramidSource for DeepZoomSource {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.width, l.height))
    }

    fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.tiles_x, l.tiles_y))
    }

    fn tile_size(&self) -> u32 {
        self.descriptor.tile_size
    }

    fn metadata(&self) -> &SlideMetadata {
        &self.metadata
    }

    async fn read_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RgbImage, SourceError> {
        check_tile_bounds(self, level, tile_x, tile_y)?;

        let path = self.tile_path(level, tile_x, tile_y);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| SourceError::Io(IoError::from_std(&path, &e)))?;

        decode_tile(&data)
    }
}

// =============================================================================
// Tests
// =============================================================================
