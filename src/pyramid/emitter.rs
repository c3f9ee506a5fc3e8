//! Pyramid TIFF emission.
//!
//! Turns a raster plus slide metadata into one tiled, multi-resolution TIFF:
//! the full-resolution image first, then `subresolutions` reduced images,
//! each half the size of the one before.
//!
//! Tile size, resolution unit and pixel size come from the slide metadata
//! when it has them:
//!
//! | Setting         | Property                                   | Fallback   |
//! |-----------------|--------------------------------------------|------------|
//! | Tile edge       | `openslide.level[0].tile-width` / `-height`| 256        |
//! | Resolution unit | `tiff.ResolutionUnit`                      | centimeter |
//! | Pixel size (µm) | `openslide.mpp-x` / `-y`, `aperio.MPP`     | 0.29       |

use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::MAX_TILE_SIZE;
use crate::error::{IoError, SinkError, SourceError, SplitError};
use crate::slide::SlideMetadata;
use crate::split::{slide_name, Assembly};
use crate::tile::JpegTileEncoder;

use super::tags::{Compression, ResolutionUnit, TiffTag, SUBFILE_REDUCED_IMAGE};
use super::writer::{IfdEntry, TiffValue, TiffWriter};

/// Tile edge used when the metadata has none.
pub const DEFAULT_PYRAMID_TILE_SIZE: u32 = 256;

/// Pixel size in micrometers used when the metadata has none.
pub const DEFAULT_MICRONS_PER_PIXEL: f64 = 0.29;

/// Number of reduced images written after the full-resolution one.
pub const DEFAULT_SUBRESOLUTIONS: u32 = 2;

/// Value of the Software tag.
pub const SOFTWARE: &str = concat!("wsi-splitter ", env!("CARGO_PKG_VERSION"));

/// Largest uncompressed payload written as classic TIFF.
const CLASSIC_TIFF_LIMIT: u64 = u32::MAX as u64;

/// TIFF tile dimensions must be multiples of 16.
const TILE_ALIGNMENT: u32 = 16;

// =============================================================================
// Emit Options
// =============================================================================

/// Per-file settings derived from slide metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitOptions {
    /// Tile edge in pixels, a multiple of 16
    pub tile_size: u32,

    /// Unit of the X/Y resolution tags
    pub resolution_unit: ResolutionUnit,

    /// Pixel size in micrometers, `(x, y)`
    pub microns_per_pixel: (f64, f64),
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_PYRAMID_TILE_SIZE,
            resolution_unit: ResolutionUnit::default(),
            microns_per_pixel: (DEFAULT_MICRONS_PER_PIXEL, DEFAULT_MICRONS_PER_PIXEL),
        }
    }
}

impl EmitOptions {
    /// Read the settings from slide metadata, falling back per setting.
    pub fn from_metadata(metadata: &SlideMetadata) -> Self {
        let tile_size = metadata
            .get_f64("openslide.level[0].tile-width")
            .or_else(|| metadata.get_f64("openslide.level[0].tile-height"))
            .filter(|v| (1.0..=MAX_TILE_SIZE as f64).contains(v))
            .map(|v| align_tile_size(v as u32))
            .unwrap_or(DEFAULT_PYRAMID_TILE_SIZE);

        let resolution_unit = metadata
            .get("tiff.ResolutionUnit")
            .and_then(|v| ResolutionUnit::parse(&v.to_string()))
            .unwrap_or_default();

        let positive = |v: f64| v > 0.0 && v.is_finite();
        let fallback = metadata
            .get_f64("aperio.MPP")
            .filter(|v| positive(*v))
            .unwrap_or(DEFAULT_MICRONS_PER_PIXEL);
        let mpp_x = metadata
            .get_f64("openslide.mpp-x")
            .filter(|v| positive(*v))
            .unwrap_or(fallback);
        let mpp_y = metadata
            .get_f64("openslide.mpp-y")
            .filter(|v| positive(*v))
            .unwrap_or(fallback);

        Self {
            tile_size,
            resolution_unit,
            microns_per_pixel: (mpp_x, mpp_y),
        }
    }

    /// X/Y resolution tags for an image `downsample` times smaller than
    /// full resolution.
    fn resolution(&self, downsample: f64) -> ((u32, u32), (u32, u32)) {
        let (mpp_x, mpp_y) = self.microns_per_pixel;
        let x = self.resolution_unit.pixels_per_unit(mpp_x * downsample);
        let y = self.resolution_unit.pixels_per_unit(mpp_y * downsample);
        (
            x.map(to_rational).unwrap_or((1, 1)),
            y.map(to_rational).unwrap_or((1, 1)),
        )
    }
}

/// Round a tile edge up to the next multiple of 16, within `[16, MAX_TILE_SIZE]`.
fn align_tile_size(size: u32) -> u32 {
    let size = size.clamp(TILE_ALIGNMENT, MAX_TILE_SIZE);
    size.div_ceil(TILE_ALIGNMENT) * TILE_ALIGNMENT
}

/// Express a positive value as a RATIONAL with three decimals when it fits.
fn to_rational(value: f64) -> (u32, u32) {
    let scaled = (value * 1000.0).round();
    if scaled <= u32::MAX as f64 {
        (scaled as u32, 1000)
    } else {
        (value.round().min(u32::MAX as f64) as u32, 1)
    }
}

/// ImageDescription JSON: the base fields plus every present property.
pub fn image_description(metadata: &SlideMetadata) -> String {
    let mut map = Map::new();
    map.insert("axes".to_string(), Value::from("YXS"));
    map.insert("SignificantBits".to_string(), Value::from(8));
    for (key, value) in metadata.present() {
        let json = serde_json::to_value(value).unwrap_or_else(|_| Value::from(value.to_string()));
        map.insert(key.to_string(), json);
    }
    Value::Object(map).to_string()
}

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// What to build pyramids from.
#[derive(Debug)]
pub enum PyramidInput {
    /// An image file on disk; named after its stem, no metadata
    File(PathBuf),

    /// One in-memory raster
    Raster {
        name: String,
        image: RgbImage,
        metadata: SlideMetadata,
    },

    /// Every image of a split run, all sharing the slide's metadata
    Assembly {
        assembly: Assembly,
        metadata: SlideMetadata,
    },
}

/// One written pyramid file.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedPyramid {
    /// Output file
    pub path: PathBuf,

    /// `(width, height)` of each image, full resolution first
    pub levels: Vec<(u32, u32)>,

    /// Whether the file was written as BigTIFF
    pub bigtiff: bool,
}

/// Outcome of emitting one [`PyramidInput`].
#[derive(Debug, Default)]
pub struct EmitReport {
    pub emitted: Vec<EmittedPyramid>,

    /// Names that could not be written, with the cause
    pub failures: Vec<(String, SinkError)>,
}

// =============================================================================
// PyramidEmitter
// =============================================================================

/// Writes pyramid TIFFs into one output directory.
#[derive(Debug, Clone)]
pub struct PyramidEmitter {
    output_dir: PathBuf,
    subresolutions: u32,
    compression: Compression,
    encoder: JpegTileEncoder,
    bigtiff: Option<bool>,
}

impl PyramidEmitter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            subresolutions: DEFAULT_SUBRESOLUTIONS,
            compression: Compression::default(),
            encoder: JpegTileEncoder::default(),
            bigtiff: None,
        }
    }

    pub fn with_subresolutions(mut self, subresolutions: u32) -> Self {
        self.subresolutions = subresolutions;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.encoder = JpegTileEncoder::new(quality);
        self
    }

    /// Force BigTIFF on or off; `None` decides from the payload size.
    pub fn with_bigtiff(mut self, bigtiff: Option<bool>) -> Self {
        self.bigtiff = bigtiff;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<name>.tiff`
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.tiff", name))
    }

    /// Emit pyramids for an input, blocking work off the async runtime.
    ///
    /// A failing file in an [`PyramidInput::Assembly`] is recorded and the
    /// remaining images are still written.
    ///
    /// # Errors
    ///
    /// - [`SplitError::Source`] if a [`PyramidInput::File`] cannot be decoded
    /// - [`SplitError::Sink`] if the output directory cannot be created
    pub async fn emit_input(&self, input: PyramidInput) -> Result<EmitReport, SplitError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| SinkError::Io(IoError::from_std(&self.output_dir, &e)))?;

        let mut report = EmitReport::default();
        match input {
            PyramidInput::File(path) => {
                let name = slide_name(&path);
                let image = decode_file(path).await?;
                self.emit_one(name, image, SlideMetadata::empty(), &mut report)
                    .await;
            }
            PyramidInput::Raster {
                name,
                image,
                metadata,
            } => {
                self.emit_one(name, image, metadata, &mut report).await;
            }
            PyramidInput::Assembly { assembly, metadata } => {
                let mut images: Vec<_> = assembly.images.into_iter().collect();
                images.sort_by(|a, b| a.0.cmp(&b.0));
                for (name, stitched) in images {
                    self.emit_one(name, stitched.into_image(), metadata.clone(), &mut report)
                        .await;
                }
            }
        }

        info!(
            emitted = report.emitted.len(),
            failed = report.failures.len(),
            dir = %self.output_dir.display(),
            "Pyramid emission finished"
        );
        Ok(report)
    }

    async fn emit_one(
        &self,
        name: String,
        image: RgbImage,
        metadata: SlideMetadata,
        report: &mut EmitReport,
    ) {
        let emitter = self.clone();
        let task_name = name.clone();
        let result = tokio::task::spawn_blocking(move || emitter.emit(&task_name, &image, &metadata))
            .await
            .unwrap_or_else(|e| {
                Err(SinkError::Encode {
                    message: format!("emit task failed: {}", e),
                })
            });

        match result {
            Ok(emitted) => report.emitted.push(emitted),
            Err(e) => {
                warn!(name = %name, error = %e, "Pyramid emission failed");
                report.failures.push((name, e));
            }
        }
    }

    /// Write `image` as `<output_dir>/<name>.tiff`.
    ///
    /// Synchronous and CPU-bound; async callers should use
    /// [`PyramidEmitter::emit_input`].
    pub fn emit(
        &self,
        name: &str,
        image: &RgbImage,
        metadata: &SlideMetadata,
    ) -> Result<EmittedPyramid, SinkError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SinkError::InvalidRaster {
                reason: format!("cannot emit empty raster {}x{}", width, height),
            });
        }

        let options = EmitOptions::from_metadata(metadata);
        let levels = level_sizes(width, height, self.subresolutions);
        let payload: u64 = levels.iter().map(|&(w, h)| w as u64 * h as u64 * 3).sum();
        let bigtiff = self.bigtiff.unwrap_or(payload > CLASSIC_TIFF_LIMIT);

        let path = self.path_for(name);
        let mut writer = TiffWriter::create(&path, bigtiff)?;
        let description = image_description(metadata);

        let mut reduced: Option<RgbImage> = None;
        for (index, &(level_width, level_height)) in levels.iter().enumerate() {
            let current = reduced.as_ref().unwrap_or(image);

            let tiles = self.encode_tiles(current, options.tile_size)?;
            let downsample = width as f64 / level_width as f64;
            let entries = self.entries(index, current, &options, downsample, &description);
            writer.write_image(entries, &tiles)?;

            debug!(
                name,
                level = index,
                width = level_width,
                height = level_height,
                tiles = tiles.len(),
                "Wrote pyramid level"
            );

            if let Some(&(next_width, next_height)) = levels.get(index + 1) {
                let next = imageops::resize(current, next_width, next_height, FilterType::Triangle);
                reduced = Some(next);
            }
        }
        writer.finish()?;

        info!(
            path = %path.display(),
            levels = levels.len(),
            tile_size = options.tile_size,
            bigtiff,
            "Emitted pyramid"
        );

        Ok(EmittedPyramid {
            path,
            levels,
            bigtiff,
        })
    }

    /// Cut a level into zero-padded square tiles, row-major.
    fn encode_tiles(&self, image: &RgbImage, tile_size: u32) -> Result<Vec<Bytes>, SinkError> {
        let (width, height) = image.dimensions();
        let tiles_x = width.div_ceil(tile_size);
        let tiles_y = height.div_ceil(tile_size);

        let mut tiles = Vec::with_capacity(tiles_x as usize * tiles_y as usize);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x0 = tx * tile_size;
                let y0 = ty * tile_size;
                let w = tile_size.min(width - x0);
                let h = tile_size.min(height - y0);

                let mut tile = RgbImage::new(tile_size, tile_size);
                let pixels = imageops::crop_imm(image, x0, y0, w, h).to_image();
                imageops::replace(&mut tile, &pixels, 0, 0);

                let encoded = match self.compression {
                    Compression::Jpeg => self.encoder.encode(&tile)?,
                    Compression::None => Bytes::from(tile.into_raw()),
                };
                tiles.push(encoded);
            }
        }

        Ok(tiles)
    }

    fn entries(
        &self,
        index: usize,
        image: &RgbImage,
        options: &EmitOptions,
        downsample: f64,
        description: &str,
    ) -> Vec<IfdEntry> {
        let (x_res, y_res) = options.resolution(downsample);

        let mut entries = vec![
            IfdEntry::long(TiffTag::ImageWidth, image.width()),
            IfdEntry::long(TiffTag::ImageLength, image.height()),
            IfdEntry::new(TiffTag::BitsPerSample, TiffValue::Short(vec![8, 8, 8])),
            IfdEntry::short(TiffTag::Compression, self.compression.as_u16()),
            // RGB
            IfdEntry::short(TiffTag::PhotometricInterpretation, 2),
            IfdEntry::short(TiffTag::SamplesPerPixel, 3),
            IfdEntry::new(TiffTag::XResolution, TiffValue::Rational(vec![x_res])),
            IfdEntry::new(TiffTag::YResolution, TiffValue::Rational(vec![y_res])),
            // Chunky
            IfdEntry::short(TiffTag::PlanarConfiguration, 1),
            IfdEntry::short(TiffTag::ResolutionUnit, options.resolution_unit.as_u16()),
            IfdEntry::long(TiffTag::TileWidth, options.tile_size),
            IfdEntry::long(TiffTag::TileLength, options.tile_size),
        ];

        if index == 0 {
            entries.push(IfdEntry::ascii(TiffTag::ImageDescription, description));
            entries.push(IfdEntry::ascii(TiffTag::Software, SOFTWARE));
        } else {
            entries.push(IfdEntry::long(TiffTag::NewSubfileType, SUBFILE_REDUCED_IMAGE));
        }

        entries
    }
}

/// Sizes of the full-resolution image and each reduced image.
///
/// Halving stops early once an image is a single pixel.
pub fn level_sizes(width: u32, height: u32, subresolutions: u32) -> Vec<(u32, u32)> {
    let mut sizes = vec![(width, height)];
    let (mut w, mut h) = (width, height);
    for _ in 0..subresolutions {
        if w == 1 && h == 1 {
            break;
        }
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        sizes.push((w, h));
    }
    sizes
}

async fn decode_file(path: PathBuf) -> Result<RgbImage, SourceError> {
    tokio::task::spawn_blocking(move || {
        image::open(&path)
            .map(|img| img.to_rgb8())
            .map_err(|e| match e {
                image::ImageError::IoError(io) => SourceError::Io(IoError::from_std(&path, &io)),
                other => SourceError::Decode {
                    message: format!("{}: {}", path.display(), other),
                },
            })
    })
    .await
    .map_err(|e| SourceError::Decode {
        message: format!("decode task failed: {}", e),
    })?
}

// =============================================================================
// Tests
// =============================================================================
