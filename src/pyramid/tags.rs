//! TIFF tag and field type definitions for the pyramid writer.
//!
//! This module defines the vocabulary the writer emits:
//! - Field types that determine how values are encoded
//! - Tag IDs for every field written to an IFD
//! - Compression and resolution unit codes
//!
//! The definitions support both classic TIFF and BigTIFF output.

use std::fmt;

// =============================================================================
// Header Constants
// =============================================================================

/// Byte order marker for little-endian files ("II")
pub const BYTE_ORDER_LITTLE_ENDIAN: [u8; 2] = *b"II";

/// Version number of a classic TIFF file
pub const TIFF_VERSION: u16 = 42;

/// Version number of a BigTIFF file
pub const BIGTIFF_VERSION: u16 = 43;

/// Size of offsets in a BigTIFF file, stored in its header
pub const BIGTIFF_OFFSET_SIZE: u16 = 8;

/// NewSubfileType bit marking a reduced-resolution image
pub const SUBFILE_REDUCED_IMAGE: u32 = 1;

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
///
/// Only the types the writer produces are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// 8-bit ASCII character (1 byte)
    Ascii = 2,

    /// Unsigned 16-bit integer (2 bytes)
    Short = 3,

    /// Unsigned 32-bit integer (4 bytes)
    Long = 4,

    /// Two LONGs: numerator then denominator (8 bytes)
    Rational = 5,

    /// Unsigned 64-bit integer (8 bytes) - BigTIFF only
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Ascii => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational => 8,
            FieldType::Long8 => 8,
        }
    }

    /// Get the numeric type code.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Maximum bytes that can be stored inline in a classic TIFF IFD entry.
    pub const INLINE_THRESHOLD_TIFF: usize = 4;

    /// Maximum bytes that can be stored inline in a BigTIFF IFD entry.
    pub const INLINE_THRESHOLD_BIGTIFF: usize = 8;

    /// Check if `count` values of this type fit in the entry's value field.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let total_size = self.size_in_bytes() as u64 * count;
        let threshold = if is_bigtiff {
            Self::INLINE_THRESHOLD_BIGTIFF as u64
        } else {
            Self::INLINE_THRESHOLD_TIFF as u64
        };
        total_size <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs written to every pyramid IFD.
///
/// Entries in an IFD must be sorted by tag ID; the discriminants are the
/// IDs, so deriving `Ord` gives the required order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Basic Image Structure
    // -------------------------------------------------------------------------
    /// Kind of image in this IFD (0 = full resolution, 1 = reduced)
    NewSubfileType = 254,

    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample, one value per channel
    BitsPerSample = 258,

    /// Compression scheme used for the tiles
    Compression = 259,

    /// Photometric interpretation (RGB)
    PhotometricInterpretation = 262,

    /// Description string (JSON metadata)
    ImageDescription = 270,

    /// Number of components per pixel (3 for RGB)
    SamplesPerPixel = 277,

    /// Pixels per unit in X direction
    XResolution = 282,

    /// Pixels per unit in Y direction
    YResolution = 283,

    /// How components are organized (1 = chunky)
    PlanarConfiguration = 284,

    /// Unit of resolution (1=none, 2=inch, 3=centimeter)
    ResolutionUnit = 296,

    /// Name of the software that wrote the file
    Software = 305,

    // -------------------------------------------------------------------------
    // Tile Organization
    // -------------------------------------------------------------------------
    /// Width of each tile in pixels
    TileWidth = 322,

    /// Height (length) of each tile in pixels
    TileLength = 323,

    /// Byte offsets of each tile in the file
    TileOffsets = 324,

    /// Byte counts of each tile
    TileByteCounts = 325,
}

impl TiffTag {
    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// Tile compression written to the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum Compression {
    /// Raw RGB bytes
    None = 1,

    /// Self-contained baseline JPEG per tile
    #[default]
    Jpeg = 7,
}

impl Compression {
    /// Get the numeric compression code.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get a human-readable name for the compression scheme.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Jpeg => "JPEG",
        }
    }
}

// =============================================================================
// Resolution Unit
// =============================================================================

/// Unit of the X/Y resolution fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum ResolutionUnit {
    /// No absolute unit
    None = 1,

    /// Pixels per inch
    Inch = 2,

    /// Pixels per centimeter
    #[default]
    Centimeter = 3,
}

impl ResolutionUnit {
    /// Get the numeric unit code.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Parse a unit as found in slide properties.
    ///
    /// Accepts the names (`centimeter`, `inch`, `none`, any case) and the
    /// numeric codes 1-3.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "1" => Some(ResolutionUnit::None),
            "inch" | "2" => Some(ResolutionUnit::Inch),
            "centimeter" | "cm" | "3" => Some(ResolutionUnit::Centimeter),
            _ => None,
        }
    }

    /// Pixels per unit for a pixel size in micrometers.
    ///
    /// Returns `None` for [`ResolutionUnit::None`] or a non-positive size.
    pub fn pixels_per_unit(self, microns_per_pixel: f64) -> Option<f64> {
        if microns_per_pixel <= 0.0 || !microns_per_pixel.is_finite() {
            return None;
        }
        match self {
            ResolutionUnit::None => None,
            ResolutionUnit::Inch => Some(25_400.0 / microns_per_pixel),
            ResolutionUnit::Centimeter => Some(10_000.0 / microns_per_pixel),
        }
    }
}

impl fmt::Display for ResolutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionUnit::None => "none",
            ResolutionUnit::Inch => "inch",
            ResolutionUnit::Centimeter => "centimeter",
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
