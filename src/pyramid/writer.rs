//! Tiled TIFF / BigTIFF writer.
//!
//! Writes little-endian files one image (IFD) at a time. Each image is laid
//! out as its tile data followed by its IFD and the IFD's out-of-line values:
//!
//! ```text
//! ┌────────┬─────────────┬─────┬──────────┬─────────────┬─────┬──────────┐
//! │ header │ tiles (L0)  │ IFD │ overflow │ tiles (L1)  │ IFD │ overflow │ ...
//! └───┬────┴─────────────┴──▲──┴──────────┴─────────────┴──▲──┴──────────┘
//!     │   first IFD offset  │         next IFD offset       │
//!     └─────────────────────┘   (patched when L1 lands) ────┘
//! ```
//!
//! The previous IFD's "next" pointer is patched in place once the following
//! IFD's position is known, so the output must be seekable.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;

use crate::error::{IoError, SinkError};

use super::tags::{
    FieldType, TiffTag, BIGTIFF_OFFSET_SIZE, BIGTIFF_VERSION, BYTE_ORDER_LITTLE_ENDIAN,
    TIFF_VERSION,
};

// =============================================================================
// IFD Values
// =============================================================================

/// Value of one IFD entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TiffValue {
    /// Text; a trailing NUL is added when written
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    /// `(numerator, denominator)` pairs
    Rational(Vec<(u32, u32)>),
    Long8(Vec<u64>),
}

impl TiffValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            TiffValue::Ascii(_) => FieldType::Ascii,
            TiffValue::Short(_) => FieldType::Short,
            TiffValue::Long(_) => FieldType::Long,
            TiffValue::Rational(_) => FieldType::Rational,
            TiffValue::Long8(_) => FieldType::Long8,
        }
    }

    /// Number of values, as stored in the entry's count field.
    pub fn count(&self) -> u64 {
        match self {
            TiffValue::Ascii(s) => s.len() as u64 + 1,
            TiffValue::Short(v) => v.len() as u64,
            TiffValue::Long(v) => v.len() as u64,
            TiffValue::Rational(v) => v.len() as u64,
            TiffValue::Long8(v) => v.len() as u64,
        }
    }

    /// Little-endian encoding, exactly `count * size_in_bytes` long.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.count() as usize * self.field_type().size_in_bytes());
        match self {
            TiffValue::Ascii(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            TiffValue::Short(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            TiffValue::Long(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            TiffValue::Rational(v) => v.iter().for_each(|(n, d)| {
                out.extend_from_slice(&n.to_le_bytes());
                out.extend_from_slice(&d.to_le_bytes());
            }),
            TiffValue::Long8(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        }
        out
    }
}

/// One tag/value pair of an IFD.
#[derive(Debug, Clone, PartialEq)]
pub struct IfdEntry {
    pub tag: TiffTag,
    pub value: TiffValue,
}

impl IfdEntry {
    pub fn new(tag: TiffTag, value: TiffValue) -> Self {
        Self { tag, value }
    }

    pub fn short(tag: TiffTag, value: u16) -> Self {
        Self::new(tag, TiffValue::Short(vec![value]))
    }

    pub fn long(tag: TiffTag, value: u32) -> Self {
        Self::new(tag, TiffValue::Long(vec![value]))
    }

    pub fn ascii(tag: TiffTag, value: impl Into<String>) -> Self {
        Self::new(tag, TiffValue::Ascii(value.into()))
    }
}

// =============================================================================
// TiffWriter
// =============================================================================

/// Sequential writer of tiled images into one TIFF container.
pub struct TiffWriter<W: Write + Seek> {
    out: W,
    path: String,
    bigtiff: bool,
    /// Current end of file
    position: u64,
    /// Where the offset of the next IFD goes
    next_ifd_slot: u64,
    images: usize,
}

impl TiffWriter<BufWriter<File>> {
    /// Create (or truncate) the file at `path` and write the header.
    pub fn create(path: &Path, bigtiff: bool) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|e| SinkError::Io(IoError::from_std(path, &e)))?;
        let mut writer = Self::new(BufWriter::new(file), bigtiff)?;
        writer.path = path.display().to_string();
        Ok(writer)
    }
}

impl<W: Write + Seek> TiffWriter<W> {
    /// Wrap a seekable output and write the header.
    pub fn new(out: W, bigtiff: bool) -> Result<Self, SinkError> {
        let mut writer = Self {
            out,
            path: "<stream>".to_string(),
            bigtiff,
            position: 0,
            next_ifd_slot: 0,
            images: 0,
        };

        let mut header = Vec::with_capacity(16);
        header.extend_from_slice(&BYTE_ORDER_LITTLE_ENDIAN);
        if bigtiff {
            header.extend_from_slice(&BIGTIFF_VERSION.to_le_bytes());
            header.extend_from_slice(&BIGTIFF_OFFSET_SIZE.to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes());
            writer.next_ifd_slot = header.len() as u64;
            header.extend_from_slice(&0u64.to_le_bytes());
        } else {
            header.extend_from_slice(&TIFF_VERSION.to_le_bytes());
            writer.next_ifd_slot = header.len() as u64;
            header.extend_from_slice(&0u32.to_le_bytes());
        }
        writer.write_bytes(&header)?;

        Ok(writer)
    }

    pub fn is_bigtiff(&self) -> bool {
        self.bigtiff
    }

    /// Number of images written so far.
    pub fn image_count(&self) -> usize {
        self.images
    }

    /// Write one tiled image.
    ///
    /// `tiles` are the encoded tiles in row-major order; the writer adds the
    /// TileOffsets and TileByteCounts entries itself. Returns the offset of
    /// the image's IFD.
    pub fn write_image(
        &mut self,
        mut entries: Vec<IfdEntry>,
        tiles: &[Bytes],
    ) -> Result<u64, SinkError> {
        let mut offsets = Vec::with_capacity(tiles.len());
        let mut counts = Vec::with_capacity(tiles.len());
        for tile in tiles {
            offsets.push(self.position);
            counts.push(tile.len() as u64);
            self.write_bytes(tile)?;
        }

        entries.push(IfdEntry::new(TiffTag::TileOffsets, self.offset_value(offsets)?));
        entries.push(IfdEntry::new(TiffTag::TileByteCounts, self.offset_value(counts)?));
        entries.sort_by_key(|e| e.tag);

        self.align()?;
        let ifd_offset = self.position;
        let (ifd, next_slot) = self.encode_ifd(&entries, ifd_offset)?;
        self.write_bytes(&ifd)?;

        self.patch_offset(self.next_ifd_slot, ifd_offset)?;
        self.next_ifd_slot = next_slot;
        self.images += 1;

        Ok(ifd_offset)
    }

    /// Flush and return the output.
    pub fn finish(mut self) -> Result<W, SinkError> {
        self.out.flush().map_err(|e| self.io_error(&e))?;
        Ok(self.out)
    }

    /// Encode the IFD at `ifd_offset` followed by its out-of-line values.
    ///
    /// Returns the bytes and the absolute position of the next-IFD field.
    fn encode_ifd(&self, entries: &[IfdEntry], ifd_offset: u64) -> Result<(Vec<u8>, u64), SinkError> {
        let (count_size, entry_size, next_size) = if self.bigtiff {
            (8u64, 20u64, 8u64)
        } else {
            (2, 12, 4)
        };
        let n = entries.len() as u64;
        let table_size = count_size + n * entry_size + next_size;
        let overflow_base = ifd_offset + table_size;

        let mut table = Vec::with_capacity(table_size as usize);
        let mut overflow: Vec<u8> = Vec::new();

        if self.bigtiff {
            table.extend_from_slice(&n.to_le_bytes());
        } else {
            table.extend_from_slice(&(n as u16).to_le_bytes());
        }

        for entry in entries {
            let field_type = entry.value.field_type();
            let count = entry.value.count();
            let data = entry.value.to_bytes();

            table.extend_from_slice(&entry.tag.as_u16().to_le_bytes());
            table.extend_from_slice(&field_type.as_u16().to_le_bytes());
            self.push_offset(&mut table, count)?;

            if field_type.fits_inline(count, self.bigtiff) {
                let inline = if self.bigtiff { 8 } else { 4 };
                table.extend_from_slice(&data);
                table.resize(table.len() + inline - data.len(), 0);
            } else {
                if overflow.len() % 2 == 1 {
                    overflow.push(0);
                }
                self.push_offset(&mut table, overflow_base + overflow.len() as u64)?;
                overflow.extend_from_slice(&data);
            }
        }

        let next_slot = ifd_offset + table.len() as u64;
        self.push_offset(&mut table, 0)?;
        table.extend_from_slice(&overflow);

        Ok((table, next_slot))
    }

    /// Offsets and byte counts use LONG8 in BigTIFF and LONG otherwise.
    fn offset_value(&self, values: Vec<u64>) -> Result<TiffValue, SinkError> {
        if self.bigtiff {
            return Ok(TiffValue::Long8(values));
        }
        values
            .into_iter()
            .map(|v| self.classic_offset(v))
            .collect::<Result<Vec<u32>, _>>()
            .map(TiffValue::Long)
    }

    fn push_offset(&self, out: &mut Vec<u8>, value: u64) -> Result<(), SinkError> {
        if self.bigtiff {
            out.extend_from_slice(&value.to_le_bytes());
        } else {
            out.extend_from_slice(&self.classic_offset(value)?.to_le_bytes());
        }
        Ok(())
    }

    fn classic_offset(&self, value: u64) -> Result<u32, SinkError> {
        u32::try_from(value).map_err(|_| SinkError::Encode {
            message: format!(
                "{}: offset {} exceeds classic TIFF range; BigTIFF is required",
                self.path, value
            ),
        })
    }

    fn patch_offset(&mut self, slot: u64, value: u64) -> Result<(), SinkError> {
        let mut bytes = Vec::with_capacity(8);
        self.push_offset(&mut bytes, value)?;

        self.out
            .seek(SeekFrom::Start(slot))
            .and_then(|_| self.out.write_all(&bytes))
            .and_then(|_| self.out.seek(SeekFrom::Start(self.position)))
            .map_err(|e| self.io_error(&e))?;
        Ok(())
    }

    /// IFDs must start on a word boundary.
    fn align(&mut self) -> Result<(), SinkError> {
        if self.position % 2 == 1 {
            self.write_bytes(&[0])?;
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.out.write_all(bytes).map_err(|e| self.io_error(&e))?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn io_error(&self, err: &std::io::Error) -> SinkError {
        SinkError::Io(IoError::from_std(&self.path, err))
    }
}

// =============================================================================
// Tests
// =============================================================================
