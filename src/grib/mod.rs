pub mod bits;
pub mod grid;
pub mod ibm;
mod reader;
pub mod sections;
pub mod tables;
mod utils;

use std::io::Write;

use serde::Serialize;

pub use crate::grib::grid::{Grid, GridShape, ScanMode};
pub use crate::grib::reader::{GribReader, RecordIndex, DEFAULT_SEARCH_WINDOW};
pub use crate::grib::sections::sect1::ProductDefinition;
pub use crate::grib::sections::sect2::{GridDefinition, LatLon, Projection};
pub use crate::grib::sections::sect3::Bitmap;
pub use crate::grib::sections::sect4::{BinaryDataSection, BitWidth, DataHeader, PackingParams, ValueStats};
pub use crate::grib::sections::{Indicator, SectionKind};

use crate::grib::sections::{sect4, GRIB_EDITION, SECT0_IS_SIZE, SECT5_ES_MAGIC};

#[macro_export]
macro_rules! read_as {
    ($ty:ty, $buf:ident, $start:expr) => {{
        let end = $start + std::mem::size_of::<$ty>();
        <$ty>::from_be_bytes($buf[$start..end].try_into().unwrap())
    }};
}

pub type Result<T, E = GribError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum GribError {
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a GRIB source")]
    NotGrib,

    #[error("GRIBVersionMismatch({edition}) in IS at offset {offset}")]
    EditionMismatch { edition: u8, offset: u64 },

    #[error("Truncated {section} at offset {offset}")]
    TruncatedInput { section: SectionKind, offset: u64 },

    #[error("UnsupportedPacking(flags {flags:#x}) in BDS at offset {offset}")]
    UnsupportedPacking { flags: u8, offset: u64 },

    #[error("UnsupportedBitmap(predefined bitmap {table}) in BMS at offset {offset}")]
    UnsupportedBitmap { table: u16, offset: u64 },

    #[error("InvalidFloat({0})")]
    InvalidFloat(f64),

    #[error("Index {index} out of range for {len} grid points")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Record at offset {offset} has no GDS")]
    MissingGds { offset: u64 },

    #[error("Expected end section at offset {offset}, found {found:?}")]
    FooterMismatch { offset: u64, found: [u8; 4] },

    #[error("ParseError({0})")]
    ParseError(String),

    #[error("DecodeError({reason}) in {section} at offset {offset}")]
    DecodeError {
        section: SectionKind,
        offset: u64,
        reason: String,
    },

    #[error("EncodeError({0})")]
    EncodeError(String),
}

impl GribError {
    /// Turns a section-relative offset into a stream offset.
    pub(crate) fn at(self, base: u64) -> Self {
        match self {
            GribError::TruncatedInput { section, offset } => GribError::TruncatedInput {
                section,
                offset: base + offset,
            },
            GribError::EditionMismatch { edition, offset } => GribError::EditionMismatch {
                edition,
                offset: base + offset,
            },
            GribError::UnsupportedPacking { flags, offset } => GribError::UnsupportedPacking {
                flags,
                offset: base + offset,
            },
            GribError::UnsupportedBitmap { table, offset } => GribError::UnsupportedBitmap {
                table,
                offset: base + offset,
            },
            GribError::DecodeError {
                section,
                offset,
                reason,
            } => GribError::DecodeError {
                section,
                offset: base + offset,
                reason,
            },
            e => e,
        }
    }

    /// Section and stream offset the error points at, when it has one.
    pub fn location(&self) -> Option<(SectionKind, u64)> {
        match self {
            GribError::TruncatedInput { section, offset }
            | GribError::DecodeError { section, offset, .. } => Some((*section, *offset)),
            GribError::EditionMismatch { offset, .. } => Some((SectionKind::Indicator, *offset)),
            GribError::UnsupportedPacking { offset, .. } => Some((SectionKind::Data, *offset)),
            GribError::UnsupportedBitmap { offset, .. } => Some((SectionKind::Bitmap, *offset)),
            GribError::FooterMismatch { offset, .. } => Some((SectionKind::End, *offset)),
            GribError::MissingGds { offset } => Some((SectionKind::Grid, *offset)),
            _ => None,
        }
    }
}

/// One complete GRIB edition 1 message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub indicator: Indicator,
    pub product_definition: ProductDefinition,
    pub grid_definition: GridDefinition,
    pub bitmap: Option<Bitmap>,
    pub data: BinaryDataSection,
}

impl Record {
    /// Packs `grid` under the given definitions and decodes it back, so the
    /// record holds the values a reader of the encoded message would see.
    pub fn from_grid(
        product_definition: ProductDefinition,
        grid_definition: GridDefinition,
        grid: &Grid<f64>,
        width: BitWidth,
    ) -> Result<Self> {
        let bytes = assemble(&product_definition, &grid_definition, grid, None, width)?;
        decode_record(&bytes)
    }

    pub fn values(&self) -> &Grid<f64> {
        &self.data.grid
    }

    pub fn shape(&self) -> GridShape {
        self.grid_definition.shape()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_record(self)
    }
}

pub struct Grib {
    pub records: Vec<Record>,
    /// Records found but not decodable (no GDS).
    pub skipped: usize,
}

/// Decodes every record of a stream.
///
/// Fails with [`GribError::NotGrib`] when no record header is found at all.
pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Grib> {
    let mut reader = GribReader::new(reader);

    let mut records = Vec::new();
    while let Some(record) = reader.next_record()? {
        records.push(record);
    }

    if reader.records_seen() == 0 {
        return Err(GribError::NotGrib);
    }

    info!(
        "Read {} records ({} skipped)",
        records.len(),
        reader.skipped()
    );

    Ok(Grib {
        records,
        skipped: reader.skipped(),
    })
}

/// Decodes a single record held in memory, as located by [`GribReader::index`].
pub fn decode_record(bytes: &[u8]) -> Result<Record> {
    let mut reader = GribReader::new(bytes);
    match reader.next_record()? {
        Some(record) => Ok(record),
        None if reader.skipped() > 0 => Err(GribError::MissingGds { offset: 0 }),
        None => Err(GribError::NotGrib),
    }
}

/// Re-encodes a record from its grid, with variable width packing.
pub fn encode_record(record: &Record) -> Result<Vec<u8>> {
    encode_record_with(record, BitWidth::Variable)
}

pub fn encode_record_with(record: &Record, width: BitWidth) -> Result<Vec<u8>> {
    assemble(
        &record.product_definition,
        &record.grid_definition,
        &record.data.grid,
        record.bitmap.as_ref(),
        width,
    )
}

pub fn to_writer<W: Write>(mut writer: W, records: &[Record]) -> Result<()> {
    for record in records {
        writer.write_all(&encode_record(record)?)?;
    }
    writer.flush()?;
    Ok(())
}

fn assemble(
    pds: &ProductDefinition,
    gds: &GridDefinition,
    grid: &Grid<f64>,
    bitmap: Option<&Bitmap>,
    width: BitWidth,
) -> Result<Vec<u8>> {
    let shape = gds.shape();

    // Missing points always travel in a bitmap, rebuilt from the grid itself.
    let has_gaps = grid.values().iter().any(|v| v.is_nan());
    let bitmap = if has_gaps || bitmap.is_some() {
        Some(Bitmap::from_grid(grid, &shape)?)
    } else {
        None
    };

    let pds = pds.with_sections(true, bitmap.is_some());
    let packed = sect4::encode(
        grid,
        &shape,
        PackingParams {
            decimal_scale: pds.decimal_scale,
            width,
        },
        bitmap.as_ref(),
    )?;

    let mut buf = Vec::new();
    buf.extend_from_slice(&[0; SECT0_IS_SIZE]);
    buf.extend_from_slice(&pds.to_bytes()?);
    buf.extend_from_slice(&gds.to_bytes()?);
    if let Some(bitmap) = &bitmap {
        buf.extend_from_slice(&bitmap.to_bytes()?);
    }
    buf.extend_from_slice(&packed.bytes);
    buf.extend_from_slice(SECT5_ES_MAGIC);

    // The indicator is written last, once every other length is known.
    let total_length = u32::try_from(buf.len())
        .ok()
        .filter(|len| *len <= 0xff_ffff)
        .ok_or_else(|| {
            GribError::EncodeError(format!(
                "Record of {} octets does not fit a 24-bit length",
                buf.len()
            ))
        })?;
    let indicator = Indicator {
        total_length,
        edition: GRIB_EDITION,
    };
    buf[..SECT0_IS_SIZE].copy_from_slice(&indicator.to_bytes());

    debug!("Encoded record of {} octets", total_length);
    Ok(buf)
}
