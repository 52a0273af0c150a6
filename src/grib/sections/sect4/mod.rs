use serde::Serialize;

use crate::grib::grid::Grid;
use crate::grib::ibm;
use crate::grib::sections::{section_length, SectionKind};
use crate::grib::utils::{u24_bytes, GribInt, ToGribUint};
use crate::grib::{GribError, Result};
use crate::read_as;

pub mod packing;
pub mod simple;

pub use packing::{encode, BitWidth, PackedData, PackingParams};
pub use simple::decode;

pub(crate) const SECT4_BDS_HEADER_SIZE: usize = 11;
pub(crate) const MAX_BITS_PER_VALUE: u8 = 32;

/// Octets 1-11 of the Binary Data Section, plus the decimal scale factor
/// carried over from the PDS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataHeader {
    /// Length of the section in octets, always even
    pub length: u32,
    /// Number of unused bits at the end of the section (0-15)
    pub unused_bits: u8,
    /// Binary scale factor (E)
    pub binary_scale: i16,
    /// Reference value (R), the minimum of the scaled values
    pub reference_value: f64,
    /// Number of bits into which a datum point is packed
    pub bits_per_value: u8,
    /// Decimal scale factor (D) from the PDS
    pub decimal_scale: i16,
}

impl DataHeader {
    pub(crate) fn from_bytes(buf: &[u8], decimal_scale: i16) -> Result<Self> {
        let length = section_length(buf, SectionKind::Data, SECT4_BDS_HEADER_SIZE)?;

        // Table 11 flags live in the high nibble; anything set means spherical
        // harmonics, second order packing, integer data or extra flags.
        let flags = buf[3] >> 4;
        if flags != 0 {
            return Err(GribError::UnsupportedPacking { flags, offset: 0 });
        }

        let bits_per_value = buf[10];
        if bits_per_value > MAX_BITS_PER_VALUE {
            return Err(GribError::DecodeError {
                section: SectionKind::Data,
                offset: 0,
                reason: format!(
                    "{} bits per value, at most {} are supported",
                    bits_per_value, MAX_BITS_PER_VALUE
                ),
            });
        }

        Ok(Self {
            length: length as u32,
            unused_bits: buf[3] & 0x0f,
            binary_scale: read_as!(u16, buf, 4).as_grib_int(),
            reference_value: ibm::decode([buf[6], buf[7], buf[8], buf[9]]),
            bits_per_value,
            decimal_scale,
        })
    }

    pub(crate) fn to_bytes(&self) -> Result<[u8; SECT4_BDS_HEADER_SIZE]> {
        if self.length > 0xff_ffff {
            return Err(GribError::EncodeError(format!(
                "BDS of {} octets does not fit a 24-bit length",
                self.length
            )));
        }

        let mut buf = [0; SECT4_BDS_HEADER_SIZE];
        buf[0..3].copy_from_slice(&u24_bytes(self.length));
        buf[3] = self.unused_bits & 0x0f;
        buf[4..6].copy_from_slice(&self.binary_scale.to_grib_uint().to_be_bytes());
        buf[6..10].copy_from_slice(&ibm::encode(self.reference_value)?);
        buf[10] = self.bits_per_value;
        Ok(buf)
    }

    pub fn is_constant(&self) -> bool {
        self.bits_per_value == 0
    }

    /// Number of whole values the payload can hold.
    pub fn packed_values(&self) -> usize {
        if self.bits_per_value == 0 {
            return 0;
        }
        let payload_bits = (self.length as usize).saturating_sub(SECT4_BDS_HEADER_SIZE) * 8;
        payload_bits.saturating_sub(self.unused_bits.into()) / usize::from(self.bits_per_value)
    }

    /// Value every valid point takes in a constant field.
    pub fn constant_value(&self) -> f64 {
        self.reference_value * 10f64.powi(-i32::from(self.decimal_scale))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueStats {
    pub min: f64,
    pub max: f64,
    pub valid_count: usize,
}

impl Default for ValueStats {
    fn default() -> Self {
        Self {
            min: f64::NAN,
            max: f64::NAN,
            valid_count: 0,
        }
    }
}

impl ValueStats {
    pub(crate) fn add(&mut self, value: f64) {
        self.min = if self.valid_count == 0 { value } else { self.min.min(value) };
        self.max = if self.valid_count == 0 { value } else { self.max.max(value) };
        self.valid_count += 1;
    }
}

/// Section 4: Binary Data Section, unpacked. Points without a value hold NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryDataSection {
    pub header: DataHeader,
    pub grid: Grid<f64>,
    pub stats: ValueStats,
}

impl BinaryDataSection {
    pub fn is_constant(&self) -> bool {
        self.header.is_constant()
    }
}
