use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::grib::utils::{read_u24, u24_bytes};
use crate::grib::{GribError, Result};

pub mod sect1;
pub mod sect2;
pub mod sect3;
pub mod sect4;

pub(crate) const SECT0_IS_MAGIC: &[u8; 4] = b"GRIB";
pub(crate) const SECT0_IS_SIZE: usize = 8;
pub(crate) const SECT5_ES_MAGIC: &[u8; 4] = b"7777";
pub(crate) const SECT5_ES_SIZE: usize = SECT5_ES_MAGIC.len();
pub(crate) const SECT_LENGTH_SIZE: usize = 3;
pub(crate) const GRIB_EDITION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SectionKind {
    Indicator,
    Product,
    Grid,
    Bitmap,
    Data,
    End,
}

impl Display for SectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SectionKind::Indicator => "IS",
            SectionKind::Product => "PDS",
            SectionKind::Grid => "GDS",
            SectionKind::Bitmap => "BMS",
            SectionKind::Data => "BDS",
            SectionKind::End => "end section",
        };
        f.write_str(name)
    }
}

/// Section 0: Indicator Section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    /// Total length of GRIB message in octets (including Section 0 and the end marker)
    pub total_length: u32,
    /// GRIB Edition Number
    pub edition: u8,
}

impl Indicator {
    pub(crate) fn from_bytes(buf: &[u8; SECT0_IS_SIZE]) -> Result<Self> {
        if &buf[0..4] != SECT0_IS_MAGIC {
            return Err(GribError::NotGrib);
        }

        let edition = buf[7];
        if edition != GRIB_EDITION {
            return Err(GribError::EditionMismatch { edition, offset: 0 });
        }

        Ok(Self {
            total_length: read_u24(buf, 4),
            edition,
        })
    }

    pub(crate) fn to_bytes(&self) -> [u8; SECT0_IS_SIZE] {
        let mut buf = [0; SECT0_IS_SIZE];
        buf[0..4].copy_from_slice(SECT0_IS_MAGIC);
        buf[4..7].copy_from_slice(&u24_bytes(self.total_length));
        buf[7] = self.edition;
        buf
    }
}

/// Validates the 3-octet length prefix every section after the indicator
/// starts with, returning the declared length.
pub(crate) fn section_length(buf: &[u8], section: SectionKind, min: usize) -> Result<usize> {
    if buf.len() < SECT_LENGTH_SIZE {
        return Err(GribError::TruncatedInput { section, offset: 0 });
    }

    let length = read_u24(buf, 0) as usize;
    if length < min {
        return Err(GribError::ParseError(format!(
            "{} declares {} octets, needs at least {}",
            section, length, min
        )));
    }
    if buf.len() < length {
        return Err(GribError::TruncatedInput {
            section,
            offset: buf.len() as u64,
        });
    }

    Ok(length)
}
