use serde::Serialize;

use crate::grib::bits::{BitReader, BitWriter};
use crate::grib::grid::{Grid, GridShape};
use crate::grib::sections::{section_length, SectionKind};
use crate::grib::utils::u24_bytes;
use crate::grib::{GribError, Result};
use crate::read_as;

pub(crate) const SECT3_BMS_HEADER_SIZE: usize = 6;

/// Section 3: Bit Map Section. One flag per grid point in wire order,
/// `true` where the point holds a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Bitmap {
    bits: Vec<bool>,
}

impl Bitmap {
    pub fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Marks every non-NaN cell of `grid` as present.
    pub fn from_grid(grid: &Grid<f64>, shape: &GridShape) -> Result<Self> {
        Ok(Self {
            bits: grid.linearize(shape)?.iter().map(|v| !v.is_nan()).collect(),
        })
    }

    pub(crate) fn from_bytes(buf: &[u8], num_points: usize) -> Result<Self> {
        let length = section_length(buf, SectionKind::Bitmap, SECT3_BMS_HEADER_SIZE)?;

        let table_reference = read_as!(u16, buf, 4);
        if table_reference != 0 {
            return Err(GribError::UnsupportedBitmap {
                table: table_reference,
                offset: 0,
            });
        }

        let unused_bits = usize::from(buf[3]);
        let available = ((length - SECT3_BMS_HEADER_SIZE) * 8).saturating_sub(unused_bits);
        if available < num_points {
            debug!("bitmap holds {} bits for {} points", available, num_points);
            return Err(GribError::TruncatedInput {
                section: SectionKind::Bitmap,
                offset: length as u64,
            });
        }

        let bits = BitReader::new(&buf[SECT3_BMS_HEADER_SIZE..length])
            .for_section(SectionKind::Bitmap)
            .codes(1)
            .take(num_points)
            .map(|bit| bit == 1)
            .collect();

        Ok(Self { bits })
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BitWriter::with_capacity(self.bits.len());
        for bit in &self.bits {
            writer.write_bits(u32::from(*bit), 1)?;
        }
        let unused_bits = writer.pad_to_byte();
        let packed = writer.into_bytes();

        let length = SECT3_BMS_HEADER_SIZE + packed.len();
        if length > 0xff_ffff {
            return Err(GribError::EncodeError(format!(
                "BMS of {} octets does not fit a 24-bit length",
                length
            )));
        }

        let mut buf = Vec::with_capacity(length);
        buf.extend_from_slice(&u24_bytes(length as u32));
        buf.push(unused_bits);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&packed);
        Ok(buf)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether the point at wire index `i` holds a value.
    pub fn is_set(&self, i: usize) -> bool {
        self.bits.get(i).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grib::grid::ScanMode;

    #[test]
    fn bitmap_round_trip_discards_padding() -> anyhow::Result<()> {
        let bitmap = Bitmap::new(vec![true, false, true, true, false, false, true, false, true, true]);
        let bytes = bitmap.to_bytes()?;

        assert_eq!(bytes, vec![0, 0, 8, 6, 0, 0, 0b1011_0010, 0b1100_0000]);
        assert_eq!(Bitmap::from_bytes(&bytes, 10)?, bitmap);
        assert_eq!(bitmap.valid_count(), 6);
        Ok(())
    }

    #[test]
    fn predefined_bitmap_is_unsupported() {
        let bytes = [0, 0, 6, 0, 0, 3];
        assert!(matches!(
            Bitmap::from_bytes(&bytes, 4),
            Err(GribError::UnsupportedBitmap { table: 3, .. })
        ));
    }

    #[test]
    fn short_bitmap_is_truncated() {
        let bytes = [0, 0, 7, 0, 0, 0, 0xff];
        assert!(matches!(
            Bitmap::from_bytes(&bytes, 9),
            Err(GribError::TruncatedInput { section: SectionKind::Bitmap, .. })
        ));
    }

    #[test]
    fn from_grid_uses_wire_order() -> anyhow::Result<()> {
        let grid = Grid::from_vec(2, 2, vec![f64::NAN, 1.0, 2.0, 3.0])?;
        let shape = GridShape::new(2, 2, ScanMode::default());
        // wire order visits row 1 first
        assert_eq!(
            Bitmap::from_grid(&grid, &shape)?.bits(),
            &[true, true, false, true]
        );
        Ok(())
    }
}
