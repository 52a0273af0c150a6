use num::ToPrimitive;

use crate::grib::bits::BitReader;
use crate::grib::grid::Grid;
use crate::grib::sections::sect2::GridDefinition;
use crate::grib::sections::sect3::Bitmap;
use crate::grib::sections::sect4::{BinaryDataSection, DataHeader, ValueStats, SECT4_BDS_HEADER_SIZE};
use crate::grib::sections::SectionKind;
use crate::grib::{GribError, Result};

/// Unpacks a simple-packed grid point BDS onto the grid described by `gds`.
///
/// `decimal_scale` comes from the PDS. With a bitmap only the points it marks
/// consume packed values; the others, and any points past the end of a short
/// payload, are left as NaN.
pub fn decode(
    buf: &[u8],
    decimal_scale: i16,
    gds: &GridDefinition,
    bitmap: Option<&Bitmap>,
) -> Result<BinaryDataSection> {
    let header = DataHeader::from_bytes(buf, decimal_scale)?;
    let shape = gds.shape();

    if let Some(bitmap) = bitmap {
        if bitmap.len() != shape.len() {
            return Err(GribError::DecodeError {
                section: SectionKind::Data,
                offset: 0,
                reason: format!(
                    "Bitmap of {} points for a grid of {}",
                    bitmap.len(),
                    shape.len()
                ),
            });
        }
    }
    let is_valid = |i: usize| bitmap.map_or(true, |b| b.is_set(i));
    let expected = bitmap.map_or(shape.len(), Bitmap::valid_count);

    let values: Vec<f64> = if header.is_constant() {
        vec![header.constant_value(); expected]
    } else {
        let available = header.packed_values();
        if available < expected {
            if bitmap.is_some() {
                return Err(GribError::TruncatedInput {
                    section: SectionKind::Data,
                    offset: u64::from(header.length),
                });
            }
            debug!("BDS holds {} of {} values", available, expected);
        }

        let payload = &buf[SECT4_BDS_HEADER_SIZE..header.length as usize];
        let codes = BitReader::new(payload)
            .codes(header.bits_per_value.into())
            .take(expected);
        SimpleDecoderIterator::new(
            codes,
            header.reference_value,
            header.binary_scale,
            header.decimal_scale,
        )
        .collect()
    };

    let mut grid = Grid::missing(shape.nx, shape.ny);
    let mut stats = ValueStats::default();
    let mut values = values.into_iter();
    for i in (0..shape.len()).filter(|i| is_valid(*i)) {
        let value = match values.next() {
            Some(value) => value,
            None => break,
        };
        let (col, row) = shape.index_to_coord(i)?;
        grid.set(col, row, value)?;
        stats.add(value);
    }

    Ok(BinaryDataSection {
        header,
        grid,
        stats,
    })
}

/// Y = (R + X * 2^E) * 10^-D
pub(crate) struct SimpleDecoderIterator<I: Iterator<Item = N>, N: ToPrimitive> {
    bitwise_iter: I,
    reference_value: f64,
    binary_scale: f64,
    decimal_scale: f64,
}

impl<I: Iterator<Item = N>, N: ToPrimitive> SimpleDecoderIterator<I, N> {
    pub(crate) fn new(bitwise_iter: I, reference_value: f64, binary_scale_factor: i16, decimal_scale_factor: i16) -> Self {
        Self {
            bitwise_iter,
            reference_value,
            binary_scale: 2_f64.powi(binary_scale_factor.into()),
            decimal_scale: 10_f64.powi(-i32::from(decimal_scale_factor)),
        }
    }
}

impl<I: Iterator<Item = N>, N: ToPrimitive> Iterator for SimpleDecoderIterator<I, N> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let encoded = self.bitwise_iter.next()?.to_f64()?;
        Some((self.reference_value + encoded * self.binary_scale) * self.decimal_scale)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.bitwise_iter.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grib::grid::ScanMode;
    use crate::grib::sections::sect2::LatLon;

    fn gds(nx: u32, ny: u32) -> GridDefinition {
        GridDefinition::lat_lon(
            nx,
            ny,
            LatLon {
                la1: 1000,
                lo1: 0,
                resolution_flags: 0,
                la2: 0,
                lo2: 1000,
                di: 1000,
                dj: 1000,
            },
            ScanMode::default(),
        )
    }

    #[test]
    fn decode_simple_packing() -> anyhow::Result<()> {
        // R = 1.0, E = 0, 2 bits, codes 0 1 2 3
        let section = [0, 0, 12, 0, 0, 0, 0x41, 0x10, 0, 0, 2, 0b0001_1011];
        let bds = decode(&section, 0, &gds(2, 2), None)?;

        assert!(!bds.is_constant());
        // first wire row is the northern one
        assert_eq!(bds.grid.values(), &[3.0, 4.0, 1.0, 2.0]);
        assert_eq!(bds.stats.min, 1.0);
        assert_eq!(bds.stats.max, 4.0);
        assert_eq!(bds.stats.valid_count, 4);
        Ok(())
    }

    #[test]
    fn decode_applies_scales() -> anyhow::Result<()> {
        // R = 100, E = -1, D = 1, 4 bits, codes 0 and 15
        let section = [0, 0, 12, 0, 0x80, 0x01, 0x42, 0x64, 0, 0, 4, 0x0f];
        let bds = decode(&section, 1, &gds(2, 1), None)?;
        assert_eq!(bds.grid.values(), &[10.0, 10.75]);
        Ok(())
    }

    #[test]
    fn constant_field_fills_valid_points() -> anyhow::Result<()> {
        let section = [0, 0, 12, 8, 0, 0, 0x42, 0x64, 0, 0, 0, 0];
        let bitmap = Bitmap::new(vec![true, false, true]);
        let bds = decode(&section, 2, &gds(3, 1), Some(&bitmap))?;

        assert!(bds.is_constant());
        let values = bds.grid.values();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 1.0);
        assert_eq!(bds.stats.valid_count, 2);
        Ok(())
    }

    #[test]
    fn bitmap_masks_payload() -> anyhow::Result<()> {
        // 8-bit codes 5 and 9 for the two points the bitmap keeps
        let section = [0, 0, 14, 8, 0, 0, 0, 0, 0, 0, 8, 5, 9, 0];
        let bitmap = Bitmap::new(vec![false, true, false, true]);
        let bds = decode(&section, 0, &gds(4, 1), Some(&bitmap))?;
        assert!(bds.grid.is_missing(0, 0) && bds.grid.is_missing(2, 0));
        assert!(bds.grid.is_missing(7, 0));
        let values = bds.grid.values();
        assert_eq!((values[1], values[3]), (5.0, 9.0));
        Ok(())
    }

    #[test]
    fn short_payload_with_bitmap_is_truncated() {
        let section = [0, 0, 12, 0, 0, 0, 0, 0, 0, 0, 8, 5];
        let bitmap = Bitmap::new(vec![true, true]);
        assert!(matches!(
            decode(&section, 0, &gds(2, 1), Some(&bitmap)),
            Err(GribError::TruncatedInput { section: SectionKind::Data, .. })
        ));
    }

    #[test]
    fn short_payload_without_bitmap_leaves_gaps() -> anyhow::Result<()> {
        let section = [0, 0, 12, 0, 0, 0, 0, 0, 0, 0, 8, 5];
        let bds = decode(&section, 0, &gds(2, 1), None)?;
        assert_eq!(bds.grid.values()[0], 5.0);
        assert!(bds.grid.values()[1].is_nan());
        assert_eq!(bds.stats.valid_count, 1);
        Ok(())
    }

    #[test]
    fn section_shorter_than_declared() {
        let section = [0, 0, 40, 0, 0, 0, 0, 0, 0, 0, 8, 5];
        assert!(matches!(
            decode(&section, 0, &gds(2, 1), None),
            Err(GribError::TruncatedInput { .. })
        ));
    }
}
