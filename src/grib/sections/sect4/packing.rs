use crate::grib::bits::BitWriter;
use crate::grib::grid::{Grid, GridShape};
use crate::grib::ibm;
use crate::grib::sections::sect3::Bitmap;
use crate::grib::sections::sect4::{DataHeader, MAX_BITS_PER_VALUE, SECT4_BDS_HEADER_SIZE};
use crate::grib::{GribError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitWidth {
    /// As many bits as the scaled range needs, with E = 0.
    #[default]
    Variable,
    /// Exactly this many bits; E absorbs the difference.
    Fixed(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackingParams {
    pub decimal_scale: i16,
    pub width: BitWidth,
}

/// A packed Binary Data Section, header included.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedData {
    pub header: DataHeader,
    pub bytes: Box<[u8]>,
}

/// Simple-packs `grid` in the wire order of `shape`.
///
/// Points the bitmap clears contribute nothing. Every other point must hold a
/// finite value; build a bitmap with [`Bitmap::from_grid`] when the grid has
/// NaN gaps.
pub fn encode(
    grid: &Grid<f64>,
    shape: &GridShape,
    params: PackingParams,
    bitmap: Option<&Bitmap>,
) -> Result<PackedData> {
    let wire = grid.linearize(shape)?;
    if let Some(bitmap) = bitmap {
        if bitmap.len() != wire.len() {
            return Err(GribError::EncodeError(format!(
                "Bitmap of {} points for a grid of {}",
                bitmap.len(),
                wire.len()
            )));
        }
    }

    let decimal = 10f64.powi(params.decimal_scale.into());
    let scaled = wire
        .iter()
        .enumerate()
        .filter(|(i, _)| bitmap.map_or(true, |b| b.is_set(*i)))
        .map(|(i, v)| {
            if v.is_nan() {
                Err(GribError::EncodeError(format!(
                    "No value at wire index {} and no bitmap entry clearing it",
                    i
                )))
            } else if v.is_infinite() {
                Err(GribError::InvalidFloat(*v))
            } else {
                Ok(v * decimal)
            }
        })
        .collect::<Result<Vec<f64>>>()?;

    let (min, max) = scaled
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((*v, *v)),
            Some((min, max)) => Some((min.min(*v), max.max(*v))),
        })
        .unwrap_or((0.0, 0.0));

    let (reference_value, bits_per_value, binary_scale) = if max == min {
        // Constant up to IBM precision: the nearest IBM value stands for all.
        (ibm::decode(ibm::encode(min)?), 0, 0)
    } else {
        // Codes are offsets from the reference value as stored, so it must
        // not exceed the minimum.
        let reference_value = ibm::decode(ibm::encode_floor(min)?);
        let range = max - reference_value;
        match scale_for(range, params.width)? {
            (0, _) => (reference_value, 0, 0),
            (bits, binary_scale) => (reference_value, bits, binary_scale),
        }
    };

    let mut writer = BitWriter::with_capacity(scaled.len() * usize::from(bits_per_value));
    if bits_per_value > 0 {
        let step = 2f64.powi(-i32::from(binary_scale));
        let max_code = ((1u64 << bits_per_value) - 1) as f64;
        for v in &scaled {
            let code = ((v - reference_value) * step).round().clamp(0.0, max_code);
            writer.write_bits(code as u32, bits_per_value.into())?;
        }
    }

    let mut unused_bits = writer.pad_to_byte();
    let mut payload = writer.into_bytes();
    if (SECT4_BDS_HEADER_SIZE + payload.len()) % 2 == 1 {
        payload.push(0);
        unused_bits += 8;
    }

    let length = SECT4_BDS_HEADER_SIZE + payload.len();
    let header = DataHeader {
        length: u32::try_from(length).unwrap_or(u32::MAX),
        unused_bits,
        binary_scale,
        reference_value,
        bits_per_value,
        decimal_scale: params.decimal_scale,
    };
    debug!(
        "packed {} values: R={} E={} bits={} length={}",
        scaled.len(),
        reference_value,
        binary_scale,
        bits_per_value,
        length
    );

    let mut bytes = Vec::with_capacity(length);
    bytes.extend_from_slice(&header.to_bytes()?);
    bytes.extend_from_slice(&payload);

    Ok(PackedData {
        header,
        bytes: bytes.into_boxed_slice(),
    })
}

/// Bits needed to hold the rounded `range`. An exact power of two gets one
/// more bit so its top value does not saturate.
fn bits_needed(range: f64) -> i32 {
    let rounded = range.round();
    if rounded < 1.0 {
        return 0;
    }
    let mut bits = rounded.log2().ceil() as i32;
    if rounded == 2f64.powi(bits) {
        bits += 1;
    }
    bits
}

/// Picks (bits per value, binary scale factor E).
fn scale_for(range: f64, width: BitWidth) -> Result<(u8, i16)> {
    let needed = bits_needed(range);

    let (bits, mut binary_scale) = match width {
        BitWidth::Variable if needed <= i32::from(MAX_BITS_PER_VALUE) => return Ok((needed as u8, 0)),
        BitWidth::Variable => (MAX_BITS_PER_VALUE, needed - i32::from(MAX_BITS_PER_VALUE)),
        BitWidth::Fixed(bits) if bits == 0 || bits > MAX_BITS_PER_VALUE => {
            return Err(GribError::EncodeError(format!(
                "Fixed width of {} bits, must be 1..={}",
                bits, MAX_BITS_PER_VALUE
            )))
        }
        BitWidth::Fixed(bits) => (bits, needed - i32::from(bits)),
    };

    // Rounding the scaled range can still land one past the top code.
    let max_code = ((1u64 << bits) - 1) as f64;
    if (range * 2f64.powi(-binary_scale)).round() > max_code {
        binary_scale += 1;
    }

    let binary_scale = i16::try_from(binary_scale).map_err(|_| {
        GribError::EncodeError(format!("Binary scale factor {} out of range", binary_scale))
    })?;
    Ok((bits, binary_scale))
}
