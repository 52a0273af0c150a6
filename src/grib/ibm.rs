//! IBM System/360 single precision floats: a sign bit, a 7-bit base-16
//! exponent biased by 64 and a 24-bit fraction. GRIB edition 1 stores every
//! reference value (and a few grid parameters) in this format.

use crate::grib::{GribError, Result};

const MANTISSA_SCALE: f64 = 16_777_216.0; // 2^24
const EXPONENT_BIAS: i32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rounding {
    Nearest,
    /// Toward negative infinity.
    Down,
}

pub fn decode(bytes: [u8; 4]) -> f64 {
    let negative = bytes[0] & 0x80 != 0;
    let exponent = i32::from(bytes[0] & 0x7f) - EXPONENT_BIAS;
    let mantissa = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]);

    let value = f64::from(mantissa) * 2f64.powi(4 * exponent - 24);
    if negative {
        -value
    } else {
        value
    }
}

/// Nearest IBM float to `value`. Exact for every value the format can hold.
pub fn encode(value: f64) -> Result<[u8; 4]> {
    encode_with(value, Rounding::Nearest)
}

/// Largest IBM float not greater than `value`.
pub(crate) fn encode_floor(value: f64) -> Result<[u8; 4]> {
    encode_with(value, Rounding::Down)
}

fn encode_with(value: f64, rounding: Rounding) -> Result<[u8; 4]> {
    if !value.is_finite() {
        return Err(GribError::InvalidFloat(value));
    }
    if value == 0.0 {
        return Ok([0; 4]);
    }

    let negative = value < 0.0;
    let magnitude = value.abs();
    // Rounding down a negative value grows its magnitude.
    let round_up = match rounding {
        Rounding::Nearest => None,
        Rounding::Down => Some(negative),
    };
    let quantize = |m: f64| match round_up {
        None => m.round(),
        Some(true) => m.ceil(),
        Some(false) => m.floor(),
    };

    // magnitude = fraction * 16^exponent with fraction in [1/16, 1)
    let mut exponent = (magnitude.log2() / 4.0).floor() as i32 + 1;
    while magnitude * 2f64.powi(-4 * exponent) >= 1.0 {
        exponent += 1;
    }
    while magnitude * 2f64.powi(-4 * exponent) < 1.0 / 16.0 {
        exponent -= 1;
    }

    let mut biased = exponent + EXPONENT_BIAS;
    let mut mantissa = if biased < 0 {
        biased = 0;
        quantize(magnitude * 2f64.powi(24 + 4 * EXPONENT_BIAS))
    } else {
        quantize(magnitude * 2f64.powi(-4 * exponent) * MANTISSA_SCALE)
    };

    if mantissa >= MANTISSA_SCALE {
        biased += 1;
        mantissa = quantize(mantissa / 16.0);
    }
    if biased > 0x7f {
        return Err(GribError::InvalidFloat(value));
    }
    if mantissa == 0.0 {
        return Ok([0; 4]);
    }

    let m = (mantissa as u32).to_be_bytes();
    let sign = if negative { 0x80 } else { 0 };
    Ok([sign | biased as u8, m[1], m[2], m[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known_patterns() {
        assert_eq!(decode([0x41, 0x10, 0x00, 0x00]), 1.0);
        assert_eq!(decode([0x42, 0x64, 0x00, 0x00]), 100.0);
        assert_eq!(decode([0xc2, 0x76, 0xa0, 0x00]), -118.625);
        assert_eq!(decode([0x00, 0x00, 0x00, 0x00]), 0.0);
    }

    #[test]
    fn encode_known_values() -> anyhow::Result<()> {
        assert_eq!(encode(1.0)?, [0x41, 0x10, 0x00, 0x00]);
        assert_eq!(encode(100.0)?, [0x42, 0x64, 0x00, 0x00]);
        assert_eq!(encode(-118.625)?, [0xc2, 0x76, 0xa0, 0x00]);
        assert_eq!(encode(0.0)?, [0; 4]);
        assert_eq!(encode(-0.0)?, [0; 4]);
        Ok(())
    }

    #[test]
    fn normalized_patterns_round_trip() -> anyhow::Result<()> {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x4942_4d00);
        for _ in 0..20_000 {
            let sign: u8 = if rng.gen_bool(0.5) { 0x80 } else { 0 };
            let exponent: u8 = rng.gen_range(0..=0x7f);
            // leading hex digit must be nonzero
            let mantissa: u32 = rng.gen_range(0x10_0000..=0xff_ffff);
            let m = mantissa.to_be_bytes();
            let bytes = [sign | exponent, m[1], m[2], m[3]];

            let value = decode(bytes);
            assert_eq!(encode(value)?, bytes, "{:02x?} decoded to {}", bytes, value);
            assert_eq!(encode_floor(value)?, bytes);
        }
        Ok(())
    }

    #[test]
    fn non_finite_is_rejected() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(encode(v), Err(GribError::InvalidFloat(_))));
        }
    }

    #[test]
    fn overflow_is_rejected() {
        assert!(matches!(encode(1e80), Err(GribError::InvalidFloat(_))));
    }

    #[test]
    fn tiny_values_denormalize() -> anyhow::Result<()> {
        let smallest = decode([0x00, 0x00, 0x00, 0x01]);
        assert_eq!(encode(smallest)?, [0x00, 0x00, 0x00, 0x01]);
        assert_eq!(encode(smallest / 4.0)?, [0; 4]);
        Ok(())
    }

    #[test]
    fn floor_never_exceeds_input() -> anyhow::Result<()> {
        for v in [0.1, 273.15, -273.15, 1e-7, -1e-7, 12345.678, 1.0 / 3.0] {
            let down = decode(encode_floor(v)?);
            assert!(down <= v, "{} rounded to {}", v, down);
            let nearest = decode(encode(v)?);
            assert!((nearest - v).abs() <= (v - down).abs() + f64::EPSILON);
        }
        Ok(())
    }

    #[test]
    fn mantissa_carry_bumps_exponent() -> anyhow::Result<()> {
        // Rounds up to exactly 16^1.
        let just_below = 16.0 - 1e-9;
        assert_eq!(encode(just_below)?, [0x42, 0x10, 0x00, 0x00]);
        Ok(())
    }
}
