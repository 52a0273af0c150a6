use crate::grib::{GribError, Result, SectionKind};

/// MSB-first reader of unsigned fields (1 to 32 bits wide) over a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    slice: &'a [u8],
    section: SectionKind,
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(slice: &'a [u8]) -> Self {
        Self {
            slice,
            section: SectionKind::Data,
            pos: 0,
        }
    }

    /// Section reported in [`GribError::TruncatedInput`] errors.
    pub fn for_section(self, section: SectionKind) -> Self {
        Self { section, ..self }
    }

    pub fn bits_remaining(&self) -> usize {
        self.slice.len() * 8 - self.pos
    }

    pub fn read_bits(&mut self, n: usize) -> Result<u32> {
        if !(1..=32).contains(&n) {
            return Err(GribError::ParseError(format!(
                "bit width {} out of range 1..=32",
                n
            )));
        }
        if self.bits_remaining() < n {
            return Err(GribError::TruncatedInput {
                section: self.section,
                offset: (self.pos / 8) as u64,
            });
        }

        let mut out: u64 = 0;
        let mut needed = n;
        while needed > 0 {
            let byte = self.slice[self.pos / 8];
            let bit_in_byte = self.pos % 8;
            let available = 8 - bit_in_byte;
            let take = available.min(needed);
            let chunk = (byte << bit_in_byte) >> (8 - take);
            out = (out << take) | u64::from(chunk);
            self.pos += take;
            needed -= take;
        }

        Ok(out as u32)
    }

    /// Successive `width`-bit codes until fewer than `width` bits remain.
    pub fn codes(self, width: usize) -> BitwiseIterator<'a> {
        BitwiseIterator {
            reader: self,
            width,
        }
    }
}

pub struct BitwiseIterator<'a> {
    reader: BitReader<'a>,
    width: usize,
}

impl<'a> Iterator for BitwiseIterator<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.width == 0 || self.reader.bits_remaining() < self.width {
            return None;
        }
        self.reader.read_bits(self.width).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.width == 0 {
            0
        } else {
            self.reader.bits_remaining() / self.width
        };
        (n, Some(n))
    }
}

/// MSB-first writer, the counterpart of [`BitReader`].
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    n_bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n_bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity((n_bits + 7) / 8),
            n_bits: 0,
        }
    }

    pub fn bits_written(&self) -> usize {
        self.n_bits
    }

    pub fn write_bits(&mut self, value: u32, n: usize) -> Result<()> {
        if !(1..=32).contains(&n) {
            return Err(GribError::EncodeError(format!(
                "bit width {} out of range 1..=32",
                n
            )));
        }

        let value = u64::from(value) & ((1u64 << n) - 1);
        let mut remaining = n;
        while remaining > 0 {
            let bit_in_byte = self.n_bits % 8;
            if bit_in_byte == 0 {
                self.bytes.push(0);
            }
            let free = 8 - bit_in_byte;
            let take = free.min(remaining);
            let chunk = ((value >> (remaining - take)) & ((1u64 << take) - 1)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= chunk << (free - take);
            }
            self.n_bits += take;
            remaining -= take;
        }

        Ok(())
    }

    /// Zero-fills up to the next byte boundary, returning the number of bits padded.
    pub fn pad_to_byte(&mut self) -> u8 {
        let pad = (8 - self.n_bits % 8) % 8;
        self.n_bits += pad;
        pad as u8
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.pad_to_byte();
        self.bytes
    }
}
