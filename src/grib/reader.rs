use std::io::{self, ErrorKind, Read};

use serde::Serialize;

use crate::grib::sections::sect1::ProductDefinition;
use crate::grib::sections::sect2::GridDefinition;
use crate::grib::sections::sect3::Bitmap;
use crate::grib::sections::{
    sect4, Indicator, SectionKind, SECT0_IS_MAGIC, SECT0_IS_SIZE, SECT5_ES_MAGIC, SECT5_ES_SIZE,
    SECT_LENGTH_SIZE,
};
use crate::grib::utils::read_u24;
use crate::grib::{GribError, Record, Result};

/// Junk octets tolerated before a record header.
pub const DEFAULT_SEARCH_WINDOW: usize = 64 * 1024;

/// Location of a record in a stream, as found by [`GribReader::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordIndex {
    pub offset: u64,
    pub length: u32,
}

enum State {
    SeekHeader,
    Indicator {
        start: u64,
    },
    Product {
        start: u64,
        indicator: Indicator,
    },
    Grid {
        start: u64,
        indicator: Indicator,
        pds: ProductDefinition,
    },
    Skip {
        start: u64,
        remaining: u64,
    },
    Bitmap {
        start: u64,
        indicator: Indicator,
        pds: ProductDefinition,
        gds: GridDefinition,
    },
    Data {
        start: u64,
        indicator: Indicator,
        pds: ProductDefinition,
        gds: GridDefinition,
        bitmap: Option<Bitmap>,
    },
    Footer {
        start: u64,
        record: Record,
    },
    Complete(Record),
}

/// Pulls GRIB edition 1 records out of a byte stream one at a time.
///
/// Octets between records are skipped, as long as no more than the search
/// window of them precede a header. Records without a GDS are skipped and
/// counted.
pub struct GribReader<R> {
    reader: R,
    offset: u64,
    search_window: usize,
    records_seen: usize,
    skipped: usize,
    failed: bool,
}

impl<R: Read> GribReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_search_window(reader, DEFAULT_SEARCH_WINDOW)
    }

    pub fn with_search_window(reader: R, search_window: usize) -> Self {
        Self {
            reader,
            offset: 0,
            search_window,
            records_seen: 0,
            skipped: 0,
            failed: false,
        }
    }

    /// Octets consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Record headers found so far, decoded or not.
    pub fn records_seen(&self) -> usize {
        self.records_seen
    }

    /// Records skipped because they carry no GDS.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Decodes the next record, or returns `None` at the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let mut state = State::SeekHeader;
        loop {
            state = match state {
                State::SeekHeader => match self.seek_header()? {
                    Some(start) => State::Indicator { start },
                    None => return Ok(None),
                },
                State::Indicator { start } => {
                    let indicator = self.read_indicator()?;
                    debug!(
                        "Found record at offset {} ({} octets)",
                        start, indicator.total_length
                    );
                    State::Product { start, indicator }
                }
                State::Product { start, indicator } => {
                    let (at, buf) = self.read_section(SectionKind::Product)?;
                    let pds = ProductDefinition::from_bytes(&buf).map_err(|e| e.at(at))?;

                    if pds.has_gds() {
                        State::Grid {
                            start,
                            indicator,
                            pds,
                        }
                    } else {
                        warn!("{}, skipping it", GribError::MissingGds { offset: start });
                        let consumed = self.offset - start;
                        State::Skip {
                            start,
                            remaining: u64::from(indicator.total_length).saturating_sub(consumed),
                        }
                    }
                }
                State::Skip { start, remaining } => {
                    self.skip(remaining)?;
                    self.skipped += 1;
                    trace!("Skipped record at offset {}", start);
                    State::SeekHeader
                }
                State::Grid {
                    start,
                    indicator,
                    pds,
                } => {
                    let (at, buf) = self.read_section(SectionKind::Grid)?;
                    let gds = GridDefinition::from_bytes(&buf).map_err(|e| e.at(at))?;

                    if pds.has_bms() {
                        State::Bitmap {
                            start,
                            indicator,
                            pds,
                            gds,
                        }
                    } else {
                        State::Data {
                            start,
                            indicator,
                            pds,
                            gds,
                            bitmap: None,
                        }
                    }
                }
                State::Bitmap {
                    start,
                    indicator,
                    pds,
                    gds,
                } => {
                    let (at, buf) = self.read_section(SectionKind::Bitmap)?;
                    let bitmap = Bitmap::from_bytes(&buf, gds.num_points()).map_err(|e| e.at(at))?;
                    State::Data {
                        start,
                        indicator,
                        pds,
                        gds,
                        bitmap: Some(bitmap),
                    }
                }
                State::Data {
                    start,
                    indicator,
                    pds,
                    gds,
                    bitmap,
                } => {
                    let (at, buf) = self.read_section(SectionKind::Data)?;
                    let data = sect4::decode(&buf, pds.decimal_scale, &gds, bitmap.as_ref())
                        .map_err(|e| e.at(at))?;
                    State::Footer {
                        start,
                        record: Record {
                            indicator,
                            product_definition: pds,
                            grid_definition: gds,
                            bitmap,
                            data,
                        },
                    }
                }
                State::Footer { start, record } => {
                    let at = self.offset;
                    let mut found = [0; SECT5_ES_SIZE];
                    self.read_exact_in(SectionKind::End, at, &mut found)?;
                    if &found != SECT5_ES_MAGIC {
                        return Err(GribError::FooterMismatch { offset: at, found });
                    }

                    let consumed = self.offset - start;
                    if consumed != u64::from(record.indicator.total_length) {
                        warn!(
                            "Record at offset {} declares {} octets but holds {}",
                            start, record.indicator.total_length, consumed
                        );
                    }
                    State::Complete(record)
                }
                State::Complete(record) => return Ok(Some(record)),
            }
        }
    }

    /// Walks the stream reading only record indicators.
    pub fn index(&mut self) -> Result<Vec<RecordIndex>> {
        let mut index = Vec::new();
        while let Some(offset) = self.seek_header()? {
            let indicator = self.read_indicator()?;
            let length = indicator.total_length;
            self.skip(u64::from(length).saturating_sub(SECT0_IS_SIZE as u64))?;
            index.push(RecordIndex { offset, length });
        }
        debug!("Indexed {} records", index.len());
        Ok(index)
    }

    /// Advances past the next "GRIB" marker and returns where it started.
    fn seek_header(&mut self) -> Result<Option<u64>> {
        let mut window = [0u8; 4];
        let mut scanned = 0usize;
        let limit = self.search_window.saturating_add(SECT0_IS_MAGIC.len());

        while scanned < limit {
            let mut byte = [0u8; 1];
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            self.offset += 1;
            scanned += 1;

            window.rotate_left(1);
            window[3] = byte[0];
            if scanned >= SECT0_IS_MAGIC.len() && &window == SECT0_IS_MAGIC {
                let start = self.offset - SECT0_IS_MAGIC.len() as u64;
                if scanned > SECT0_IS_MAGIC.len() {
                    debug!("Skipped {} octets before offset {}", scanned - 4, start);
                }
                return Ok(Some(start));
            }
        }

        debug!(
            "No record header within {} octets of offset {}",
            self.search_window,
            self.offset - scanned as u64
        );
        Ok(None)
    }

    /// Reads the rest of an indicator whose magic was just consumed.
    fn read_indicator(&mut self) -> Result<Indicator> {
        let at = self.offset - SECT0_IS_MAGIC.len() as u64;
        let mut buf = [0; SECT0_IS_SIZE];
        buf[..4].copy_from_slice(SECT0_IS_MAGIC);
        self.read_exact_in(SectionKind::Indicator, at, &mut buf[4..])?;
        let indicator = Indicator::from_bytes(&buf).map_err(|e| e.at(at))?;
        self.records_seen += 1;
        Ok(indicator)
    }

    /// Reads a whole length-prefixed section, returning its offset and octets.
    fn read_section(&mut self, section: SectionKind) -> Result<(u64, Vec<u8>)> {
        let at = self.offset;

        let mut length = [0; SECT_LENGTH_SIZE];
        self.read_exact_in(section, at, &mut length)?;
        let length = read_u24(&length, 0) as usize;
        if length < SECT_LENGTH_SIZE {
            return Err(GribError::ParseError(format!(
                "{} at offset {} declares {} octets",
                section, at, length
            )));
        }

        let mut buf = vec![0; length];
        buf[..SECT_LENGTH_SIZE].copy_from_slice(&(length as u32).to_be_bytes()[1..]);
        self.read_exact_in(section, at, &mut buf[SECT_LENGTH_SIZE..])?;

        trace!("{} at offset {}: {} octets", section, at, length);
        Ok((at, buf))
    }

    /// Fills `buf`, reporting a short read as a truncated `section` starting at `at`.
    fn read_exact_in(&mut self, section: SectionKind, at: u64, buf: &mut [u8]) -> Result<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(GribError::TruncatedInput { section, offset: at })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.reader).take(n), &mut io::sink())?;
        self.offset += skipped;
        if skipped < n {
            return Err(GribError::TruncatedInput {
                section: SectionKind::Indicator,
                offset: self.offset,
            });
        }
        Ok(())
    }
}

impl<R: Read> Iterator for GribReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grib::grid::{Grid, ScanMode};
    use crate::grib::sections::sect2::LatLon;
    use crate::grib::{BitWidth, Record};

    fn sample() -> Vec<u8> {
        let gds = GridDefinition::lat_lon(
            3,
            2,
            LatLon {
                la1: 1000,
                lo1: 0,
                resolution_flags: 0x80,
                la2: 0,
                lo2: 2000,
                di: 1000,
                dj: 1000,
            },
            ScanMode::default(),
        );
        let grid = Grid::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        Record::from_grid(ProductDefinition::default(), gds, &grid, BitWidth::Variable)
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn reads_records_between_junk() -> anyhow::Result<()> {
        let record = sample();
        let mut stream = vec![0x55; 10];
        stream.extend_from_slice(&record);
        stream.extend_from_slice(b"GRI");
        stream.extend_from_slice(&record);

        let mut reader = GribReader::new(stream.as_slice());
        let first = reader.next_record()?.expect("first record");
        let second = reader.next_record()?.expect("second record");
        assert!(reader.next_record()?.is_none());
        assert_eq!(first, second);
        assert_eq!(reader.records_seen(), 2);
        assert_eq!(reader.offset(), stream.len() as u64);
        Ok(())
    }

    #[test]
    fn search_window_bounds_junk() -> anyhow::Result<()> {
        let mut stream = vec![0; 32];
        stream.extend_from_slice(&sample());

        assert!(GribReader::with_search_window(stream.as_slice(), 16)
            .next_record()?
            .is_none());
        assert!(GribReader::with_search_window(stream.as_slice(), 32)
            .next_record()?
            .is_some());
        Ok(())
    }

    #[test]
    fn index_locates_records() -> anyhow::Result<()> {
        let record = sample();
        let mut stream = record.clone();
        stream.extend_from_slice(&[0; 5]);
        stream.extend_from_slice(&record);

        let index = GribReader::new(stream.as_slice()).index()?;
        let length = record.len() as u32;
        assert_eq!(
            index,
            vec![
                RecordIndex { offset: 0, length },
                RecordIndex {
                    offset: u64::from(length) + 5,
                    length
                }
            ]
        );

        let second = &stream[index[1].offset as usize..][..length as usize];
        assert_eq!(crate::grib::decode_record(second)?.grid_definition.nx, 3);
        Ok(())
    }

    #[test]
    fn truncated_record() {
        let record = sample();
        let cut = &record[..record.len() - 6];
        assert!(matches!(
            GribReader::new(cut).next_record(),
            Err(GribError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn iterator_stops_after_error() {
        let mut record = sample();
        let n = record.len();
        record[n - 1] = b'8';

        let mut reader = GribReader::new(record.as_slice());
        assert!(matches!(
            reader.next(),
            Some(Err(GribError::FooterMismatch { .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn other_editions_are_rejected() {
        let mut record = sample();
        record[7] = 2;
        assert!(matches!(
            GribReader::new(record.as_slice()).next_record(),
            Err(GribError::EditionMismatch { edition: 2, offset: 0 })
        ));
    }

    #[test]
    fn unsupported_packing_reports_stream_offset() {
        let mut record = sample();
        // IS and PDS are 8 + 28 octets, the lat/lon GDS 32
        let bds = 8 + 28 + 32;
        record[bds + 3] |= 0x40;
        let mut stream = vec![b'x'; 100];
        stream.extend_from_slice(&record);

        let err = GribReader::new(stream.as_slice()).next_record().unwrap_err();
        assert!(matches!(
            err,
            GribError::UnsupportedPacking { flags: 0x4, offset: 168 }
        ));
        assert_eq!(err.location(), Some((SectionKind::Data, 168)));
        assert!(err.to_string().contains("BDS at offset 168"));
    }

    #[test]
    fn grid_errors_report_stream_offset() {
        let mut record = sample();
        let gds = 8 + 28;
        record[gds + 6] = 0xff;
        record[gds + 7] = 0xff;
        let mut stream = vec![b'x'; 100];
        stream.extend_from_slice(&record);

        assert!(matches!(
            GribReader::new(stream.as_slice()).next_record(),
            Err(GribError::DecodeError {
                section: SectionKind::Grid,
                offset: 136,
                ..
            })
        ));
    }

    #[test]
    fn edition_error_reports_record_start() {
        let mut record = sample();
        record[7] = 2;
        let mut stream = vec![b'x'; 10];
        stream.extend_from_slice(&record);

        let err = GribReader::new(stream.as_slice()).next_record().unwrap_err();
        assert_eq!(err.location(), Some((SectionKind::Indicator, 10)));
    }
}
