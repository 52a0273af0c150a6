use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::grib::sections::{section_length, SectionKind};
use crate::grib::utils::{u24_bytes, GribInt, ToGribUint};
use crate::grib::{GribError, Result};
use crate::read_as;

pub(crate) const SECT1_PDS_SIZE: usize = 28;

const FLAG_GDS: u8 = 0b1000_0000;
const FLAG_BMS: u8 = 0b0100_0000;

/// Section 1: Product Definition Section
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProductDefinition {
    /// Parameter table version number
    pub table_version: u8,
    /// Identification of originating/generating centre (see Code Table 0)
    pub centre_id: u8,
    /// Generating process identification number
    pub process_id: u8,
    /// Grid identification (see Code Table B)
    pub grid_id: u8,
    /// Flag specifying the presence or absence of a GDS or a BMS (see Code Table 1)
    pub flags: u8,
    /// Indicator of parameter and units (see Code Table 2)
    pub parameter_id: u8,
    /// Indicator of type of level or layer (see Code Table 3)
    pub level_type: u8,
    /// Height, pressure, etc. of the level or layer (octets 11 and 12)
    pub level: [u8; 2],
    pub year_of_century: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    /// Forecast time unit (see Code Table 4)
    pub time_unit: u8,
    /// Period of time P1
    pub p1: u8,
    /// Period of time P2
    pub p2: u8,
    /// Time range indicator (see Code Table 5)
    pub time_range: u8,
    /// Number included in calculation when octet 21 indicates an average or accumulation
    pub num_in_average: u16,
    /// Number missing from averages or accumulations
    pub num_missing: u8,
    /// Century of initial reference time (=20 until Jan. 1, 2001)
    pub century: u8,
    /// Identification of sub-centre
    pub subcentre_id: u8,
    /// Units decimal scale factor (D)
    pub decimal_scale: i16,
    /// Octets 29 onwards: reserved and local use
    pub local: Box<[u8]>,
}

impl Default for ProductDefinition {
    fn default() -> Self {
        Self {
            table_version: 3,
            centre_id: 0,
            process_id: 0,
            grid_id: 255,
            flags: FLAG_GDS,
            parameter_id: 0,
            level_type: 1,
            level: [0, 0],
            year_of_century: 100,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            time_unit: 1,
            p1: 0,
            p2: 0,
            time_range: 0,
            num_in_average: 0,
            num_missing: 0,
            century: 20,
            subcentre_id: 0,
            decimal_scale: 0,
            local: Box::new([]),
        }
    }
}

impl ProductDefinition {
    pub(crate) fn from_bytes(buf: &[u8]) -> Result<Self> {
        let length = section_length(buf, SectionKind::Product, SECT1_PDS_SIZE)?;

        Ok(Self {
            table_version: buf[3],
            centre_id: buf[4],
            process_id: buf[5],
            grid_id: buf[6],
            flags: buf[7],
            parameter_id: buf[8],
            level_type: buf[9],
            level: [buf[10], buf[11]],
            year_of_century: buf[12],
            month: buf[13],
            day: buf[14],
            hour: buf[15],
            minute: buf[16],
            time_unit: buf[17],
            p1: buf[18],
            p2: buf[19],
            time_range: buf[20],
            num_in_average: read_as!(u16, buf, 21),
            num_missing: buf[23],
            century: buf[24],
            subcentre_id: buf[25],
            decimal_scale: read_as!(u16, buf, 26).as_grib_int(),
            local: buf[SECT1_PDS_SIZE..length].into(),
        })
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let length = SECT1_PDS_SIZE + self.local.len();
        if length > 0xff_ffff {
            return Err(GribError::EncodeError(format!(
                "PDS of {} octets does not fit a 24-bit length",
                length
            )));
        }

        let mut buf = Vec::with_capacity(length);
        buf.extend_from_slice(&u24_bytes(length as u32));
        buf.extend_from_slice(&[
            self.table_version,
            self.centre_id,
            self.process_id,
            self.grid_id,
            self.flags,
            self.parameter_id,
            self.level_type,
            self.level[0],
            self.level[1],
            self.year_of_century,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.time_unit,
            self.p1,
            self.p2,
            self.time_range,
        ]);
        buf.extend_from_slice(&self.num_in_average.to_be_bytes());
        buf.extend_from_slice(&[self.num_missing, self.century, self.subcentre_id]);
        buf.extend_from_slice(&self.decimal_scale.to_grib_uint().to_be_bytes());
        buf.extend_from_slice(&self.local);

        Ok(buf)
    }

    pub fn has_gds(&self) -> bool {
        self.flags & FLAG_GDS != 0
    }

    pub fn has_bms(&self) -> bool {
        self.flags & FLAG_BMS != 0
    }

    pub(crate) fn with_sections(&self, gds: bool, bms: bool) -> Self {
        let mut flags = self.flags & !(FLAG_GDS | FLAG_BMS);
        if gds {
            flags |= FLAG_GDS;
        }
        if bms {
            flags |= FLAG_BMS;
        }
        Self {
            flags,
            ..self.clone()
        }
    }

    /// Octets 11-12 read as a single value, for level types that use both.
    pub fn level_value(&self) -> u16 {
        u16::from_be_bytes(self.level)
    }

    pub fn reference_time(&self) -> Result<DateTime<Utc>> {
        let year = (i32::from(self.century) - 1) * 100 + i32::from(self.year_of_century);

        NaiveDate::from_ymd_opt(year, self.month.into(), self.day.into())
            .and_then(|date| date.and_hms_opt(self.hour.into(), self.minute.into(), 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(|| {
                GribError::ParseError(format!(
                    "Invalid reference time: {}-{:02}-{:02} {:02}:{:02}",
                    year, self.month, self.day, self.hour, self.minute
                ))
            })
    }

    pub fn set_reference_time(&mut self, time: DateTime<Utc>) {
        let year = time.year();
        let year_of_century = match year % 100 {
            0 => 100,
            y => y,
        };
        self.century = ((year - year_of_century) / 100 + 1) as u8;
        self.year_of_century = year_of_century as u8;
        self.month = time.month() as u8;
        self.day = time.day() as u8;
        self.hour = time.hour() as u8;
        self.minute = time.minute() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        vec![
            0, 0, 30, // length
            2, 7, 81, 255, // table, centre, process, grid
            0b1100_0000, // GDS and BMS
            11, 105, 0, 2, // temperature at 2 m
            24, 3, 15, 12, 30, // 2024-03-15 12:30
            1, 6, 0, 0, // hours, P1=6
            0, 0, 0, // averages
            21, 4, // century, sub-centre
            0x80, 0x02, // D = -2
            0xaa, 0xbb, // local use
        ]
    }

    #[test]
    fn parse_pds() -> anyhow::Result<()> {
        let pds = ProductDefinition::from_bytes(&sample())?;

        assert_eq!(pds.centre_id, 7);
        assert_eq!(pds.parameter_id, 11);
        assert_eq!(pds.level_type, 105);
        assert_eq!(pds.level_value(), 2);
        assert!(pds.has_gds());
        assert!(pds.has_bms());
        assert_eq!(pds.p1, 6);
        assert_eq!(pds.subcentre_id, 4);
        assert_eq!(pds.decimal_scale, -2);
        assert_eq!(&pds.local[..], &[0xaa, 0xbb]);
        assert_eq!(
            pds.reference_time()?,
            Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap()
        );

        Ok(())
    }

    #[test]
    fn pds_round_trip() -> anyhow::Result<()> {
        let bytes = sample();
        let pds = ProductDefinition::from_bytes(&bytes)?;
        assert_eq!(pds.to_bytes()?, bytes);
        Ok(())
    }

    #[test]
    fn section_flags() {
        let pds = ProductDefinition::default().with_sections(false, true);
        assert!(!pds.has_gds());
        assert!(pds.has_bms());
        let pds = pds.with_sections(true, false);
        assert!(pds.has_gds());
        assert!(!pds.has_bms());
    }

    #[test]
    fn year_2000_is_end_of_century() -> anyhow::Result<()> {
        let mut pds = ProductDefinition::default();
        pds.set_reference_time(Utc.with_ymd_and_hms(2000, 6, 1, 0, 0, 0).unwrap());
        assert_eq!((pds.century, pds.year_of_century), (20, 100));
        assert_eq!(pds.reference_time()?.year(), 2000);

        pds.set_reference_time(Utc.with_ymd_and_hms(2001, 6, 1, 0, 0, 0).unwrap());
        assert_eq!((pds.century, pds.year_of_century), (21, 1));
        Ok(())
    }

    #[test]
    fn short_pds_is_rejected() {
        let mut bytes = sample();
        bytes.truncate(20);
        assert!(matches!(
            ProductDefinition::from_bytes(&bytes),
            Err(GribError::TruncatedInput { .. })
        ));
    }
}
