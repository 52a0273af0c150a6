use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::grib::{self, Record};
use crate::Result;

/// One record in the grib2json layout: a flat header and the values in wire
/// order. Missing points serialise as `null`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub header: Header,
    pub data: Box<[f64]>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub centre: u8,
    pub subcentre: u8,
    pub table_version: u8,
    pub parameter_number: u8,
    pub surface1_type: u8,
    pub surface1_value: f64,
    pub ref_time: Option<DateTime<Utc>>,
    pub forecast_time: u8,
    pub grid_definition_template: u8,
    pub nx: usize,
    pub ny: usize,
    pub la1: Option<f64>,
    pub lo1: Option<f64>,
    pub dx: Option<f64>,
    pub dy: Option<f64>,
    pub scan_mode: u8,
    pub decimal_scale: i16,
    pub binary_scale: i16,
    pub reference_value: f64,
    pub bits_per_value: u8,
    pub min: f64,
    pub max: f64,
}

impl TryFrom<&Record> for Message {
    type Error = grib::GribError;

    fn try_from(record: &Record) -> grib::Result<Self> {
        let pds = &record.product_definition;
        let gds = &record.grid_definition;
        let data = &record.data;
        let first_point = gds.first_point();

        let header = Header {
            centre: pds.centre_id,
            subcentre: pds.subcentre_id,
            table_version: pds.table_version,
            parameter_number: pds.parameter_id,
            surface1_type: pds.level_type,
            surface1_value: f64::from(pds.level_value()),
            ref_time: pds.reference_time().ok(),
            forecast_time: pds.p1,
            grid_definition_template: gds.representation,
            nx: gds.nx as usize,
            ny: gds.ny as usize,
            la1: first_point.map(|(la, _)| la),
            lo1: first_point.map(|(_, lo)| lo),
            dx: gds.dx(),
            dy: gds.dy(),
            scan_mode: gds.scan.to_octet(),
            decimal_scale: data.header.decimal_scale,
            binary_scale: data.header.binary_scale,
            reference_value: data.header.reference_value,
            bits_per_value: data.header.bits_per_value,
            min: data.stats.min,
            max: data.stats.max,
        };

        Ok(Self {
            header,
            data: data.grid.linearize(&record.shape())?.into_boxed_slice(),
        })
    }
}

pub fn to_writer<W: Write>(writer: W, records: &[Record]) -> Result<()> {
    let messages = records
        .iter()
        .map(Message::try_from)
        .collect::<grib::Result<Vec<_>>>()?;
    serde_json::to_writer_pretty(writer, &messages)?;
    Ok(())
}
