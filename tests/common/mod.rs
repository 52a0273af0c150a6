#![allow(dead_code)]

use grib1::grib::{self, BitWidth, Grid, GridDefinition, LatLon, ProductDefinition, Record, ScanMode};

pub fn lat_lon(nx: u32, ny: u32, scan: ScanMode) -> GridDefinition {
    GridDefinition::lat_lon(
        nx,
        ny,
        LatLon {
            la1: 60000,
            lo1: -10000,
            resolution_flags: 0x80,
            la2: 60000 - 500 * (ny as i32 - 1),
            lo2: -10000 + 500 * (nx as i32 - 1),
            di: 500,
            dj: 500,
        },
        scan,
    )
}

pub fn product(decimal_scale: i16) -> ProductDefinition {
    ProductDefinition {
        centre_id: 7,
        table_version: 2,
        parameter_id: 11,
        level_type: 100,
        level: [0x01, 0xf4],
        decimal_scale,
        ..Default::default()
    }
}

pub fn record(nx: usize, ny: usize, values: Vec<f64>) -> Record {
    let grid = Grid::from_vec(nx, ny, values).unwrap();
    Record::from_grid(
        product(1),
        lat_lon(nx as u32, ny as u32, ScanMode::default()),
        &grid,
        BitWidth::Variable,
    )
    .unwrap()
}

pub fn encoded(nx: usize, ny: usize, values: Vec<f64>) -> Vec<u8> {
    grib::encode_record(&record(nx, ny, values)).unwrap()
}

/// Offset of the BDS in a record without a BMS.
pub fn bds_offset(bytes: &[u8]) -> usize {
    let section_length = |at: usize| {
        (usize::from(bytes[at]) << 16) | (usize::from(bytes[at + 1]) << 8) | usize::from(bytes[at + 2])
    };
    let pds = 8;
    let gds = pds + section_length(pds);
    gds + section_length(gds)
}
