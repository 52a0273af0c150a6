use serde::Serialize;

use crate::grib::grid::{GridShape, ScanMode};
use crate::grib::ibm;
use crate::grib::sections::{section_length, SectionKind};
use crate::grib::utils::{i24_bytes, read_i24, u24_bytes};
use crate::grib::{GribError, Result};
use crate::read_as;

pub(crate) const SECT2_GDS_SIZE: usize = 32;
const ROTATED_GDS_SIZE: usize = 42;
const SCAN_MODE_OCTET: usize = 27;
const MISSING_U16: u16 = 0xffff;

/// Section 2: Grid Description Section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridDefinition {
    /// NV, the number of vertical coordinate parameters
    pub nv: u8,
    /// PV, location of the vertical coordinates or PL list (255 if none)
    pub pv_location: u8,
    /// Data representation type (see Code Table 6)
    pub representation: u8,
    /// Ni, number of points along a parallel
    pub nx: u32,
    /// Nj, number of points along a meridian
    pub ny: u32,
    pub scan: ScanMode,
    pub projection: Projection,
    /// Octets following the template (vertical coordinates and the like)
    pub extra: Box<[u8]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Projection {
    /// Code 0: latitude/longitude grid (equidistant cylindrical or Plate Carree)
    LatLon(LatLon),
    /// Code 4: Gaussian latitude/longitude grid, `dj` holds N
    Gaussian(LatLon),
    /// Code 10: rotated latitude/longitude grid
    RotatedLatLon {
        grid: LatLon,
        /// Latitude of the southern pole in millidegrees
        south_pole_lat: i32,
        /// Longitude of the southern pole in millidegrees
        south_pole_lon: i32,
        /// Angle of rotation
        rotation: f64,
    },
    /// Any other representation: octets 11 to the end of the template, raw
    Other(Box<[u8]>),
}

/// Latitudes and longitudes in millidegrees, increments in millidegrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LatLon {
    pub la1: i32,
    pub lo1: i32,
    /// Resolution and component flags (see Code Table 7)
    pub resolution_flags: u8,
    pub la2: i32,
    pub lo2: i32,
    pub di: u16,
    pub dj: u16,
}

impl LatLon {
    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            la1: read_i24(buf, 10),
            lo1: read_i24(buf, 13),
            resolution_flags: buf[16],
            la2: read_i24(buf, 17),
            lo2: read_i24(buf, 20),
            di: read_as!(u16, buf, 23),
            dj: read_as!(u16, buf, 25),
        }
    }

    fn write(&self, buf: &mut [u8]) {
        buf[10..13].copy_from_slice(&i24_bytes(self.la1));
        buf[13..16].copy_from_slice(&i24_bytes(self.lo1));
        buf[16] = self.resolution_flags;
        buf[17..20].copy_from_slice(&i24_bytes(self.la2));
        buf[20..23].copy_from_slice(&i24_bytes(self.lo2));
        buf[23..25].copy_from_slice(&self.di.to_be_bytes());
        buf[25..27].copy_from_slice(&self.dj.to_be_bytes());
    }
}

impl GridDefinition {
    pub fn lat_lon(nx: u32, ny: u32, grid: LatLon, scan: ScanMode) -> Self {
        Self {
            nv: 0,
            pv_location: 255,
            representation: 0,
            nx,
            ny,
            scan,
            projection: Projection::LatLon(grid),
            extra: Box::new([]),
        }
    }

    pub(crate) fn from_bytes(buf: &[u8]) -> Result<Self> {
        let length = section_length(buf, SectionKind::Grid, SECT2_GDS_SIZE)?;

        let representation = buf[5];
        let nx = read_as!(u16, buf, 6);
        let ny = read_as!(u16, buf, 8);
        if nx == MISSING_U16 || ny == MISSING_U16 {
            return Err(GribError::DecodeError {
                section: SectionKind::Grid,
                offset: 0,
                reason: String::from("Quasi-regular grids are not supported"),
            });
        }
        if nx == 0 || ny == 0 {
            return Err(GribError::DecodeError {
                section: SectionKind::Grid,
                offset: 0,
                reason: format!("Empty {}x{} grid", nx, ny),
            });
        }

        let (projection, template_size) = match representation {
            0 => (Projection::LatLon(LatLon::from_bytes(buf)), SECT2_GDS_SIZE),
            4 => (Projection::Gaussian(LatLon::from_bytes(buf)), SECT2_GDS_SIZE),
            10 => {
                if length < ROTATED_GDS_SIZE {
                    return Err(GribError::ParseError(format!(
                        "Rotated grid definition of {} octets, needs {}",
                        length, ROTATED_GDS_SIZE
                    )));
                }
                (
                    Projection::RotatedLatLon {
                        grid: LatLon::from_bytes(buf),
                        south_pole_lat: read_i24(buf, 32),
                        south_pole_lon: read_i24(buf, 35),
                        rotation: ibm::decode([buf[38], buf[39], buf[40], buf[41]]),
                    },
                    ROTATED_GDS_SIZE,
                )
            }
            n => {
                debug!("Keeping raw template for grid representation {}", n);
                (Projection::Other(buf[10..length].into()), length)
            }
        };

        Ok(Self {
            nv: buf[3],
            pv_location: buf[4],
            representation,
            nx: nx.into(),
            ny: ny.into(),
            scan: ScanMode::from_octet(buf[SCAN_MODE_OCTET]),
            projection,
            extra: buf[template_size..length].into(),
        })
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let nx = u16::try_from(self.nx).ok().filter(|n| *n != MISSING_U16);
        let ny = u16::try_from(self.ny).ok().filter(|n| *n != MISSING_U16);
        let (nx, ny) = match (nx, ny) {
            (Some(nx), Some(ny)) => (nx, ny),
            _ => {
                return Err(GribError::EncodeError(format!(
                    "{}x{} grid does not fit the GDS",
                    self.nx, self.ny
                )))
            }
        };

        let template_size = match &self.projection {
            Projection::LatLon(_) | Projection::Gaussian(_) => SECT2_GDS_SIZE,
            Projection::RotatedLatLon { .. } => ROTATED_GDS_SIZE,
            Projection::Other(raw) => (10 + raw.len()).max(SECT2_GDS_SIZE),
        };
        let length = template_size + self.extra.len();

        let mut buf = vec![0; length];
        buf[0..3].copy_from_slice(&u24_bytes(length as u32));
        buf[3] = self.nv;
        buf[4] = self.pv_location;
        buf[5] = self.representation;
        buf[6..8].copy_from_slice(&nx.to_be_bytes());
        buf[8..10].copy_from_slice(&ny.to_be_bytes());

        match &self.projection {
            Projection::LatLon(grid) | Projection::Gaussian(grid) => grid.write(&mut buf),
            Projection::RotatedLatLon {
                grid,
                south_pole_lat,
                south_pole_lon,
                rotation,
            } => {
                grid.write(&mut buf);
                buf[32..35].copy_from_slice(&i24_bytes(*south_pole_lat));
                buf[35..38].copy_from_slice(&i24_bytes(*south_pole_lon));
                buf[38..42].copy_from_slice(&ibm::encode(*rotation)?);
            }
            Projection::Other(raw) => buf[10..10 + raw.len()].copy_from_slice(raw),
        }
        buf[SCAN_MODE_OCTET] = self.scan.to_octet();
        buf[template_size..].copy_from_slice(&self.extra);

        Ok(buf)
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.nx as usize, self.ny as usize, self.scan)
    }

    pub fn num_points(&self) -> usize {
        self.shape().len()
    }

    fn lat_lon_grid(&self) -> Option<&LatLon> {
        match &self.projection {
            Projection::LatLon(grid)
            | Projection::Gaussian(grid)
            | Projection::RotatedLatLon { grid, .. } => Some(grid),
            Projection::Other(_) => None,
        }
    }

    /// First grid point as (latitude, longitude) in degrees.
    pub fn first_point(&self) -> Option<(f64, f64)> {
        self.lat_lon_grid()
            .map(|g| (f64::from(g.la1) / 1000.0, f64::from(g.lo1) / 1000.0))
    }

    /// Longitude increment in degrees, negative when scanning westward.
    pub fn dx(&self) -> Option<f64> {
        let di = self.lat_lon_grid().map(|g| g.di).filter(|d| *d != MISSING_U16)?;
        let dx = f64::from(di) / 1000.0;
        Some(if self.scan.plus_i { dx } else { -dx })
    }

    /// Latitude increment in degrees, negative when scanning southward.
    pub fn dy(&self) -> Option<f64> {
        let dj = match &self.projection {
            Projection::LatLon(grid) | Projection::RotatedLatLon { grid, .. } => grid.dj,
            Projection::Gaussian(_) | Projection::Other(_) => return None,
        };
        if dj == MISSING_U16 {
            return None;
        }
        let dy = f64::from(dj) / 1000.0;
        Some(if self.scan.plus_j { dy } else { -dy })
    }
}
