use serde::Serialize;

use crate::grib::{GribError, Result};

/// Scanning mode flags (GDS octet 28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScanMode {
    /// Points scan in the +i direction (west to east).
    pub plus_i: bool,
    /// Points scan in the +j direction (south to north).
    pub plus_j: bool,
    /// Consecutive points are adjacent along i (a row at a time).
    pub adjacent_i: bool,
}

impl ScanMode {
    const MINUS_I: u8 = 0b1000_0000;
    const PLUS_J: u8 = 0b0100_0000;
    const ADJACENT_J: u8 = 0b0010_0000;

    pub fn from_octet(octet: u8) -> Self {
        Self {
            plus_i: octet & Self::MINUS_I == 0,
            plus_j: octet & Self::PLUS_J != 0,
            adjacent_i: octet & Self::ADJACENT_J == 0,
        }
    }

    pub fn to_octet(&self) -> u8 {
        let mut octet = 0;
        if !self.plus_i {
            octet |= Self::MINUS_I;
        }
        if self.plus_j {
            octet |= Self::PLUS_J;
        }
        if !self.adjacent_i {
            octet |= Self::ADJACENT_J;
        }
        octet
    }
}

impl Default for ScanMode {
    /// The usual GRIB1 layout: rows west to east, starting in the north.
    fn default() -> Self {
        Self::from_octet(0)
    }
}

/// Grid dimensions plus scan order; maps wire (storage) order to `(col, row)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub nx: usize,
    pub ny: usize,
    pub scan: ScanMode,
}

impl GridShape {
    pub fn new(nx: usize, ny: usize, scan: ScanMode) -> Self {
        Self { nx, ny, scan }
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_to_coord(&self, i: usize) -> Result<(usize, usize)> {
        if i >= self.len() {
            return Err(GribError::IndexOutOfRange {
                index: i,
                len: self.len(),
            });
        }

        let ScanMode {
            plus_i,
            plus_j,
            adjacent_i,
        } = self.scan;
        let (along_i, along_j) = if adjacent_i {
            (i % self.nx, i / self.nx)
        } else {
            (i / self.ny, i % self.ny)
        };

        let col = if plus_i { along_i } else { self.nx - 1 - along_i };
        let row = if plus_j { along_j } else { self.ny - 1 - along_j };
        Ok((col, row))
    }

    pub fn coord_to_index(&self, col: usize, row: usize) -> Result<usize> {
        if col >= self.nx || row >= self.ny {
            return Err(GribError::IndexOutOfRange {
                index: row * self.nx + col,
                len: self.len(),
            });
        }

        let along_i = if self.scan.plus_i { col } else { self.nx - 1 - col };
        let along_j = if self.scan.plus_j { row } else { self.ny - 1 - row };
        Ok(if self.scan.adjacent_i {
            along_j * self.nx + along_i
        } else {
            along_i * self.ny + along_j
        })
    }

    /// Coordinates in wire order.
    pub fn coords(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.len()).filter_map(move |i| self.index_to_coord(i).ok())
    }
}

/// Dense two-dimensional array indexed by `(col, row)`, stored row by row
/// from row 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid<T> {
    nx: usize,
    ny: usize,
    values: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn filled(nx: usize, ny: usize, value: T) -> Self {
        Self {
            nx,
            ny,
            values: vec![value; nx * ny],
        }
    }
}

impl<T> Grid<T> {
    pub fn from_vec(nx: usize, ny: usize, values: Vec<T>) -> Result<Self> {
        if values.len() != nx * ny {
            return Err(GribError::ParseError(format!(
                "{} values do not fill a {}x{} grid",
                values.len(),
                nx,
                ny
            )));
        }
        Ok(Self { nx, ny, values })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, col: usize, row: usize) -> Option<&T> {
        if col >= self.nx || row >= self.ny {
            return None;
        }
        self.values.get(row * self.nx + col)
    }

    pub fn set(&mut self, col: usize, row: usize, value: T) -> Result<()> {
        if col >= self.nx || row >= self.ny {
            return Err(GribError::IndexOutOfRange {
                index: row * self.nx + col,
                len: self.len(),
            });
        }
        self.values[row * self.nx + col] = value;
        Ok(())
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn fits(&self, shape: &GridShape) -> bool {
        self.nx == shape.nx && self.ny == shape.ny
    }
}

impl Grid<f64> {
    pub fn missing(nx: usize, ny: usize) -> Self {
        Self::filled(nx, ny, f64::NAN)
    }

    pub fn is_missing(&self, col: usize, row: usize) -> bool {
        self.get(col, row).map_or(true, |v| v.is_nan())
    }

    /// Values in wire order.
    pub fn linearize(&self, shape: &GridShape) -> Result<Vec<f64>> {
        if !self.fits(shape) {
            return Err(GribError::EncodeError(format!(
                "grid is {}x{} but the grid definition is {}x{}",
                self.nx, self.ny, shape.nx, shape.ny
            )));
        }
        shape
            .coords()
            .map(|(col, row)| Ok(self.values[row * self.nx + col]))
            .collect()
    }
}
