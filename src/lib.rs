#[macro_use]
extern crate log;

pub mod config;
mod error;
pub mod grib;
pub mod json;

pub use crate::error::{Error, Result};
