use crate::grib;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("GribError: {0}")]
    GribError(#[from] grib::GribError),

    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JsonError: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("ConfigError: {0}")]
    ConfigError(#[from] confy::ConfyError),

    #[error("RecordNotFound({0})")]
    RecordNotFound(usize),
}
