use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::grib::{BitWidth, DEFAULT_SEARCH_WINDOW};
use crate::Result;

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
  pub scanner: ScannerConfig,
  pub packing: PackingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerConfig {
  /// Octets skipped while looking for a record header before giving up
  pub max_search_window: usize,
}

impl Default for ScannerConfig {
  fn default() -> Self {
    Self {
      max_search_window: DEFAULT_SEARCH_WINDOW,
    }
  }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackingConfig {
  /// Overrides the PDS decimal scale factor when re-packing
  pub decimal_scale: Option<i16>,
  /// Packs with a fixed width instead of as many bits as needed
  pub bits_per_value: Option<u8>,
}

impl PackingConfig {
  pub fn width(&self) -> BitWidth {
    match self.bits_per_value {
      Some(bits) => BitWidth::Fixed(bits),
      None => BitWidth::Variable,
    }
  }
}

impl Config {
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    if !path.exists() {
      debug!("No config at {}, using defaults", path.display());
      return Ok(Self::default());
    }
    Ok(confy::load_path(path)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn missing_file_gives_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load(dir.path().join("absent.yaml"))?;
    assert_eq!(config, Config::default());
    assert_eq!(config.scanner.max_search_window, 65536);
    assert_eq!(config.packing.width(), BitWidth::Variable);
    Ok(())
  }

  #[test]
  fn load_yaml() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    writeln!(file, "scanner:\n  maxSearchWindow: 1024\npacking:\n  decimalScale: 2\n  bitsPerValue: 12")?;

    let config = Config::load(file.path())?;
    assert_eq!(config.scanner.max_search_window, 1024);
    assert_eq!(config.packing.decimal_scale, Some(2));
    assert_eq!(config.packing.width(), BitWidth::Fixed(12));
    Ok(())
  }
}
