use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use structopt::StructOpt;

#[macro_use]
extern crate log;

use grib1::config::Config;
use grib1::grib::{self, GribReader, Record};
use grib1::{json, Error};

#[derive(Debug, StructOpt)]
struct Cli {
  /// config file
  #[structopt(long = "config", short = "c", default_value = "config.yaml")]
  config_file: PathBuf,

  #[structopt(subcommand)]
  command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
  /// List the records of a GRIB file
  List {
    #[structopt(parse(from_os_str))]
    file: PathBuf,
  },
  /// Dump records as JSON
  Dump {
    #[structopt(parse(from_os_str))]
    file: PathBuf,
    /// only this record (0-based)
    #[structopt(long)]
    record: Option<usize>,
  },
  /// Decode a GRIB file and pack it again
  Repack {
    #[structopt(parse(from_os_str))]
    input: PathBuf,
    #[structopt(parse(from_os_str))]
    output: PathBuf,
    #[structopt(long = "decimal-scale", allow_hyphen_values = true)]
    decimal_scale: Option<i16>,
    #[structopt(long = "bits")]
    bits: Option<u8>,
  },
}

fn main() -> Result<()> {
  std::env::var("RUST_LOG").map_err(|_| {
    std::env::set_var("RUST_LOG", "error,grib1=info");
  }).unwrap_or_default();
  env_logger::init();

  let args = Cli::from_args();
  let mut config = Config::load(&args.config_file)
    .with_context(|| format!("Loading config {}", args.config_file.display()))?;

  match args.command {
    Command::List { file } => list(&config, &file),
    Command::Dump { file, record } => dump(&config, &file, record),
    Command::Repack {
      input,
      output,
      decimal_scale,
      bits,
    } => {
      if decimal_scale.is_some() {
        config.packing.decimal_scale = decimal_scale;
      }
      if bits.is_some() {
        config.packing.bits_per_value = bits;
      }
      repack(&config, &input, &output)
    }
  }
}

fn open(config: &Config, file: &Path) -> Result<GribReader<BufReader<File>>> {
  let f = File::open(file).with_context(|| format!("Opening {}", file.display()))?;
  Ok(GribReader::with_search_window(
    BufReader::new(f),
    config.scanner.max_search_window,
  ))
}

fn read_all(config: &Config, file: &Path) -> Result<Vec<Record>> {
  let mut reader = open(config, file)?;
  let mut records = Vec::new();
  while let Some(record) = reader.next_record()? {
    records.push(record);
  }
  if reader.records_seen() == 0 {
    return Err(grib::GribError::NotGrib.into());
  }
  if reader.skipped() > 0 {
    warn!("{} records without a GDS were skipped", reader.skipped());
  }
  Ok(records)
}

fn list(config: &Config, file: &Path) -> Result<()> {
  let index = open(config, file)?.index()?;
  for (i, entry) in index.iter().enumerate() {
    println!("{:>4} offset={} length={}", i, entry.offset, entry.length);
  }
  info!("{} records in {}", index.len(), file.display());
  Ok(())
}

fn dump(config: &Config, file: &Path, record: Option<usize>) -> Result<()> {
  let records = read_all(config, file)?;
  let stdout = std::io::stdout();
  let records = match record {
    Some(n) => std::slice::from_ref(records.get(n).ok_or(Error::RecordNotFound(n))?),
    None => &records[..],
  };
  json::to_writer(stdout.lock(), records)?;
  println!();
  Ok(())
}

fn repack(config: &Config, input: &Path, output: &Path) -> Result<()> {
  let records = read_all(config, input)?;
  let width = config.packing.width();

  let mut out = BufWriter::new(
    File::create(output).with_context(|| format!("Creating {}", output.display()))?,
  );
  for record in &records {
    let mut record = record.clone();
    if let Some(decimal_scale) = config.packing.decimal_scale {
      record.product_definition.decimal_scale = decimal_scale;
    }
    out.write_all(&grib::encode_record_with(&record, width)?)?;
  }
  out.flush()?;

  info!("Repacked {} records into {}", records.len(), output.display());
  Ok(())
}
