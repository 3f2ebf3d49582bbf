use anyhow::{format_err, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::aggregate::BusVoltage;

const FILE_PREFIX: &str = "bus_voltages_";
const SEPARATOR: &str = "--";

/// Scenario identifiers of a run, written `feeder--case`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub feeder: String,
    pub case: String,
}

impl Scenario {
    /// Derives the scenario from the name of the directory holding a run.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format_err!("no scenario name in path {}", dir.display()))?;
        name.parse()
            .with_context(|| format!("directory {} does not name a scenario", dir.display()))
    }

    pub fn file_name(&self) -> String {
        format!("{}{}.csv", FILE_PREFIX, self)
    }

    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(SEPARATOR) {
            Some((feeder, case)) if !feeder.is_empty() && !case.is_empty() => Ok(Scenario {
                feeder: feeder.to_string(),
                case: case.to_string(),
            }),
            _ => Err(format_err!(
                "scenario must be of the form <feeder>--<case>: {:?}",
                s
            )),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.feeder, SEPARATOR, self.case)
    }
}

/// Writes bus voltages to `path` as CSV with a `bus,v` header.
///
/// An existing file is truncated.
pub fn write_bus_voltages(path: &Path, rows: &[BusVoltage]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["bus", "v"])?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("wrote {} buses to {}", rows.len(), path.display());
    Ok(())
}
