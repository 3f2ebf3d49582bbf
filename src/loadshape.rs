use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::dss::Definition;

/// A sequence of load multipliers sampled at a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Loadshape {
    pub name: String,

    /// Sample interval (hours).
    pub interval: f64,

    pub mult: Vec<f64>,
}

impl Loadshape {
    /// Builds a loadshape from its definition. A `mult=(file=...)` reference
    /// is read relative to `dir`.
    pub fn from_definition(def: &Definition, dir: &Path) -> Result<Self> {
        let interval = interval(def)?;
        if !(interval > 0.0) {
            bail!("{}: interval must be positive", def.full_name());
        }

        let mut mult = match def.get("mult") {
            Some(v) => match v.trim().split_once('=') {
                Some((key, file)) if key.trim().eq_ignore_ascii_case("file") => {
                    read_mult_file(&dir.join(file.trim()))
                        .with_context(|| format!("{}: reading multipliers", def.full_name()))?
                }
                _ => parse_values(v).with_context(|| format!("{}: mult", def.full_name()))?,
            },
            None => Vec::new(),
        };

        if let Some(npts) = def.get_usize("npts")? {
            if npts < mult.len() {
                mult.truncate(npts);
            } else if npts > mult.len() {
                log::warn!(
                    "{}: npts={} but {} multipliers given",
                    def.full_name(),
                    npts,
                    mult.len()
                );
            }
        }
        if mult.is_empty() {
            bail!("{}: no multipliers", def.full_name());
        }

        Ok(Loadshape {
            name: def.name.clone(),
            interval,
            mult,
        })
    }

    /// Returns the multiplier in effect at `time` (hours). The shape repeats
    /// after its last sample.
    pub fn mult_at(&self, time: f64) -> f64 {
        let n = self.mult.len();
        let k = (time / self.interval).floor().rem_euclid(n as f64) as usize;
        self.mult[k.min(n - 1)]
    }
}

/// Sample interval in hours from whichever of `interval`, `minterval` or
/// `sinterval` was assigned last.
fn interval(def: &Definition) -> Result<f64> {
    let last = def
        .props
        .iter()
        .rev()
        .map(|(k, _)| k.as_str())
        .find(|k| matches!(*k, "interval" | "minterval" | "sinterval"));
    let value = match last {
        Some(key) => def.get_f64(key)?.unwrap_or(1.0),
        None => return Ok(1.0),
    };
    Ok(match last {
        Some("minterval") => value / 60.0,
        Some("sinterval") => value / 3600.0,
        _ => value,
    })
}

fn parse_values(s: &str) -> Result<Vec<f64>> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<f64>()
                .with_context(|| format!("invalid multiplier {:?}", v))
        })
        .collect()
}

/// Reads one multiplier per record, taking the first column of CSV rows.
fn read_mult_file(path: &Path) -> Result<Vec<f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let mut mult = Vec::new();
    for (n, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("{}: record {}", path.display(), n + 1))?;
        let first = match record.get(0) {
            Some(v) if !v.is_empty() => v,
            _ => continue,
        };
        let v = first
            .parse::<f64>()
            .with_context(|| format!("{}: invalid multiplier {:?}", path.display(), first))?;
        mult.push(v);
    }
    Ok(mult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn def(props: &[(&str, &str)]) -> Definition {
        Definition {
            class: "loadshape".into(),
            name: "ls".into(),
            props: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn hourly_shape_wraps() -> Result<()> {
        let ls = Loadshape::from_definition(
            &def(&[("npts", "4"), ("mult", "1 0.5, 0.25 2")]),
            Path::new("."),
        )?;
        assert_eq!(ls.mult_at(0.0), 1.0);
        assert_eq!(ls.mult_at(1.5), 0.5);
        assert_eq!(ls.mult_at(3.0), 2.0);
        assert_eq!(ls.mult_at(4.0), 1.0);
        assert_eq!(ls.mult_at(-1.0), 2.0);
        Ok(())
    }

    #[test]
    fn minute_interval() -> Result<()> {
        let ls = Loadshape::from_definition(
            &def(&[("interval", "2"), ("minterval", "15"), ("mult", "1 2 3 4")]),
            Path::new("."),
        )?;
        assert_eq!(ls.interval, 0.25);
        assert_eq!(ls.mult_at(0.5), 3.0);
        assert_eq!(ls.mult_at(1.0), 1.0);
        Ok(())
    }

    #[test]
    fn npts_truncates() -> Result<()> {
        let ls = Loadshape::from_definition(
            &def(&[("npts", "2"), ("mult", "1 2 3")]),
            Path::new("."),
        )?;
        assert_eq!(ls.mult, vec![1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn multipliers_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("shape.csv"), "0.5,x\n\n0.75\n")?;
        let ls = Loadshape::from_definition(&def(&[("mult", "file=shape.csv")]), dir.path())?;
        assert_eq!(ls.mult, vec![0.5, 0.75]);
        Ok(())
    }

    #[test]
    fn quoted_multiplier_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("s.csv"), "\"0.5\",x\n\"0.75\",y\n")?;
        let ls = Loadshape::from_definition(&def(&[("mult", "file=s.csv")]), dir.path())?;
        assert_eq!(ls.mult, vec![0.5, 0.75]);

        fs::write(dir.path().join("bad.csv"), "0.5\nhigh\n")?;
        assert!(Loadshape::from_definition(&def(&[("mult", "file=bad.csv")]), dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn invalid_shapes() {
        let dir = Path::new(".");
        assert!(Loadshape::from_definition(&def(&[]), dir).is_err());
        assert!(Loadshape::from_definition(&def(&[("mult", "1 x")]), dir).is_err());
        assert!(Loadshape::from_definition(&def(&[("interval", "0"), ("mult", "1")]), dir).is_err());
    }
}
