use anyhow::{format_err, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::Engine;
use crate::output::Scenario;
use crate::pipeline::{bus_voltages, snapshot};

/// An engine returning canned results.
#[derive(Default)]
struct FixedEngine {
    nodes: Vec<String>,
    vmag: Vec<f64>,
    compiled: Option<PathBuf>,
    solved_at: Option<f64>,
}

impl FixedEngine {
    fn new(results: &[(&str, f64)]) -> Self {
        Self {
            nodes: results.iter().map(|(n, _)| n.to_string()).collect(),
            vmag: results.iter().map(|(_, v)| *v).collect(),
            ..Default::default()
        }
    }
}

impl Engine for FixedEngine {
    fn compile(&mut self, path: &Path) -> Result<()> {
        self.compiled = Some(path.to_path_buf());
        Ok(())
    }

    fn solve(&mut self, time: f64) -> Result<()> {
        self.solved_at = Some(time);
        Ok(())
    }

    fn all_node_names(&self) -> Result<Vec<String>> {
        self.compiled
            .as_ref()
            .map(|_| self.nodes.clone())
            .ok_or_else(|| format_err!("not compiled"))
    }

    fn all_node_vmag_pu(&self) -> Result<Vec<f64>> {
        self.solved_at
            .map(|_| self.vmag.clone())
            .ok_or_else(|| format_err!("not solved"))
    }
}

fn scenario() -> Scenario {
    Scenario {
        feeder: "p13uhs22_1247".into(),
        case: "p13udt26466".into(),
    }
}

#[test]
fn compiles_then_solves_once() -> Result<()> {
    let mut engine = FixedEngine::new(&[("B1.1", 1.0)]);
    bus_voltages(&mut engine, Path::new("Master.dss"), 12496.0)?;
    assert_eq!(engine.compiled, Some(PathBuf::from("Master.dss")));
    assert_eq!(engine.solved_at, Some(12496.0));
    Ok(())
}

#[test]
fn phases_average_to_bus() -> Result<()> {
    let mut engine = FixedEngine::new(&[("B1.1", 1.0), ("B1.2", 1.02), ("B1.3", 0.98)]);
    let rows = bus_voltages(&mut engine, Path::new("Master.dss"), 12496.0)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].bus, "B1");
    assert!((rows[0].v - 1.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn unsuffixed_node_forms_own_bus() -> Result<()> {
    let mut engine = FixedEngine::new(&[("X", 0.97), ("Y.1", 1.0), ("Y.2", 0.98)]);
    let rows = bus_voltages(&mut engine, Path::new("Master.dss"), 0.0)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].bus, "X");
    assert_eq!(rows[0].v, 0.97);
    assert_eq!(rows[1].bus, "Y");
    Ok(())
}

#[test]
fn empty_circuit_writes_header_only() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = FixedEngine::new(&[]);
    let path = snapshot(
        &mut engine,
        Path::new("Master.dss"),
        12496.0,
        &scenario(),
        dir.path(),
    )?;
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("bus_voltages_p13uhs22_1247--p13udt26466.csv")
    );
    assert_eq!(fs::read_to_string(&path)?, "bus,v\n");
    Ok(())
}

#[test]
fn repeated_runs_overwrite() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = Path::new("Master.dss");

    let mut engine = FixedEngine::new(&[("b.1", 0.9), ("a.1", 1.0), ("a.2", 0.5)]);
    let path = snapshot(&mut engine, model, 1.0, &scenario(), dir.path())?;
    assert_eq!(fs::read_to_string(&path)?, "bus,v\na,0.75\nb,0.9\n");

    let mut engine = FixedEngine::new(&[("c.3", 1.01)]);
    let path = snapshot(&mut engine, model, 1.0, &scenario(), dir.path())?;
    assert_eq!(fs::read_to_string(&path)?, "bus,v\nc,1.01\n");
    Ok(())
}

#[test]
fn mismatched_results_write_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = FixedEngine::new(&[("a.1", 1.0)]);
    engine.vmag.clear();
    let res = snapshot(
        &mut engine,
        Path::new("Master.dss"),
        1.0,
        &scenario(),
        dir.path(),
    );
    assert!(res.is_err());
    assert!(!scenario().output_path(dir.path()).exists());
    Ok(())
}
