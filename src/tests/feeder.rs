use anyhow::Result;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::engine::{Engine, Session};
use crate::opt::DEFAULT_TIME;
use crate::output::Scenario;
use crate::pipeline::{bus_voltages, snapshot};

fn case_dir() -> Result<PathBuf> {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    Ok(PathBuf::from(manifest_dir).join("casedata").join("f13--base"))
}

fn master() -> Result<PathBuf> {
    Ok(case_dir()?.join("Master.dss"))
}

#[test]
fn feeder_nodes() -> Result<()> {
    let mut session = Session::default();
    session.compile(&master()?)?;
    let nodes = session.all_node_names()?;
    assert_eq!(nodes.len(), 20);
    assert_eq!(&nodes[..4], ["sourcebus.1", "sourcebus.2", "sourcebus.3", "632.1"]);
    assert!(nodes.contains(&"645.2".to_string()));
    assert!(!nodes.contains(&"645.1".to_string()));
    assert_eq!(nodes.last().map(String::as_str), Some("692.3"));
    Ok(())
}

#[test]
fn feeder_bus_voltages() -> Result<()> {
    let mut session = Session::default();
    let rows = bus_voltages(&mut session, &master()?, DEFAULT_TIME)?;

    let buses: Vec<&str> = rows.iter().map(|r| r.bus.as_str()).collect();
    assert_eq!(
        buses,
        ["611", "632", "645", "646", "652", "671", "684", "692", "sourcebus"]
    );

    let source = &rows[8];
    assert!((source.v - 1.0).abs() < 1e-9);
    for row in &rows[..8] {
        assert!(row.v < 1.0 && row.v > 0.8, "{}: {}", row.bus, row.v);
    }
    Ok(())
}

#[test]
fn lighter_load_raises_voltage() -> Result<()> {
    let v671 = |time: f64| -> Result<f64> {
        let mut session = Session::default();
        let rows = bus_voltages(&mut session, &master()?, time)?;
        Ok(rows
            .iter()
            .find(|r| r.bus == "671")
            .map(|r| r.v)
            .unwrap_or_default())
    };
    // hour 3 of the residential shape is its minimum, hour 18 its peak
    assert!(v671(3.0)? > v671(18.0)?);
    assert_eq!(v671(DEFAULT_TIME)?, v671(16.0)?);
    Ok(())
}

#[test]
fn snapshot_is_deterministic() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let scenario = Scenario::from_dir(&case_dir()?)?;

    let mut session = Session::default();
    let path = snapshot(&mut session, &master()?, DEFAULT_TIME, &scenario, dir.path())?;
    assert_eq!(path, dir.path().join("bus_voltages_f13--base.csv"));
    let first = fs::read(&path)?;

    let mut session = Session::default();
    snapshot(&mut session, &master()?, DEFAULT_TIME, &scenario, dir.path())?;
    assert_eq!(fs::read(&path)?, first);

    let text = String::from_utf8(first)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("bus,v"));
    assert_eq!(lines.count(), 9);
    Ok(())
}
