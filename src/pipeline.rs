use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::aggregate::{aggregate, BusVoltage};
use crate::engine::Engine;
use crate::output::{write_bus_voltages, Scenario};

/// Compiles `model`, solves it once at `time` and returns the mean voltage
/// magnitude (p.u.) of every bus.
pub fn bus_voltages(engine: &mut dyn Engine, model: &Path, time: f64) -> Result<Vec<BusVoltage>> {
    engine.compile(model)?;
    let nodes = engine.all_node_names()?;
    log::debug!("{} nodes", nodes.len());

    engine.solve(time)?;
    let vmag = engine.all_node_vmag_pu()?;

    aggregate(&nodes, &vmag)
}

/// Runs [`bus_voltages`] and writes the result for `scenario` into
/// `out_dir`. Returns the path written.
pub fn snapshot(
    engine: &mut dyn Engine,
    model: &Path,
    time: f64,
    scenario: &Scenario,
    out_dir: &Path,
) -> Result<PathBuf> {
    let rows = bus_voltages(engine, model, time)?;
    let path = scenario.output_path(out_dir);
    write_bus_voltages(&path, &rows)?;
    Ok(path)
}
