use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::node::bus_name;

/// Mean voltage magnitude of the nodes at one bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusVoltage {
    pub bus: String,
    pub v: f64,
}

/// Groups node voltage magnitudes by bus and averages each group.
///
/// `nodes` and `vmag` are parallel sequences. Rows are returned in
/// ascending order of bus name.
pub fn aggregate(nodes: &[String], vmag: &[f64]) -> Result<Vec<BusVoltage>> {
    if nodes.len() != vmag.len() {
        bail!(
            "{} node names but {} voltage magnitudes",
            nodes.len(),
            vmag.len()
        );
    }

    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (node, v) in nodes.iter().zip(vmag) {
        let (sum, count) = groups.entry(bus_name(node)).or_insert((0.0, 0));
        *sum += v;
        *count += 1;
    }

    Ok(groups
        .into_iter()
        .map(|(bus, (sum, count))| BusVoltage {
            bus,
            v: sum / count as f64,
        })
        .collect())
}
