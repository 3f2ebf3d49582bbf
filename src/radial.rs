use anyhow::{bail, Result};
use num_complex::Complex64;
use num_traits::Zero;
use std::collections::{HashMap, VecDeque};

use crate::circuit::Circuit;
use crate::debug::format_node_voltages;
use crate::math::phase_angle;
use crate::opt::SolveOpt;
use crate::zip::SdZip;

/// Node voltages of a solved circuit, aligned with `Circuit::nodes`.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Node voltages (V). Nodes not connected to the source are zero.
    pub v: Vec<Complex64>,

    pub converged: bool,
    pub iterations: usize,
}

struct Branch {
    z: Complex64,
}

/// Solves a radial circuit at `time` using the current summation
/// backward/forward sweep.
///
/// Each node is one phase of a bus and each line contributes one branch per
/// phase, so the phases of a circuit are solved as decoupled networks.
/// Returns an error if the node graph contains a loop.
pub(crate) fn radial_pf(circuit: &Circuit, time: f64, opt: &SolveOpt) -> Result<Solution> {
    let nodes = circuit.nodes();
    let nn = nodes.len();
    let index: HashMap<(&str, u8), usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| ((n.bus.as_str(), n.phase), i))
        .collect();

    // Adjacency lists of (branch, neighbour).
    let mut branches = Vec::new();
    let mut adj: Vec<Vec<(usize, usize)>> = vec![Vec::new(); nn];
    for line in &circuit.lines {
        for (&pf, &pt) in line.bus1.phases.iter().zip(&line.bus2.phases) {
            if pf == 0 || pt == 0 {
                continue;
            }
            let f = index[&(line.bus1.bus.as_str(), pf)];
            let t = index[&(line.bus2.bus.as_str(), pt)];
            let e = branches.len();
            branches.push(Branch { z: line.z });
            adj[f].push((e, t));
            adj[t].push((e, f));
        }
    }

    let v_base = circuit.v_base();
    let src = &circuit.source;
    let mut v = vec![Complex64::zero(); nn];
    let mut parent: Vec<Option<(usize, usize)>> = vec![None; nn];
    let mut visited = vec![false; nn];
    let mut order = Vec::with_capacity(nn);
    let mut queue = VecDeque::new();

    for p in src.terminal.live_phases() {
        let i = index[&(src.terminal.bus.as_str(), p)];
        v[i] = Complex64::from_polar(src.pu * v_base, phase_angle(src.angle, p).to_radians());
        visited[i] = true;
        queue.push_back(i);
    }

    // Breadth-first ordering from the source; parents precede children.
    while let Some(i) = queue.pop_front() {
        order.push(i);
        let via = parent[i].map(|(_, e)| e);
        for &(e, j) in &adj[i] {
            if Some(e) == via {
                continue;
            }
            if visited[j] {
                bail!(
                    "circuit {} is not radial: loop closed at node {}",
                    circuit.name,
                    nodes[j].name()
                );
            }
            visited[j] = true;
            parent[j] = Some((i, e));
            v[j] = v[i];
            queue.push_back(j);
        }
    }

    let isolated = nn - order.len();
    if isolated > 0 {
        log::warn!("{} nodes not connected to the source", isolated);
    }

    // Nominal demand per node (VA).
    let mut sd = vec![SdZip::default(); nn];
    for load in &circuit.loads {
        let live: Vec<u8> = load.terminal.live_phases().collect();
        if live.is_empty() {
            continue;
        }
        let s = load.s * circuit.load_mult_at(load, time) / live.len() as f64;
        for p in live {
            sd[index[&(load.terminal.bus.as_str(), p)]].add(s, load.model);
        }
    }

    log::debug!("V0: {}", format_node_voltages(&circuit.node_names(), &v, v_base));

    let mut converged = false;
    let mut i = 0;
    let mut j = vec![Complex64::zero(); nn];
    while !converged && i < opt.max_iterations {
        i += 1;

        // backward sweep: injected load currents summed towards the source
        for &n in &order {
            j[n] = if sd[n].is_zero() || v[n].is_zero() {
                Complex64::zero()
            } else {
                (sd[n].at(v[n].norm() / v_base) / v[n]).conj()
            };
        }
        for &n in order.iter().rev() {
            if let Some((p, _)) = parent[n] {
                let jn = j[n];
                j[p] += jn;
            }
        }

        // forward sweep: voltage drops away from the source
        let mut max_dv: f64 = 0.0;
        for &n in &order {
            if let Some((p, e)) = parent[n] {
                let vn = v[p] - branches[e].z * j[n];
                max_dv = max_dv.max((vn - v[n]).norm() / v_base);
                v[n] = vn;
            }
        }

        log::trace!("{:>3}        {:10.3e}", i, max_dv);
        if max_dv < opt.tolerance {
            converged = true;
        }
    }

    if converged {
        log::info!(
            "Backward/forward sweep power flow converged in {} iterations.",
            i
        );
    } else {
        log::warn!(
            "Backward/forward sweep power flow did not converge in {} iterations.",
            i
        );
    }
    log::debug!("V: {}", format_node_voltages(&circuit.node_names(), &v, v_base));

    Ok(Solution {
        v,
        converged,
        iterations: i,
    })
}
