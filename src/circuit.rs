use anyhow::{bail, format_err, Context, Result};
use num_complex::Complex64;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::cmplx;
use crate::dss::{self, Definition, Script};
use crate::loadshape::Loadshape;
use crate::math::SQRT_3;
use crate::node::node_name;
use crate::zip::LoadModel;

// Line impedance defaults (ohms per unit length).
const DEFAULT_R1: f64 = 0.058;
const DEFAULT_X1: f64 = 0.1206;

/// A connection of an element to a bus: `650.1.2.3`.
///
/// Phase `0` is a grounded conductor and never forms a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    pub bus: String,
    pub phases: Vec<u8>,
}

impl Terminal {
    /// Parses a bus reference for an element with `nphases` phases. A bare
    /// bus name connects phases `1..=nphases`.
    pub fn parse(spec: &str, nphases: usize) -> Result<Self> {
        let mut parts = spec.trim().split('.');
        let bus = parts.next().unwrap_or_default().to_lowercase();
        if bus.is_empty() {
            bail!("missing bus name in {:?}", spec);
        }
        let phases = parts
            .map(|p| {
                let phase = p
                    .parse::<u8>()
                    .with_context(|| format!("invalid conductor {:?} in {:?}", p, spec))?;
                if phase > 3 {
                    bail!("conductor {} of {:?} is not a phase", phase, spec);
                }
                Ok(phase)
            })
            .collect::<Result<Vec<u8>>>()?;

        let phases = if phases.is_empty() {
            (1..=nphases as u8).collect()
        } else if phases.len() < nphases {
            bail!(
                "{:?} names {} conductors for {} phases",
                spec,
                phases.len(),
                nphases
            );
        } else {
            phases[..nphases].to_vec()
        };

        Ok(Terminal { bus, phases })
    }

    /// Phases connected to a node (grounded conductors removed).
    pub fn live_phases(&self) -> impl Iterator<Item = u8> + '_ {
        self.phases.iter().copied().filter(|&p| p != 0)
    }
}

/// Ideal voltage source feeding the circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub terminal: Terminal,

    /// Voltage setpoint (p.u.).
    pub pu: f64,

    /// Phase 1 angle (degrees).
    pub angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub name: String,
    pub bus1: Terminal,
    pub bus2: Terminal,

    /// Series impedance of each phase conductor (ohms).
    pub z: Complex64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub name: String,
    pub terminal: Terminal,

    /// Nominal demand across all phases (VA).
    pub s: Complex64,

    pub model: LoadModel,

    /// Loadshape scaling the demand over time.
    pub shape: Option<String>,
}

/// One phase of a bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub bus: String,
    pub phase: u8,
}

impl Node {
    pub fn name(&self) -> String {
        node_name(&self.bus, self.phase)
    }
}

/// A compiled distribution circuit.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub name: String,

    /// Base voltage, line to line (kV).
    pub base_kv: f64,

    pub source: Source,
    pub lines: Vec<Line>,
    pub loads: Vec<Load>,
    pub loadshapes: HashMap<String, Loadshape>,

    /// Global load multiplier (`set loadmult=`).
    pub load_mult: f64,

    nodes: Vec<Node>,
}

#[derive(Clone, Copy)]
struct Linecode {
    r1: f64,
    x1: f64,
}

impl Circuit {
    /// Compiles the circuit script at `path`.
    pub fn compile(path: &Path) -> Result<Self> {
        let script = dss::compile_file(path)?;
        Self::from_script(&script).with_context(|| format!("building {}", path.display()))
    }

    pub fn from_script(script: &Script) -> Result<Self> {
        let circuit_def = script
            .definitions
            .iter()
            .find(|d| d.class == "circuit")
            .ok_or_else(|| format_err!("no circuit defined"))?;

        let mut linecodes = HashMap::new();
        let mut loadshapes = HashMap::new();
        for (def, dir) in script.definitions.iter().zip(&script.dirs) {
            match def.class.as_str() {
                "linecode" => {
                    linecodes.insert(def.name.clone(), make_linecode(def)?);
                }
                "loadshape" => {
                    loadshapes.insert(def.name.clone(), Loadshape::from_definition(def, dir)?);
                }
                _ => {}
            }
        }

        let base_kv = circuit_def.get_f64("basekv")?.unwrap_or(115.0);
        if !(base_kv > 0.0) {
            bail!("{}: basekv must be positive", circuit_def.full_name());
        }
        let source = make_source(circuit_def)?;

        let mut lines: Vec<Line> = Vec::new();
        let mut loads: Vec<Load> = Vec::new();
        let mut terminals = vec![source.terminal.clone()];
        for def in &script.definitions {
            match def.class.as_str() {
                "circuit" | "linecode" | "loadshape" => {}
                "line" => {
                    if enabled(def)? {
                        let line = make_line(def, &linecodes)?;
                        terminals.push(line.bus1.clone());
                        terminals.push(line.bus2.clone());
                        lines.push(line);
                    }
                }
                "load" => {
                    if enabled(def)? {
                        let load = make_load(def)?;
                        if let Some(shape) = &load.shape {
                            if !loadshapes.contains_key(shape) {
                                bail!("{}: unknown loadshape {}", def.full_name(), shape);
                            }
                        }
                        terminals.push(load.terminal.clone());
                        loads.push(load);
                    }
                }
                _ => log::warn!("skipping unsupported element {}", def.full_name()),
            }
        }

        let load_mult = match script.option("loadmult") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("invalid loadmult {:?}", v))?,
            None => 1.0,
        };

        let circuit = Circuit {
            name: circuit_def.name.clone(),
            base_kv,
            source,
            lines,
            loads,
            loadshapes,
            load_mult,
            nodes: enumerate_nodes(&terminals),
        };
        log::info!(
            "circuit {}: {} lines, {} loads, {} nodes",
            circuit.name,
            circuit.lines.len(),
            circuit.loads.len(),
            circuit.nodes.len()
        );

        Ok(circuit)
    }

    /// All nodes: buses in order of first reference (source bus first),
    /// phases ascending within a bus.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(Node::name).collect()
    }

    /// Base voltage, line to neutral (V).
    pub fn v_base(&self) -> f64 {
        self.base_kv * 1000.0 / SQRT_3
    }

    /// Combined load multiplier of `load` at `time` (hours).
    pub fn load_mult_at(&self, load: &Load, time: f64) -> f64 {
        let shape = load
            .shape
            .as_ref()
            .and_then(|s| self.loadshapes.get(s))
            .map_or(1.0, |ls| ls.mult_at(time));
        self.load_mult * shape
    }
}

/// Nodes of `terminals`: buses in order of first reference, phases
/// ascending within a bus.
fn enumerate_nodes(terminals: &[Terminal]) -> Vec<Node> {
    let mut order: Vec<&str> = Vec::new();
    let mut phases: HashMap<&str, BTreeSet<u8>> = HashMap::new();
    for t in terminals {
        let set = phases.entry(t.bus.as_str()).or_insert_with(|| {
            order.push(t.bus.as_str());
            BTreeSet::new()
        });
        set.extend(t.live_phases());
    }

    order
        .into_iter()
        .flat_map(|bus| {
            phases[bus].iter().map(move |&phase| Node {
                bus: bus.to_string(),
                phase,
            })
        })
        .collect()
}

fn enabled(def: &Definition) -> Result<bool> {
    Ok(def.get_bool("enabled")?.unwrap_or(true))
}

fn phases(def: &Definition) -> Result<usize> {
    let n = def.get_usize("phases")?.unwrap_or(3);
    if n == 0 || n > 3 {
        bail!("{}: phases must be 1, 2 or 3", def.full_name());
    }
    Ok(n)
}

fn make_source(def: &Definition) -> Result<Source> {
    let nphases = phases(def)?;
    Ok(Source {
        terminal: Terminal::parse(def.get("bus1").unwrap_or("sourcebus"), nphases)
            .with_context(|| def.full_name())?,
        pu: def.get_f64("pu")?.unwrap_or(1.0),
        angle: def.get_f64("angle")?.unwrap_or(0.0),
    })
}

fn make_linecode(def: &Definition) -> Result<Linecode> {
    if def.get("rmatrix").is_some() || def.get("xmatrix").is_some() {
        log::warn!(
            "{}: impedance matrices not supported, using r1/x1",
            def.full_name()
        );
    }
    Ok(Linecode {
        r1: def.get_f64("r1")?.unwrap_or(DEFAULT_R1),
        x1: def.get_f64("x1")?.unwrap_or(DEFAULT_X1),
    })
}

fn make_line(def: &Definition, linecodes: &HashMap<String, Linecode>) -> Result<Line> {
    let nphases = phases(def)?;
    let terminal = |key: &str| -> Result<Terminal> {
        let spec = def
            .get(key)
            .ok_or_else(|| format_err!("{}: {} is required", def.full_name(), key))?;
        Terminal::parse(spec, nphases).with_context(|| def.full_name())
    };
    let bus1 = terminal("bus1")?;
    let bus2 = terminal("bus2")?;
    if bus1.bus == bus2.bus {
        bail!("{}: both terminals on bus {}", def.full_name(), bus1.bus);
    }

    let z = if def.get_bool("switch")?.unwrap_or(false) {
        cmplx!(1.0, 1.0) * 0.001
    } else {
        let code = match def.get("linecode") {
            Some(name) => {
                let name = name.to_lowercase();
                *linecodes.get(&name).ok_or_else(|| {
                    format_err!("{}: unknown linecode {}", def.full_name(), name)
                })?
            }
            None => Linecode {
                r1: DEFAULT_R1,
                x1: DEFAULT_X1,
            },
        };
        let r1 = def.get_f64("r1")?.unwrap_or(code.r1);
        let x1 = def.get_f64("x1")?.unwrap_or(code.x1);
        let length = def.get_f64("length")?.unwrap_or(1.0);
        cmplx!(r1, x1) * length
    };

    Ok(Line {
        name: def.name.clone(),
        bus1,
        bus2,
        z,
    })
}

fn make_load(def: &Definition) -> Result<Load> {
    let nphases = phases(def)?;
    let spec = def
        .get("bus1")
        .ok_or_else(|| format_err!("{}: bus1 is required", def.full_name()))?;
    let terminal = Terminal::parse(spec, nphases).with_context(|| def.full_name())?;

    if let Some(conn) = def.get("conn") {
        if conn.to_lowercase().starts_with('d') {
            log::warn!(
                "{}: delta connection modelled as wye",
                def.full_name()
            );
        }
    }

    let kw = def.get_f64("kw")?.unwrap_or(10.0);
    let kvar = match def.get_f64("kvar")? {
        Some(kvar) => kvar,
        None => {
            let pf = def.get_f64("pf")?.unwrap_or(0.88);
            if pf == 0.0 || pf.abs() > 1.0 {
                bail!("{}: invalid pf {}", def.full_name(), pf);
            }
            kw * pf.abs().acos().tan() * pf.signum()
        }
    };
    let model = match def.get_usize("model")? {
        Some(code) => LoadModel::from_code(code),
        None => LoadModel::ConstantPower,
    };
    let shape = def
        .get("yearly")
        .or_else(|| def.get("daily"))
        .map(str::to_lowercase);

    Ok(Load {
        name: def.name.clone(),
        terminal,
        s: cmplx!(kw, kvar) * 1000.0,
        model,
        shape,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dss::compile_str;

    fn build(text: &str) -> Result<Circuit> {
        Circuit::from_script(&compile_str(text, Path::new("."))?)
    }

    #[test]
    fn terminal_parsing() -> Result<()> {
        assert_eq!(Terminal::parse("B", 3)?.phases, vec![1, 2, 3]);
        assert_eq!(Terminal::parse("B.3", 1)?.phases, vec![3]);
        assert_eq!(Terminal::parse("B.1.2.3.0", 3)?.phases, vec![1, 2, 3]);
        assert_eq!(Terminal::parse("Bus_A.2.0", 2)?.bus, "bus_a");
        assert!(Terminal::parse("B.1", 3).is_err());
        assert!(Terminal::parse("B.4", 1).is_err());
        assert!(Terminal::parse("B.x", 1).is_err());
        assert!(Terminal::parse(".1", 1).is_err());
        Ok(())
    }

    #[test]
    fn node_order() -> Result<()> {
        let c = build(
            "new circuit.c bus1=src basekv=12.47\n\
             new line.l1 bus1=src bus2=b.3.1 phases=2\n\
             new load.x bus1=a.2 phases=1\n\
             new load.y bus1=b.2 phases=1\n",
        )?;
        assert_eq!(
            c.node_names(),
            vec!["src.1", "src.2", "src.3", "b.1", "b.2", "b.3", "a.2"]
        );
        Ok(())
    }

    #[test]
    fn line_impedance() -> Result<()> {
        let c = build(
            "new circuit.c\n\
             new linecode.lc r1=0.2 x1=0.4\n\
             new line.a bus1=s bus2=t linecode=LC length=2\n\
             new line.b bus1=t bus2=u linecode=lc x1=1 length=3\n\
             new line.c bus1=u bus2=v switch=yes\n",
        )?;
        assert_eq!(c.lines[0].z, cmplx!(0.4, 0.8));
        assert_eq!(c.lines[1].z, cmplx!(0.6000000000000001, 3.0));
        assert_eq!(c.lines[2].z, cmplx!(0.001, 0.001));
        Ok(())
    }

    #[test]
    fn load_demand() -> Result<()> {
        let c = build(
            "new circuit.c\n\
             new loadshape.day npts=2 mult=(0.5 1.5)\n\
             new load.a bus1=x kw=30 kvar=10 model=2\n\
             new load.b bus1=y.1 phases=1 kw=10 pf=1 daily=Day\n\
             set loadmult=2\n",
        )?;
        assert_eq!(c.loads[0].s, cmplx!(30e3, 10e3));
        assert_eq!(c.loads[0].model, LoadModel::ConstantImpedance);
        assert_eq!(c.loads[1].s, cmplx!(10e3, 0.0));
        assert_eq!(c.load_mult_at(&c.loads[0], 0.0), 2.0);
        assert_eq!(c.load_mult_at(&c.loads[1], 1.0), 3.0);
        Ok(())
    }

    #[test]
    fn disabled_and_unsupported_elements_are_skipped() -> Result<()> {
        let c = build(
            "new circuit.c\n\
             new line.a bus1=s bus2=t enabled=no\n\
             new transformer.t1 buses=(s t)\n",
        )?;
        assert!(c.lines.is_empty());
        assert_eq!(c.nodes().len(), 3);
        Ok(())
    }

    #[test]
    fn build_errors() {
        assert!(build("new line.a bus1=s bus2=t").is_err());
        assert!(build("new circuit.c\nnew line.a bus1=s bus2=s").is_err());
        assert!(build("new circuit.c\nnew line.a bus1=s").is_err());
        assert!(build("new circuit.c\nnew line.a bus1=s bus2=t linecode=none").is_err());
        assert!(build("new circuit.c\nnew load.a bus1=s yearly=missing").is_err());
        assert!(build("new circuit.c\nnew load.a bus1=s phases=4").is_err());
        assert!(build("new circuit.c basekv=0").is_err());
    }
}
