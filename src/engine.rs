use anyhow::{bail, format_err, Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::circuit::Circuit;
use crate::debug::format_f64_vec;
use crate::dss::{params, tokenize, Tok};
use crate::opt::{Alg, SolveOpt};
use crate::radial::{radial_pf, Solution};

/// A power flow engine driven through compile/solve commands and queried
/// for node results.
pub trait Engine {
    /// Compiles the circuit model at `path`, replacing any previous circuit.
    fn compile(&mut self, path: &Path) -> Result<()>;

    /// Solves the compiled circuit at simulated `time` (hours).
    fn solve(&mut self, time: f64) -> Result<()>;

    /// Names of all nodes (`bus.phase`) of the compiled circuit.
    fn all_node_names(&self) -> Result<Vec<String>>;

    /// Voltage magnitudes (p.u.) of the last solution, aligned with
    /// `all_node_names`.
    fn all_node_vmag_pu(&self) -> Result<Vec<f64>>;

    /// Parses and executes a text command.
    fn run_command(&mut self, text: &str) -> Result<()> {
        match text.parse::<Command>()? {
            Command::Compile(path) => self.compile(&path),
            Command::Solve { time } => self.solve(time.unwrap_or(0.0)),
        }
    }
}

/// A text command accepted by [`Engine::run_command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `compile <path>`
    Compile(PathBuf),
    /// `solve [time=<hours>]`
    Solve { time: Option<f64> },
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let toks = tokenize(s)?;
        let (verb, rest) = match toks.split_first() {
            Some((Tok::Word(verb), rest)) => (verb.to_lowercase(), rest),
            Some((Tok::Eq, _)) => bail!("unexpected '='"),
            None => bail!("empty command"),
        };
        let params = params(rest)?;

        match verb.as_str() {
            "compile" => {
                let path = params
                    .into_iter()
                    .next()
                    .map(|(_, v)| v)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| format_err!("compile requires a file name"))?;
                Ok(Command::Compile(PathBuf::from(path)))
            }
            "solve" => {
                let mut time = None;
                for (key, value) in params {
                    match key.as_deref() {
                        Some("time") => {
                            time = Some(
                                value
                                    .parse()
                                    .with_context(|| format!("invalid time {:?}", value))?,
                            )
                        }
                        Some(k) => bail!("unsupported solve option {:?}", k),
                        None => bail!("invalid solve option {:?}", value),
                    }
                }
                Ok(Command::Solve { time })
            }
            v => bail!("unknown command {:?}", v),
        }
    }
}

/// The built-in engine: compiles DSS scripts and solves them with the
/// radial power flow.
#[derive(Default)]
pub struct Session {
    opt: SolveOpt,
    circuit: Option<Circuit>,
    solution: Option<Solution>,
}

impl Session {
    pub fn new(opt: SolveOpt) -> Self {
        Self {
            opt,
            ..Default::default()
        }
    }

    pub fn circuit(&self) -> Option<&Circuit> {
        self.circuit.as_ref()
    }

    fn active_circuit(&self) -> Result<&Circuit> {
        self.circuit
            .as_ref()
            .ok_or_else(|| format_err!("no circuit has been compiled"))
    }
}

impl Engine for Session {
    fn compile(&mut self, path: &Path) -> Result<()> {
        self.circuit = None;
        self.solution = None;
        self.circuit = Some(Circuit::compile(path)?);
        Ok(())
    }

    fn solve(&mut self, time: f64) -> Result<()> {
        self.solution = None;
        let circuit = self.active_circuit()?;
        log::info!("solving {} at time {}", circuit.name, time);
        let solution = match self.opt.algorithm {
            Alg::SUM => radial_pf(circuit, time, &self.opt)?,
        };
        if !solution.converged {
            bail!(
                "power flow did not converge in {} iterations",
                solution.iterations
            );
        }
        self.solution = Some(solution);
        Ok(())
    }

    fn all_node_names(&self) -> Result<Vec<String>> {
        Ok(self.active_circuit()?.node_names())
    }

    fn all_node_vmag_pu(&self) -> Result<Vec<f64>> {
        let circuit = self.active_circuit()?;
        let solution = self
            .solution
            .as_ref()
            .ok_or_else(|| format_err!("circuit {} has not been solved", circuit.name))?;
        let v_base = circuit.v_base();
        let vm: Vec<f64> = solution.v.iter().map(|v| v.norm() / v_base).collect();
        log::trace!("|V|: {}", format_f64_vec(&vm));
        Ok(vm)
    }
}
