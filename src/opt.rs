use derive_builder::Builder;

/// Default simulated time (hours) of a snapshot solve.
pub const DEFAULT_TIME: f64 = 12496.0;

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Alg {
    /// Current summation backward/forward sweep (radial networks only).
    SUM,
}

/// Solver options.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct SolveOpt {
    // Power flow algorithm.
    pub algorithm: Alg,

    // Termination tolerance on the largest per unit voltage update.
    // Default value is 1e-9.
    pub tolerance: f64,

    // Maximum number of sweeps. Default value is 100.
    pub max_iterations: usize,
}

impl Default for SolveOpt {
    fn default() -> Self {
        Self {
            algorithm: Alg::SUM,
            tolerance: 1e-9,
            max_iterations: 100,
        }
    }
}
