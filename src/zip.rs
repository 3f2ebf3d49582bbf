use num_complex::Complex64;

/// Voltage dependence of a load.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum LoadModel {
    /// Constant active and reactive power.
    ConstantPower = 1,
    /// Constant impedance.
    ConstantImpedance = 2,
    /// Constant current magnitude.
    ConstantCurrent = 5,
}

impl LoadModel {
    /// Maps a DSS `model=` code. Codes without a counterpart are treated as
    /// constant power.
    pub fn from_code(code: usize) -> Self {
        match code {
            1 => LoadModel::ConstantPower,
            2 => LoadModel::ConstantImpedance,
            5 => LoadModel::ConstantCurrent,
            c => {
                log::warn!("load model {} not supported, using constant power", c);
                LoadModel::ConstantPower
            }
        }
    }

    /// Fractions of nominal demand that are constant power, constant
    /// current and constant impedance, respectively.
    pub fn weights(self) -> [f64; 3] {
        match self {
            LoadModel::ConstantPower => [1.0, 0.0, 0.0],
            LoadModel::ConstantCurrent => [0.0, 1.0, 0.0],
            LoadModel::ConstantImpedance => [0.0, 0.0, 1.0],
        }
    }
}

/// Nominal demand of a node split into its ZIP components.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SdZip {
    pub p: Complex64,
    pub i: Complex64,
    pub z: Complex64,
}

impl SdZip {
    pub fn add(&mut self, sd: Complex64, model: LoadModel) {
        let w = model.weights();
        self.p += sd * w[0];
        self.i += sd * w[1];
        self.z += sd * w[2];
    }

    /// Demand at voltage magnitude `vm` relative to nominal.
    pub fn at(&self, vm: f64) -> Complex64 {
        self.p + self.i * vm + self.z * (vm * vm)
    }

    pub fn is_zero(&self) -> bool {
        self.p == Complex64::default()
            && self.i == Complex64::default()
            && self.z == Complex64::default()
    }
}
