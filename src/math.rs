// Copyright (c) 2022-2024, Richard Lincoln. All rights reserved.

pub const SQRT_3: f64 = 1.732_050_807_568_877_2;

#[macro_export]
macro_rules! cmplx {
    () => {
        num_complex::Complex64::new(0.0, 0.0)
    };
    ($arg1:expr) => {
        num_complex::Complex64::new($arg1, 0.0)
    };
    ($arg1:expr, $arg2:expr) => {
        num_complex::Complex64::new($arg1, $arg2)
    };
}

/// Nominal angle (degrees) of a phase conductor in a positive sequence
/// system whose phase 1 sits at `angle`.
pub fn phase_angle(angle: f64, phase: u8) -> f64 {
    angle - 120.0 * f64::from(phase.saturating_sub(1))
}
