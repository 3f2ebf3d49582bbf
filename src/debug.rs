use num_complex::Complex64;
use pretty_dtoa::{dtoa, FmtFloatConfig};

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(9);

pub fn format_f64_vec(v: &[f64]) -> String {
    let a: Vec<String> = v.iter().map(|f| dtoa(*f, FLOAT_CONFIG)).collect();
    format!("[{}]", a.join(", "))
}

fn format_polar(z: &Complex64) -> String {
    format!(
        "{}\u{2220}{}\u{00B0}",
        dtoa(z.norm(), FLOAT_CONFIG),
        dtoa(z.arg().to_degrees(), FLOAT_CONFIG)
    )
}

/// Formats node voltages as `name=|V|∠θ°` pairs, scaled by `base`.
pub fn format_node_voltages(names: &[String], v: &[Complex64], base: f64) -> String {
    let a: Vec<String> = names
        .iter()
        .zip(v)
        .map(|(name, v)| format!("{}={}", name, format_polar(&(v / base))))
        .collect();
    a.join(" ")
}
