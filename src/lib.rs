mod aggregate;
mod circuit;
mod engine;
mod loadshape;
mod node;
mod output;
mod pipeline;
mod radial;
mod zip;

pub mod debug;
pub mod dss;
pub mod math;
pub mod opt;

#[cfg(test)]
mod tests;

pub use aggregate::*;
pub use circuit::*;
pub use engine::*;
pub use loadshape::*;
pub use node::*;
pub use output::*;
pub use pipeline::*;
pub use radial::Solution;
pub use zip::*;
