//! Format tables and the pixel-level building blocks of reconstruction

pub(crate) mod prediction;
pub(crate) mod transform;
pub mod types;
