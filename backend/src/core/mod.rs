//! Numeric foundations: bounded casting and fixed-point helpers

pub mod cast;
pub mod math;

pub use cast::{cast_to_width, BitWidth, CastError};
pub use math::{HUNDRED_PERCENT, PRECISION};
