//! Bounded integer casting
//!
//! All accounting arithmetic runs in a 256-bit domain. Values are narrowed
//! only when they are written into a fixed-width record field, and the
//! narrowing fails loudly instead of truncating.
//!
//! # Widths
//!
//! | Width | Used for                                         |
//! |-------|--------------------------------------------------|
//! | 24    | payment identifiers, fee rates (ppm)             |
//! | 48    | timestamps (start/due dates, domain bounds)      |
//! | 112   | principal out                                    |
//! | 128   | interest amounts, unrealized losses              |

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage widths supported by the record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitWidth {
    U24,
    U48,
    U112,
    U128,
}

impl BitWidth {
    /// Number of bits in this width
    pub fn bits(self) -> u32 {
        match self {
            BitWidth::U24 => 24,
            BitWidth::U48 => 48,
            BitWidth::U112 => 112,
            BitWidth::U128 => 128,
        }
    }

    /// Largest value representable at this width (`2^bits - 1`)
    pub fn max_value(self) -> U256 {
        match self {
            BitWidth::U24 => U256::from((1u64 << 24) - 1),
            BitWidth::U48 => U256::from((1u64 << 48) - 1),
            BitWidth::U112 => U256::from((1u128 << 112) - 1),
            BitWidth::U128 => U256::from(u128::MAX),
        }
    }
}

/// Errors raised by narrowing or wide arithmetic
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CastError {
    #[error("Value {value} does not fit in {bits} bits")]
    OutOfBounds { value: U256, bits: u32 },

    #[error("Arithmetic overflow in {context}")]
    Overflow { context: &'static str },
}

/// Narrow `value` to `width`, failing with `OutOfBounds` when it exceeds
/// `2^width - 1`.
///
/// # Example
///
/// ```rust
/// use alloy_primitives::U256;
/// use loan_manager_core::core::cast::{cast_to_width, BitWidth};
///
/// assert!(cast_to_width(U256::from(16_777_215u64), BitWidth::U24).is_ok());
/// assert!(cast_to_width(U256::from(16_777_216u64), BitWidth::U24).is_err());
/// ```
pub fn cast_to_width(value: U256, width: BitWidth) -> Result<U256, CastError> {
    if value > width.max_value() {
        return Err(CastError::OutOfBounds {
            value,
            bits: width.bits(),
        });
    }
    Ok(value)
}

/// Narrow to a 24-bit field
pub fn to_u24(value: U256) -> Result<u32, CastError> {
    let narrowed = cast_to_width(value, BitWidth::U24)?;
    Ok(low_u128(narrowed) as u32)
}

/// Narrow to a 48-bit field
pub fn to_u48(value: U256) -> Result<u64, CastError> {
    let narrowed = cast_to_width(value, BitWidth::U48)?;
    Ok(low_u128(narrowed) as u64)
}

/// Narrow to a 112-bit field
pub fn to_u112(value: U256) -> Result<u128, CastError> {
    let narrowed = cast_to_width(value, BitWidth::U112)?;
    Ok(low_u128(narrowed))
}

/// Narrow to a 128-bit field
pub fn to_u128(value: U256) -> Result<u128, CastError> {
    let narrowed = cast_to_width(value, BitWidth::U128)?;
    Ok(low_u128(narrowed))
}

/// Narrow to 128 bits, clamping at `u128::MAX` instead of failing.
///
/// Only read-only queries use this; mutations always go through the
/// checked helpers.
pub fn saturating_u128(value: U256) -> u128 {
    if value > BitWidth::U128.max_value() {
        u128::MAX
    } else {
        low_u128(value)
    }
}

/// Check a native timestamp fits the 48-bit date fields
pub fn check_u48(value: u64) -> Result<u64, CastError> {
    to_u48(U256::from(value))
}

/// Check a native amount fits the 112-bit principal field
pub fn check_u112(value: u128) -> Result<u128, CastError> {
    to_u112(U256::from(value))
}

fn low_u128(value: U256) -> u128 {
    let limbs = value.as_limbs();
    u128::from(limbs[0]) | (u128::from(limbs[1]) << 64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_for_every_width() {
        for width in [BitWidth::U24, BitWidth::U48, BitWidth::U112, BitWidth::U128] {
            let max = width.max_value();
            assert_eq!(cast_to_width(max, width), Ok(max));

            let over = max.checked_add(U256::from(1u64)).unwrap();
            assert_eq!(
                cast_to_width(over, width),
                Err(CastError::OutOfBounds {
                    value: over,
                    bits: width.bits()
                })
            );
        }
    }

    #[test]
    fn test_typed_helpers_round_values() {
        assert_eq!(to_u24(U256::from(1_000_000u64)), Ok(1_000_000));
        assert_eq!(to_u48(U256::from(1_700_000_000u64)), Ok(1_700_000_000));
        assert_eq!(to_u112(U256::from(5u64)), Ok(5));
        assert_eq!(to_u128(U256::from(u128::MAX)), Ok(u128::MAX));
    }

    #[test]
    fn test_u112_rejects_full_u128() {
        assert!(to_u112(U256::from(u128::MAX)).is_err());
        assert!(check_u112(1u128 << 112).is_err());
        assert_eq!(check_u112((1u128 << 112) - 1), Ok((1u128 << 112) - 1));
    }

    #[test]
    fn test_u48_rejects_large_timestamp() {
        assert!(check_u48(1u64 << 48).is_err());
        assert_eq!(check_u48((1u64 << 48) - 1), Ok((1u64 << 48) - 1));
    }

    #[test]
    fn test_saturating_u128_clamps() {
        assert_eq!(saturating_u128(U256::MAX), u128::MAX);
        assert_eq!(saturating_u128(U256::from(42u64)), 42);
    }
}
