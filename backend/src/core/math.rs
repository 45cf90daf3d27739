//! Fixed-point constants and wide arithmetic helpers
//!
//! CRITICAL: money is integer minor units (u128), fee rates are parts per
//! million, issuance rates are scaled by `PRECISION`. Nothing here uses
//! floating point.

use crate::core::cast::CastError;
use alloy_primitives::U256;

/// Scale factor applied to issuance rates (1e30)
pub const PRECISION: u128 = 1_000_000_000_000_000_000_000_000_000_000;

/// 100% expressed in parts per million
pub const HUNDRED_PERCENT: u32 = 1_000_000;

/// `PRECISION` in the wide domain
pub fn precision() -> U256 {
    U256::from(PRECISION)
}

/// `a * b / denominator`, truncating, with overflow and zero-division checks
pub fn mul_div(
    a: U256,
    b: U256,
    denominator: U256,
    context: &'static str,
) -> Result<U256, CastError> {
    let product = a.checked_mul(b).ok_or(CastError::Overflow { context })?;
    product
        .checked_div(denominator)
        .ok_or(CastError::Overflow { context })
}

/// Interest produced by `rate` over `elapsed` seconds: `rate * elapsed / PRECISION`
pub fn interest_over(rate: U256, elapsed: u64) -> Result<U256, CastError> {
    mul_div(rate, U256::from(elapsed), precision(), "interest accrual")
}

/// Same as [`interest_over`] but saturating, for read-only queries
pub fn interest_over_saturating(rate: U256, elapsed: u64) -> U256 {
    rate.saturating_mul(U256::from(elapsed)) / precision()
}

/// Issuance rate for `net_interest` spread over `interval` seconds
pub fn issuance_rate_for(net_interest: u128, interval: u64) -> Result<U256, CastError> {
    mul_div(
        U256::from(net_interest),
        precision(),
        U256::from(interval),
        "issuance rate",
    )
}

/// Checked add in the wide domain
pub fn checked_add(a: U256, b: U256, context: &'static str) -> Result<U256, CastError> {
    a.checked_add(b).ok_or(CastError::Overflow { context })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuance_rate_for_reproduces_interest() {
        // 1_000 units over 1_000 seconds => 1 unit/second
        let rate = issuance_rate_for(1_000, 1_000).unwrap();
        assert_eq!(rate, precision());
        assert_eq!(interest_over(rate, 1_000).unwrap(), U256::from(1_000u64));
    }

    #[test]
    fn test_interest_over_truncates() {
        // 0.1 unit per second
        let rate = U256::from(PRECISION / 10);
        assert_eq!(interest_over(rate, 15).unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_mul_div_zero_denominator_is_error() {
        let result = mul_div(U256::from(1u64), U256::from(1u64), U256::ZERO, "test");
        assert_eq!(result, Err(CastError::Overflow { context: "test" }));
    }

    #[test]
    fn test_saturating_interest_never_panics() {
        assert_eq!(
            interest_over_saturating(U256::MAX, u64::MAX),
            U256::MAX / precision()
        );
    }
}
