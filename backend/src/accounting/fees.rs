//! Management fee splitter
//!
//! Gross interest is shared between the platform, the pool delegate and the
//! fund. Rates are parts per million of gross interest.
//!
//! Policy: the platform rate is authoritative. When platform + delegate
//! exceeds 100%, the delegate rate is clamped to `100% - platform`.
//! Every share truncates toward zero, so the rounding residue stays with
//! the fund and the shares can never sum past the gross amount.

use crate::core::cast;
use crate::core::math::HUNDRED_PERCENT;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from fee computation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("Platform management fee rate {0} exceeds 100%")]
    InvalidFeeRate(u32),
}

/// Result of splitting gross interest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Platform's share of gross interest
    pub platform_share: u128,

    /// Delegate's share of gross interest
    pub delegate_share: u128,

    /// Interest flowing to the fund after fees
    pub net_to_fund: u128,

    /// Platform rate applied (ppm)
    pub platform_rate: u32,

    /// Delegate rate applied after clamping (ppm)
    pub delegate_rate: u32,
}

impl FeeSplit {
    /// Combined management fee rate applied (ppm)
    pub fn management_fee_rate(&self) -> u32 {
        self.platform_rate + self.delegate_rate
    }
}

/// Clamp `delegate_rate` so the combined rate never exceeds 100%
pub fn effective_rates(platform_rate: u32, delegate_rate: u32) -> Result<(u32, u32), FeeError> {
    if platform_rate > HUNDRED_PERCENT {
        return Err(FeeError::InvalidFeeRate(platform_rate));
    }
    let delegate_rate = delegate_rate.min(HUNDRED_PERCENT - platform_rate);
    Ok((platform_rate, delegate_rate))
}

/// Split `gross_interest` between platform, delegate and fund
///
/// # Example
///
/// ```rust
/// use loan_manager_core::accounting::fees::split;
///
/// let result = split(1_000_000, 750_000, 500_000).unwrap();
/// assert_eq!(result.delegate_rate, 250_000);
/// assert_eq!(result.net_to_fund, 0);
/// ```
pub fn split(gross_interest: u128, platform_rate: u32, delegate_rate: u32) -> Result<FeeSplit, FeeError> {
    let (platform_rate, delegate_rate) = effective_rates(platform_rate, delegate_rate)?;

    let platform_share = portion(gross_interest, platform_rate);
    let delegate_share = portion(gross_interest, delegate_rate);
    let net_to_fund = net_interest(gross_interest, platform_rate + delegate_rate);

    Ok(FeeSplit {
        platform_share,
        delegate_share,
        net_to_fund,
        platform_rate,
        delegate_rate,
    })
}

/// Interest left after a combined `management_fee_rate` (ppm)
pub fn net_interest(gross_interest: u128, management_fee_rate: u32) -> u128 {
    portion(
        gross_interest,
        HUNDRED_PERCENT.saturating_sub(management_fee_rate),
    )
}

// gross * rate / 1e6 in the wide domain; rate <= 1e6 keeps it <= gross
fn portion(gross_interest: u128, rate: u32) -> u128 {
    let value = U256::from(gross_interest) * U256::from(rate) / U256::from(HUNDRED_PERCENT);
    cast::saturating_u128(value)
}
