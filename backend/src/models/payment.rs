//! Payment records
//!
//! One record per queued loan payment, keyed by a 24-bit identifier that is
//! assigned from a monotonic counter and never reused.
//!
//! CRITICAL: all money values are u128 minor units, fee rates are parts per
//! million, dates are 48-bit unix timestamps.

use crate::core::cast::{self, CastError};
use crate::core::math;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Payment identifier (24-bit in storage, `0` is the null sentinel)
pub type PaymentId = u32;

/// Loan identifier
pub type LoanId = String;

/// Fee rates, window and interest for one queued payment
///
/// An all-zero record is logically absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    /// Platform share of gross interest (ppm)
    pub platform_management_fee_rate: u32,

    /// Delegate share of gross interest (ppm), already clamped
    pub delegate_management_fee_rate: u32,

    /// Start of the accrual window
    pub start_date: u64,

    /// End of the accrual window (the payment due date)
    pub payment_due_date: u64,

    /// Net interest destined for the fund over the full window
    pub incoming_net_interest: u128,

    /// Net interest carried over from prior terms, booked once
    pub refinance_interest: u128,

    /// Net interest per second, scaled by `PRECISION`
    pub issuance_rate: U256,
}

impl PaymentInfo {
    /// Build a record, deriving issuance rate and narrowing every field
    ///
    /// `incoming_net_interest` is recomputed from the rate so the stored
    /// amount matches what the rate will actually accrue over the window.
    pub fn new(
        platform_management_fee_rate: u32,
        delegate_management_fee_rate: u32,
        start_date: u64,
        payment_due_date: u64,
        net_interest: u128,
        refinance_interest: u128,
    ) -> Result<Self, CastError> {
        let interval = payment_due_date.saturating_sub(start_date);
        let issuance_rate = math::issuance_rate_for(net_interest, interval)?;
        let incoming_net_interest = cast::to_u128(math::interest_over(issuance_rate, interval)?)?;

        Ok(Self {
            platform_management_fee_rate: cast::to_u24(U256::from(platform_management_fee_rate))?,
            delegate_management_fee_rate: cast::to_u24(U256::from(delegate_management_fee_rate))?,
            start_date: cast::check_u48(start_date)?,
            payment_due_date: cast::check_u48(payment_due_date)?,
            incoming_net_interest,
            refinance_interest: cast::to_u128(U256::from(refinance_interest))?,
            issuance_rate,
        })
    }

    /// True when the record has been cleared or never written
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Combined management fee rate (ppm)
    pub fn management_fee_rate(&self) -> u32 {
        self.platform_management_fee_rate + self.delegate_management_fee_rate
    }

    /// Net interest this payment accrues between `start_date` and `until`
    pub fn accrued_until(&self, until: u64) -> Result<u128, CastError> {
        let end = until.min(self.payment_due_date);
        let elapsed = end.saturating_sub(self.start_date);
        cast::to_u128(math::interest_over(self.issuance_rate, elapsed)?)
    }
}

/// Node of the due-date ordered list
///
/// `previous`/`next` are payment identifiers, `0` means no neighbor. The due
/// date is duplicated here so ordering never needs a second lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedPayment {
    pub previous: PaymentId,
    pub next: PaymentId,
    pub payment_due_date: u64,
}

/// Losses booked while a loan is impaired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpairmentInfo {
    /// Principal booked to unrealized losses
    pub principal: u128,

    /// Net interest accrued up to the impairment, booked to unrealized losses
    pub interest: u128,

    /// When the payment's due date was forced to the present
    pub impaired_at: u64,

    /// Due date to restore when the impairment is removed
    pub original_due_date: u64,

    /// Governor impairments can only be removed by the governor
    pub triggered_by_governor: bool,
}

impl ImpairmentInfo {
    /// Total amount held in unrealized losses for this loan
    pub fn unrealized_loss(&self) -> u128 {
        self.principal.saturating_add(self.interest)
    }
}
