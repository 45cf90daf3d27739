//! Accrual Engine
//!
//! Interest accrues linearly at the aggregate `issuance_rate` over the open
//! window `[domain_start, domain_end)`. Between settlements the accrued
//! amount is derived, never stored:
//!
//! ```text
//! accrued(now) = issuance_rate * (min(now, domain_end) - domain_start) / PRECISION
//! ```
//!
//! Accrual freezes at `domain_end` (the nearest due date). A settlement
//! re-opens the window: payments whose due date has passed are accounted
//! to the end of their window and unlinked, then the remainder is folded
//! into `accounted_interest` and `domain_start` moves to `now`.
//!
//! # Critical Invariants
//!
//! 1. **No double counting**: interest is folded into `accounted_interest` exactly once
//! 2. **Monotonic**: settlement never decreases `accounted_interest`
//! 3. **Atomicity**: a settlement either commits completely or leaves state untouched

use crate::core::cast::{self, CastError};
use crate::core::math;
use crate::models::payment::PaymentId;
use crate::models::state::PortfolioState;
use alloy_primitives::U256;

/// Result of a settlement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementOutcome {
    /// Payments whose due date passed and that were accounted to end
    pub accounted_to_end: Vec<PaymentId>,

    /// Interest folded into `accounted_interest` by this settlement
    pub interest_booked: u128,
}

/// Interest accrued since the last settlement, frozen at `domain_end`
///
/// Read-only and safe to call at any time. Returns zero when `now` is
/// before `domain_start`.
pub fn accrued_interest(state: &PortfolioState, now: u64) -> u128 {
    if state.issuance_rate.is_zero() || now <= state.domain_start {
        return 0;
    }
    let end = now.min(state.domain_end);
    let elapsed = end.saturating_sub(state.domain_start);
    cast::saturating_u128(math::interest_over_saturating(state.issuance_rate, elapsed))
}

/// `principal_out + accounted_interest + accrued(now)`
pub fn assets_under_management(state: &PortfolioState, now: u64) -> u128 {
    state
        .principal_out
        .saturating_add(state.accounted_interest)
        .saturating_add(accrued_interest(state, now))
}

/// Settle aggregates at `now`
///
/// Walks the list from the head while the head's due date is strictly
/// before `now`, booking the aggregate accrual up to each due date and
/// dropping that payment's rate. Then books the accrual up to `now`,
/// moves `domain_start` to `now` and `domain_end` to the new earliest due
/// date (or `domain_start` when nothing is linked).
pub fn advance_accounting(
    state: &mut PortfolioState,
    now: u64,
) -> Result<SettlementOutcome, CastError> {
    let mut booked = U256::ZERO;
    let mut rate = state.issuance_rate;
    let mut domain_start = state.domain_start;
    let mut passed = Vec::new();

    for id in state.sorted.iter() {
        let due = state.sorted.node(id).payment_due_date;
        if due >= now {
            break;
        }

        let elapsed = due.saturating_sub(domain_start);
        booked = math::checked_add(booked, math::interest_over(rate, elapsed)?, "settlement")?;

        let payment_rate = state
            .payment(id)
            .map(|p| p.issuance_rate)
            .unwrap_or(U256::ZERO);
        rate = rate.saturating_sub(payment_rate);
        domain_start = domain_start.max(due);
        passed.push(id);
    }

    let elapsed = now.saturating_sub(domain_start);
    booked = math::checked_add(booked, math::interest_over(rate, elapsed)?, "settlement")?;

    let interest_booked = cast::to_u128(booked)?;
    let accounted_interest = cast::to_u128(math::checked_add(
        U256::from(state.accounted_interest),
        booked,
        "accounted interest",
    )?)?;
    let new_start = cast::check_u48(now.max(state.domain_start))?;

    for id in &passed {
        state.sorted.remove(*id);
    }
    state.issuance_rate = rate;
    state.accounted_interest = accounted_interest;
    state.domain_start = new_start;
    state.domain_end = state.sorted.earliest().unwrap_or(new_start).max(new_start);

    Ok(SettlementOutcome {
        accounted_to_end: passed,
        interest_booked,
    })
}

/// Commit new issuance parameters and re-derive `domain_end`
///
/// `domain_start` must already be settled to the current instant.
pub fn update_issuance_params(state: &mut PortfolioState, issuance_rate: U256, accounted_interest: u128) {
    state.issuance_rate = issuance_rate;
    state.accounted_interest = accounted_interest;
    state.domain_end = state
        .sorted
        .earliest()
        .unwrap_or(state.domain_start)
        .max(state.domain_start);
}
