//! Loan Manager Engine
//!
//! Lifecycle operations over one [`PortfolioState`]. Every mutation follows
//! the same sequence:
//!
//! ```text
//! 1. Check the caller's role and the clock
//! 2. Validate the loan and pre-compute narrowed payment values
//! 3. Settle the accrual window at `now`
//! 4. Remove the loan's previous footprint (rate, booked interest, losses)
//! 5. Write and link the new payment record
//! 6. Re-derive domain_end from the new earliest due date
//! 7. Log events
//! ```
//!
//! Validation happens before step 3. After settlement, every fallible value
//! is computed before the first write, so a failing operation leaves at most
//! a settled window behind (economically identical to the pre-call state).
//!
//! # Payment states
//!
//! | Record | Linked | Impairment | Meaning                                      |
//! |--------|--------|------------|----------------------------------------------|
//! | yes    | yes    | no         | accruing                                     |
//! | yes    | no     | no         | accounted to end (due date passed)           |
//! | yes    | no     | yes        | impaired, accrual frozen at `impaired_at`    |
//! | no     | -      | -          | paid, refinanced away or defaulted           |
//!
//! # Example
//!
//! ```rust
//! use loan_manager_core::collaborators::{InMemoryGlobals, InMemoryLoan, InMemoryPoolManager};
//! use loan_manager_core::orchestrator::{CallContext, LoanManager, LoanManagerConfig};
//!
//! let globals = InMemoryGlobals::new("governor", "migration-admin");
//! let pool_manager = InMemoryPoolManager {
//!     id: "pool-manager".to_string(),
//!     pool_delegate: "delegate".to_string(),
//!     delegate_management_fee_rate: 0,
//! };
//! let config = LoanManagerConfig {
//!     pool_id: "pool".to_string(),
//!     asset: "USDC".to_string(),
//!     pool_manager: "pool-manager".to_string(),
//!     start_timestamp: 1_000,
//! };
//! let mut manager = LoanManager::new(config).unwrap();
//!
//! let loan = InMemoryLoan::with_id("loan-1", 1_000_000, 1_000, 10_000)
//!     .with_next_payment_due_date(2_000);
//! let ctx = CallContext::new("delegate", 1_000, &globals, &pool_manager);
//! manager.fund(&ctx, &loan).unwrap();
//!
//! assert_eq!(manager.principal_out(), 1_000_000);
//! assert_eq!(manager.assets_under_management(1_500), 1_005_000);
//! ```

use crate::accounting::accrual::{self, SettlementOutcome};
use crate::accounting::fees::{self, FeeError};
use crate::collaborators::{LoanLike, PoolLike};
use crate::core::cast::{self, CastError};
use crate::core::math;
use crate::models::event::{Event, EventLog};
use crate::models::payment::{ImpairmentInfo, PaymentId, PaymentInfo, SortedPayment};
use crate::models::state::PortfolioState;
use crate::orchestrator::context::CallContext;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Configuration Types
// ============================================================================

/// Static parameters of one loan manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanManagerConfig {
    /// Pool whose assets are accounted for; also the lender identity on loans
    pub pool_id: String,

    /// Settlement currency
    pub asset: String,

    /// Pool manager consulted for the delegate and fee rates
    pub pool_manager: String,

    /// Instant the accrual window first opens
    pub start_timestamp: u64,
}

// ============================================================================
// Errors
// ============================================================================

/// Loan manager errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoanManagerError {
    #[error("Invalid loan {loan}: {reason}")]
    InvalidLoan { loan: String, reason: String },

    #[error("Invalid payment window: start {start}, due {due}")]
    InvalidWindow { start: u64, due: u64 },

    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: String, action: &'static str },

    #[error(transparent)]
    OutOfBounds(#[from] CastError),

    #[error("Management fee rate {0} exceeds 100%")]
    InvalidFeeRate(u32),

    #[error("Loan not managed here: {0}")]
    NotLoan(String),

    #[error("Loan already impaired: {0}")]
    AlreadyImpaired(String),

    #[error("Loan not impaired: {0}")]
    NotImpaired(String),

    #[error("Timestamp {now} precedes the last settlement at {domain_start}")]
    StaleTimestamp { now: u64, domain_start: u64 },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State validation failed: {0}")]
    StateValidation(String),
}

impl From<FeeError> for LoanManagerError {
    fn from(error: FeeError) -> Self {
        match error {
            FeeError::InvalidFeeRate(rate) => LoanManagerError::InvalidFeeRate(rate),
        }
    }
}

// ============================================================================
// Operation inputs and outputs
// ============================================================================

/// A payment made on a loan, as reported by the loan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Principal repaid
    pub principal: u128,

    /// Gross interest paid
    pub interest: u128,

    /// Due date of the payment just made
    pub previous_due_date: u64,

    /// Due date of the following payment, `None` when the loan is closed
    pub next_due_date: Option<u64>,
}

/// How a claimed payment is distributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedFunds {
    pub loan_id: String,
    pub principal: u128,
    pub gross_interest: u128,
    pub net_interest: u128,
    pub platform_fee: u128,
    pub delegate_fee: u128,
    /// Identifier of the next queued payment, if any
    pub next_payment_id: Option<PaymentId>,
}

/// Result of writing a loan off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultOutcome {
    pub loan_id: String,
    /// Principal removed from `principal_out`
    pub principal: u128,
    /// Net interest removed from the books
    pub interest: u128,
    pub recovered: u128,
    /// `principal + interest - recovered`, floored at zero
    pub loss: u128,
    /// `recovered - (principal + interest)`, floored at zero
    pub remaining: u128,
}

/// Payment values computed ahead of any write
#[derive(Debug, Clone)]
struct PreparedPayment {
    info: PaymentInfo,
    /// Interest booked immediately: refinance interest plus `[start, now)`
    booked: u128,
}

/// Everything a payment currently contributes to the aggregates
#[derive(Debug, Clone)]
struct Footprint {
    payment_id: PaymentId,
    linked: bool,
    issuance_rate: U256,
    interest: u128,
    impairment: Option<ImpairmentInfo>,
}

// ============================================================================
// Loan Manager
// ============================================================================

/// Accounting core of one pool
pub struct LoanManager {
    config: LoanManagerConfig,
    state: PortfolioState,
    event_log: EventLog,
}

impl LoanManager {
    /// Create a manager with an empty portfolio
    pub fn new(config: LoanManagerConfig) -> Result<Self, LoanManagerError> {
        Self::validate_config(&config)?;
        let state = PortfolioState::new(config.start_timestamp);

        Ok(Self {
            config,
            state,
            event_log: EventLog::new(),
        })
    }

    /// Create a manager on behalf of a pool deployer
    pub fn deploy(
        config: LoanManagerConfig,
        pool: &dyn PoolLike,
        ctx: &CallContext,
    ) -> Result<Self, LoanManagerError> {
        Self::require(ctx, ctx.is_pool_deployer(), "deploy loan managers")?;

        if pool.asset() != config.asset {
            return Err(LoanManagerError::InvalidConfig(format!(
                "pool asset {} does not match configured asset {}",
                pool.asset(),
                config.asset
            )));
        }
        if pool.manager() != config.pool_manager || ctx.pool_manager.id() != config.pool_manager {
            return Err(LoanManagerError::InvalidConfig(format!(
                "pool manager mismatch: configured {}",
                config.pool_manager
            )));
        }

        Self::new(config)
    }

    /// Reassemble a manager from restored state (checkpoint load)
    pub(crate) fn from_parts(config: LoanManagerConfig, state: PortfolioState) -> Self {
        Self {
            config,
            state,
            event_log: EventLog::new(),
        }
    }

    fn validate_config(config: &LoanManagerConfig) -> Result<(), LoanManagerError> {
        if config.pool_id.is_empty() {
            return Err(LoanManagerError::InvalidConfig(
                "pool_id must not be empty".to_string(),
            ));
        }

        if config.asset.is_empty() {
            return Err(LoanManagerError::InvalidConfig(
                "asset must not be empty".to_string(),
            ));
        }

        if config.pool_manager.is_empty() {
            return Err(LoanManagerError::InvalidConfig(
                "pool_manager must not be empty".to_string(),
            ));
        }

        cast::check_u48(config.start_timestamp).map_err(|_| {
            LoanManagerError::InvalidConfig(format!(
                "start_timestamp {} does not fit in 48 bits",
                config.start_timestamp
            ))
        })?;

        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &LoanManagerConfig {
        &self.config
    }

    /// Read-only view of the portfolio
    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn event_count(&self) -> usize {
        self.event_log.len()
    }

    pub(crate) fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }

    pub fn payment_counter(&self) -> PaymentId {
        self.state.payment_counter()
    }

    pub fn payment_with_earliest_due_date(&self) -> PaymentId {
        self.state.payment_with_earliest_due_date()
    }

    pub fn domain_start(&self) -> u64 {
        self.state.domain_start()
    }

    pub fn domain_end(&self) -> u64 {
        self.state.domain_end()
    }

    pub fn issuance_rate(&self) -> U256 {
        self.state.issuance_rate()
    }

    pub fn accounted_interest(&self) -> u128 {
        self.state.accounted_interest()
    }

    pub fn principal_out(&self) -> u128 {
        self.state.principal_out()
    }

    pub fn unrealized_losses(&self) -> u128 {
        self.state.unrealized_losses()
    }

    /// Interest accrued since the last settlement
    pub fn accrued_interest(&self, now: u64) -> u128 {
        accrual::accrued_interest(&self.state, now)
    }

    /// `principal_out + accounted_interest + accrued_interest(now)`
    pub fn assets_under_management(&self, now: u64) -> u128 {
        accrual::assets_under_management(&self.state, now)
    }

    pub fn payment_id_of(&self, loan_id: &str) -> Option<PaymentId> {
        self.state.payment_id_of(loan_id)
    }

    pub fn payment(&self, payment_id: PaymentId) -> Option<&PaymentInfo> {
        self.state.payment(payment_id)
    }

    pub fn sorted_payment(&self, payment_id: PaymentId) -> SortedPayment {
        self.state.sorted_payment(payment_id)
    }

    pub fn impairment(&self, loan_id: &str) -> Option<&ImpairmentInfo> {
        self.state.impairment(loan_id)
    }

    pub fn is_impaired(&self, loan_id: &str) -> bool {
        self.state.impairment(loan_id).is_some()
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Queue a payment for an already-funded loan that has none outstanding
    ///
    /// Fails with `InvalidLoan` when `due <= start`, `due <= now` or
    /// `start > now`.
    pub fn queue_next_payment(
        &mut self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
        start: u64,
        due: u64,
    ) -> Result<PaymentId, LoanManagerError> {
        Self::require(ctx, ctx.is_pool_delegate(), "queue payments")?;
        let now = self.check_clock(ctx)?;
        self.require_untracked(loan)?;
        Self::require_future_due_date(loan, due, now)?;

        let prepared = self.prepare_payment(ctx, loan, start, due)?;

        self.settle(now)?;
        let payment_id = self.commit_payment(loan.id(), prepared, now)?;
        self.commit_aggregates(now);

        Ok(payment_id)
    }

    /// Fund a new loan: book its principal and queue its first payment
    /// starting now
    pub fn fund(
        &mut self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
    ) -> Result<PaymentId, LoanManagerError> {
        Self::require(ctx, ctx.is_pool_delegate(), "fund loans")?;
        let now = self.check_clock(ctx)?;
        self.require_untracked(loan)?;

        let principal = loan.principal();
        if principal == 0 {
            return Err(LoanManagerError::InvalidLoan {
                loan: loan.id().to_string(),
                reason: "no principal to fund".to_string(),
            });
        }
        let due = loan.next_payment_due_date();
        Self::require_future_due_date(loan, due, now)?;

        let prepared = self.prepare_payment(ctx, loan, now, due)?;
        let principal_out = self.increased_principal(principal)?;

        self.settle(now)?;
        let payment_id = self.commit_payment(loan.id(), prepared, now)?;
        self.set_principal_out(principal_out, now);
        self.event_log.log(Event::LoanFunded {
            timestamp: now,
            loan_id: loan.id().to_string(),
            principal,
        });
        self.commit_aggregates(now);

        Ok(payment_id)
    }

    /// Migrate a pre-existing loan into the books without disbursing funds
    ///
    /// The payment window is `[due - payment_interval, due)`; interest for
    /// the part already elapsed is booked immediately. Completes the lender
    /// handoff to this pool.
    pub fn add(
        &mut self,
        ctx: &CallContext,
        loan: &mut dyn LoanLike,
    ) -> Result<PaymentId, LoanManagerError> {
        Self::require(ctx, ctx.is_migration_admin(), "migrate loans")?;
        let now = self.check_clock(ctx)?;
        self.require_untracked(&*loan)?;

        let due = loan.next_payment_due_date();
        Self::require_future_due_date(&*loan, due, now)?;

        let start = due
            .checked_sub(loan.payment_interval())
            .ok_or_else(|| LoanManagerError::InvalidLoan {
                loan: loan.id().to_string(),
                reason: "payment interval exceeds next due date".to_string(),
            })?;

        let prepared = self.prepare_payment(ctx, &*loan, start, due)?;
        let principal = loan.principal();
        let principal_out = self.increased_principal(principal)?;
        self.check_capacity(&prepared)?;

        self.settle(now)?;
        if !loan.accept_lender(&self.config.pool_id) {
            return Err(LoanManagerError::InvalidLoan {
                loan: loan.id().to_string(),
                reason: format!("lender handoff to {} is not pending", self.config.pool_id),
            });
        }

        let loan_id = loan.id().to_string();
        let payment_id = self.commit_payment(&loan_id, prepared, now)?;
        self.set_principal_out(principal_out, now);
        self.event_log.log(Event::LoanMigrated {
            timestamp: now,
            loan_id,
            principal,
        });
        self.commit_aggregates(now);

        Ok(payment_id)
    }

    /// Record a payment made on a loan and queue the next one
    ///
    /// Only the loan itself reports its payments. The next payment's window
    /// starts at `min(previous_due_date, now)`; when its due date has also
    /// passed it is booked in full and left unlinked.
    pub fn claim(
        &mut self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
        claim: Claim,
    ) -> Result<ClaimedFunds, LoanManagerError> {
        Self::require(ctx, ctx.caller == loan.id(), "claim payments")?;
        let now = self.check_clock(ctx)?;
        let payment_id = self.existing_payment(loan.id())?;

        let start = claim.previous_due_date.min(now);
        if let Some(next_due) = claim.next_due_date {
            if next_due <= start {
                return Err(LoanManagerError::InvalidWindow {
                    start,
                    due: next_due,
                });
            }
        }

        let (platform_rate, delegate_rate) = self
            .state
            .payment(payment_id)
            .map(|p| (p.platform_management_fee_rate, p.delegate_management_fee_rate))
            .ok_or_else(|| LoanManagerError::NotLoan(loan.id().to_string()))?;
        let split = fees::split(claim.interest, platform_rate, delegate_rate)?;
        let next = match claim.next_due_date {
            Some(due) => Some(self.prepare_payment(ctx, loan, start, due)?),
            None => None,
        };

        self.settle(now)?;
        let footprint = self.footprint_of(loan.id(), now)?;
        if let Some(prepared) = &next {
            self.check_capacity(prepared)?;
        }

        self.drop_footprint(loan.id(), &footprint, now);
        let principal_out = self.state.principal_out.saturating_sub(claim.principal);
        self.set_principal_out(principal_out, now);

        let next_payment_id = match next {
            Some(prepared) => Some(self.commit_payment(loan.id(), prepared, now)?),
            None => None,
        };

        self.event_log.log(Event::ClaimedFundsDistributed {
            timestamp: now,
            loan_id: loan.id().to_string(),
            principal: claim.principal,
            net_interest: split.net_to_fund,
            platform_fee: split.platform_share,
            delegate_fee: split.delegate_share,
        });
        self.commit_aggregates(now);

        Ok(ClaimedFunds {
            loan_id: loan.id().to_string(),
            principal: claim.principal,
            gross_interest: claim.interest,
            net_interest: split.net_to_fund,
            platform_fee: split.platform_share,
            delegate_fee: split.delegate_share,
            next_payment_id,
        })
    }

    /// Replace a loan's terms
    ///
    /// The old payment's booked interest is dropped; whatever the loan
    /// reports as refinance interest is booked (net of fees) with the new
    /// payment, which starts now.
    pub fn refinance(
        &mut self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
        principal_increase: u128,
    ) -> Result<PaymentId, LoanManagerError> {
        Self::require(ctx, ctx.is_pool_delegate(), "refinance loans")?;
        let now = self.check_clock(ctx)?;
        self.existing_payment(loan.id())?;

        let due = loan.next_payment_due_date();
        Self::require_future_due_date(loan, due, now)?;

        let prepared = self.prepare_payment(ctx, loan, now, due)?;
        let principal_out = self.increased_principal(principal_increase)?;

        self.settle(now)?;
        let footprint = self.footprint_of(loan.id(), now)?;
        self.check_capacity(&prepared)?;

        self.drop_footprint(loan.id(), &footprint, now);
        let payment_id = self.commit_payment(loan.id(), prepared, now)?;
        self.set_principal_out(principal_out, now);
        self.event_log.log(Event::LoanRefinanced {
            timestamp: now,
            loan_id: loan.id().to_string(),
            principal_increase,
        });
        self.commit_aggregates(now);

        Ok(payment_id)
    }

    /// Write a loan off after recovering `recovered`
    pub fn trigger_default(
        &mut self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
        recovered: u128,
    ) -> Result<DefaultOutcome, LoanManagerError> {
        Self::require(ctx, ctx.is_pool_delegate(), "trigger defaults")?;
        let now = self.check_clock(ctx)?;
        self.existing_payment(loan.id())?;

        self.settle(now)?;
        let footprint = self.footprint_of(loan.id(), now)?;
        let principal = loan.principal();

        self.drop_footprint(loan.id(), &footprint, now);
        let principal_out = self.state.principal_out.saturating_sub(principal);
        self.set_principal_out(principal_out, now);

        let owed = principal.saturating_add(footprint.interest);
        let outcome = DefaultOutcome {
            loan_id: loan.id().to_string(),
            principal,
            interest: footprint.interest,
            recovered,
            loss: owed.saturating_sub(recovered),
            remaining: recovered.saturating_sub(owed),
        };

        self.event_log.log(Event::DefaultTriggered {
            timestamp: now,
            loan_id: outcome.loan_id.clone(),
            principal,
            interest: outcome.interest,
            recovered,
            loss: outcome.loss,
        });
        self.commit_aggregates(now);

        Ok(outcome)
    }

    /// Freeze a loan's accrual and book its value to unrealized losses
    ///
    /// The payment's due date becomes `now`; the original is kept in the
    /// returned [`ImpairmentInfo`] for restoration.
    pub fn impair_loan(
        &mut self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
    ) -> Result<ImpairmentInfo, LoanManagerError> {
        let by_governor = ctx.is_governor();
        Self::require(ctx, by_governor || ctx.is_pool_delegate(), "impair loans")?;
        let now = self.check_clock(ctx)?;
        let payment_id = self.existing_payment(loan.id())?;
        if self.is_impaired(loan.id()) {
            return Err(LoanManagerError::AlreadyImpaired(loan.id().to_string()));
        }

        self.settle(now)?;

        let payment = self
            .state
            .payment(payment_id)
            .cloned()
            .ok_or_else(|| LoanManagerError::NotLoan(loan.id().to_string()))?;
        let linked = self.state.sorted.contains(payment_id);
        let earned = if linked {
            payment.accrued_until(now)?
        } else {
            payment.incoming_net_interest
        };

        let info = ImpairmentInfo {
            principal: loan.principal(),
            interest: earned.saturating_add(payment.refinance_interest),
            impaired_at: now,
            original_due_date: payment.payment_due_date,
            triggered_by_governor: by_governor,
        };
        let unrealized_losses = self
            .state
            .unrealized_losses
            .checked_add(info.unrealized_loss())
            .ok_or(CastError::Overflow {
                context: "unrealized losses",
            })?;

        if linked {
            self.state.sorted.remove(payment_id);
            self.state.issuance_rate = self.state.issuance_rate.saturating_sub(payment.issuance_rate);
            if let Some(record) = self.state.payment_mut(payment_id) {
                record.payment_due_date = record.payment_due_date.min(now).max(record.start_date);
            }
        }
        self.state
            .impairments
            .insert(loan.id().to_string(), info.clone());
        self.set_unrealized_losses(unrealized_losses, now);

        self.event_log.log(Event::LoanImpaired {
            timestamp: now,
            loan_id: loan.id().to_string(),
            principal: info.principal,
            interest: info.interest,
            triggered_by_governor: by_governor,
        });
        self.commit_aggregates(now);

        Ok(info)
    }

    /// Reverse an impairment and restore the original due date
    ///
    /// Governor impairments can only be removed by the governor. When the
    /// original due date is still ahead the payment is re-linked and the
    /// interest frozen during the impairment is caught up; otherwise it is
    /// accounted to the end of its window.
    pub fn remove_loan_impairment(
        &mut self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
    ) -> Result<(), LoanManagerError> {
        let payment_id = self.existing_payment(loan.id())?;
        let info = self
            .state
            .impairment(loan.id())
            .cloned()
            .ok_or_else(|| LoanManagerError::NotImpaired(loan.id().to_string()))?;
        let allowed = ctx.is_governor() || (!info.triggered_by_governor && ctx.is_pool_delegate());
        Self::require(ctx, allowed, "remove impairments")?;
        let now = self.check_clock(ctx)?;

        self.settle(now)?;

        let mut payment = self
            .state
            .payment(payment_id)
            .cloned()
            .ok_or_else(|| LoanManagerError::NotLoan(loan.id().to_string()))?;
        payment.payment_due_date = info.original_due_date;

        let relink = info.original_due_date > now;
        let earned = if relink {
            payment.accrued_until(now)?
        } else {
            payment.incoming_net_interest
        };
        let catch_up = earned
            .saturating_add(payment.refinance_interest)
            .saturating_sub(info.interest);
        let accounted_interest = self
            .state
            .accounted_interest
            .checked_add(catch_up)
            .ok_or(CastError::Overflow {
                context: "accounted interest",
            })?;
        let issuance_rate = if relink {
            math::checked_add(self.state.issuance_rate, payment.issuance_rate, "issuance rate")?
        } else {
            self.state.issuance_rate
        };

        if let Some(record) = self.state.payment_mut(payment_id) {
            record.payment_due_date = info.original_due_date;
        }
        if relink {
            self.state.sorted.insert(payment_id, info.original_due_date);
        }
        self.state.issuance_rate = issuance_rate;
        self.state.accounted_interest = accounted_interest;
        self.state.impairments.remove(loan.id());
        let unrealized_losses = self.state.unrealized_losses.saturating_sub(info.unrealized_loss());
        self.set_unrealized_losses(unrealized_losses, now);

        self.event_log.log(Event::ImpairmentRemoved {
            timestamp: now,
            loan_id: loan.id().to_string(),
            original_due_date: info.original_due_date,
        });
        self.commit_aggregates(now);

        Ok(())
    }

    /// Take a payment off the due-date list
    ///
    /// Interest stops accruing at `now`; the record is truncated to the
    /// elapsed part of its window so a later claim removes exactly what was
    /// booked. Unknown or already unlinked ids are a successful no-op
    /// (`Ok(false)`). The pool delegate check comes first, so any other
    /// caller gets `Unauthorized` even for an unknown id.
    pub fn remove_payment_from_list(
        &mut self,
        ctx: &CallContext,
        payment_id: PaymentId,
    ) -> Result<bool, LoanManagerError> {
        Self::require(ctx, ctx.is_pool_delegate(), "remove payments")?;
        let now = self.check_clock(ctx)?;
        if !self.state.sorted.contains(payment_id) {
            return Ok(false);
        }

        self.settle(now)?;
        if !self.state.sorted.contains(payment_id) {
            // settlement accounted it to end already
            self.commit_aggregates(now);
            return Ok(false);
        }

        let payment = self.state.payment(payment_id).cloned().ok_or_else(|| {
            LoanManagerError::StateValidation(format!("linked payment {} has no record", payment_id))
        })?;
        let earned = payment.accrued_until(now)?;

        self.state.sorted.remove(payment_id);
        self.state.issuance_rate = self.state.issuance_rate.saturating_sub(payment.issuance_rate);
        if let Some(record) = self.state.payment_mut(payment_id) {
            record.payment_due_date = now.max(record.start_date);
            record.incoming_net_interest = earned;
        }

        self.event_log.log(Event::PaymentRemoved {
            timestamp: now,
            loan_id: self.state.loan_of(payment_id).unwrap_or_default().to_string(),
            payment_id,
        });
        self.commit_aggregates(now);

        Ok(true)
    }

    /// Settle the accrual window at `now` without any other change
    pub fn update_accounting(
        &mut self,
        ctx: &CallContext,
    ) -> Result<SettlementOutcome, LoanManagerError> {
        Self::require(
            ctx,
            ctx.is_pool_delegate() || ctx.is_governor(),
            "update accounting",
        )?;
        let now = self.check_clock(ctx)?;

        let outcome = self.settle(now)?;
        self.commit_aggregates(now);
        Ok(outcome)
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn require(ctx: &CallContext, allowed: bool, action: &'static str) -> Result<(), LoanManagerError> {
        if allowed {
            Ok(())
        } else {
            Err(LoanManagerError::Unauthorized {
                caller: ctx.caller.to_string(),
                action,
            })
        }
    }

    fn check_clock(&self, ctx: &CallContext) -> Result<u64, LoanManagerError> {
        let now = cast::check_u48(ctx.now)?;
        if now < self.state.domain_start {
            return Err(LoanManagerError::StaleTimestamp {
                now,
                domain_start: self.state.domain_start,
            });
        }
        Ok(now)
    }

    fn require_untracked(&self, loan: &dyn LoanLike) -> Result<(), LoanManagerError> {
        if self.state.payment_id_of(loan.id()).is_some() {
            return Err(LoanManagerError::InvalidLoan {
                loan: loan.id().to_string(),
                reason: "loan already has a queued payment".to_string(),
            });
        }
        Ok(())
    }

    fn require_future_due_date(loan: &dyn LoanLike, due: u64, now: u64) -> Result<(), LoanManagerError> {
        if due <= now {
            return Err(LoanManagerError::InvalidLoan {
                loan: loan.id().to_string(),
                reason: format!("payment due date {} is not after {}", due, now),
            });
        }
        Ok(())
    }

    fn existing_payment(&self, loan_id: &str) -> Result<PaymentId, LoanManagerError> {
        self.state
            .payment_id_of(loan_id)
            .ok_or_else(|| LoanManagerError::NotLoan(loan_id.to_string()))
    }

    fn settle(&mut self, now: u64) -> Result<SettlementOutcome, LoanManagerError> {
        Ok(accrual::advance_accounting(&mut self.state, now)?)
    }

    /// Build the record for the loan's next payment over `[start, due)`
    ///
    /// The window must already be open: a linked payment accrues at its
    /// rate from now on, so a later start would book more than its interest.
    fn prepare_payment(
        &self,
        ctx: &CallContext,
        loan: &dyn LoanLike,
        start: u64,
        due: u64,
    ) -> Result<PreparedPayment, LoanManagerError> {
        if due <= start {
            return Err(LoanManagerError::InvalidLoan {
                loan: loan.id().to_string(),
                reason: format!("due date {} does not follow start date {}", due, start),
            });
        }
        if start > ctx.now {
            return Err(LoanManagerError::InvalidLoan {
                loan: loan.id().to_string(),
                reason: format!("payment window opens at {} after now {}", start, ctx.now),
            });
        }

        let (platform_rate, delegate_rate) = fees::effective_rates(
            ctx.globals
                .platform_management_fee_rate(&self.config.pool_manager),
            ctx.pool_manager.delegate_management_fee_rate(),
        )?;
        let management_fee_rate = platform_rate + delegate_rate;

        let breakdown = loan.next_payment_breakdown();
        let net_interest = fees::net_interest(breakdown.interest, management_fee_rate);
        let refinance_interest = fees::net_interest(loan.refinance_interest(), management_fee_rate);

        let info = PaymentInfo::new(
            platform_rate,
            delegate_rate,
            start,
            due,
            net_interest,
            refinance_interest,
        )?;
        let booked = refinance_interest
            .checked_add(info.accrued_until(ctx.now)?)
            .ok_or(CastError::Overflow {
                context: "booked interest",
            })?;

        Ok(PreparedPayment { info, booked })
    }

    /// Fail now if committing `prepared` would overflow the aggregates
    ///
    /// Dropping a footprint only lowers them, so a pass here still holds
    /// after the drop.
    fn check_capacity(&self, prepared: &PreparedPayment) -> Result<(), LoanManagerError> {
        self.state.peek_next_payment_id()?;
        self.state
            .accounted_interest
            .checked_add(prepared.booked)
            .ok_or(CastError::Overflow {
                context: "accounted interest",
            })?;
        math::checked_add(self.state.issuance_rate, prepared.info.issuance_rate, "issuance rate")?;
        Ok(())
    }

    /// Write, link and book a prepared payment
    fn commit_payment(
        &mut self,
        loan_id: &str,
        prepared: PreparedPayment,
        now: u64,
    ) -> Result<PaymentId, LoanManagerError> {
        let due = prepared.info.payment_due_date;
        let link = due > now;

        let accounted_interest = self
            .state
            .accounted_interest
            .checked_add(prepared.booked)
            .ok_or(CastError::Overflow {
                context: "accounted interest",
            })?;
        let issuance_rate = if link {
            math::checked_add(self.state.issuance_rate, prepared.info.issuance_rate, "issuance rate")?
        } else {
            self.state.issuance_rate
        };

        let payment_id = self.state.write_payment(loan_id, prepared.info.clone())?;
        if link {
            self.state.sorted.insert(payment_id, due);
        }
        self.state.issuance_rate = issuance_rate;
        self.state.accounted_interest = accounted_interest;

        let info = prepared.info;
        self.event_log.log(Event::PaymentAdded {
            timestamp: now,
            loan_id: loan_id.to_string(),
            payment_id,
            platform_management_fee_rate: info.platform_management_fee_rate,
            delegate_management_fee_rate: info.delegate_management_fee_rate,
            start_date: info.start_date,
            payment_due_date: info.payment_due_date,
            incoming_net_interest: info.incoming_net_interest,
            refinance_interest: info.refinance_interest,
            issuance_rate: info.issuance_rate,
        });

        Ok(payment_id)
    }

    /// What the loan's current payment contributes, as of a settled `now`
    fn footprint_of(&self, loan_id: &str, now: u64) -> Result<Footprint, LoanManagerError> {
        let payment_id = self.existing_payment(loan_id)?;
        let payment = self
            .state
            .payment(payment_id)
            .ok_or_else(|| LoanManagerError::NotLoan(loan_id.to_string()))?;
        let impairment = self.state.impairment(loan_id).cloned();
        let linked = self.state.sorted.contains(payment_id);

        let interest = match &impairment {
            Some(info) => info.interest,
            None if linked => payment
                .accrued_until(now)?
                .saturating_add(payment.refinance_interest),
            None => payment
                .incoming_net_interest
                .saturating_add(payment.refinance_interest),
        };

        Ok(Footprint {
            payment_id,
            linked,
            issuance_rate: if linked {
                payment.issuance_rate
            } else {
                U256::ZERO
            },
            interest,
            impairment,
        })
    }

    /// Remove a footprint and clear the payment record. Subtractions
    /// saturate at zero.
    fn drop_footprint(&mut self, loan_id: &str, footprint: &Footprint, now: u64) {
        if footprint.linked {
            self.state.sorted.remove(footprint.payment_id);
        }
        self.state.issuance_rate = self.state.issuance_rate.saturating_sub(footprint.issuance_rate);
        self.state.accounted_interest = self.state.accounted_interest.saturating_sub(footprint.interest);

        if let Some(info) = &footprint.impairment {
            self.state.impairments.remove(loan_id);
            let unrealized_losses = self.state.unrealized_losses.saturating_sub(info.unrealized_loss());
            self.set_unrealized_losses(unrealized_losses, now);
        }

        self.state.clear_payment(footprint.payment_id);
        self.event_log.log(Event::PaymentRemoved {
            timestamp: now,
            loan_id: loan_id.to_string(),
            payment_id: footprint.payment_id,
        });
    }

    fn increased_principal(&self, amount: u128) -> Result<u128, LoanManagerError> {
        let total = self
            .state
            .principal_out
            .checked_add(amount)
            .ok_or(CastError::Overflow {
                context: "principal out",
            })?;
        Ok(cast::check_u112(total)?)
    }

    fn set_principal_out(&mut self, principal_out: u128, now: u64) {
        self.state.principal_out = principal_out;
        self.event_log.log(Event::PrincipalOutUpdated {
            timestamp: now,
            principal_out,
        });
    }

    fn set_unrealized_losses(&mut self, unrealized_losses: u128, now: u64) {
        self.state.unrealized_losses = unrealized_losses;
        self.event_log.log(Event::UnrealizedLossesUpdated {
            timestamp: now,
            unrealized_losses,
        });
    }

    /// Re-derive `domain_end` from the list head and log the new parameters
    fn commit_aggregates(&mut self, now: u64) {
        let issuance_rate = self.state.issuance_rate;
        let accounted_interest = self.state.accounted_interest;
        accrual::update_issuance_params(&mut self.state, issuance_rate, accounted_interest);

        self.event_log.log(Event::IssuanceParamsUpdated {
            timestamp: now,
            domain_start: self.state.domain_start,
            domain_end: self.state.domain_end,
            issuance_rate: self.state.issuance_rate,
            accounted_interest: self.state.accounted_interest,
        });
    }
}
