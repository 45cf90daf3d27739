//! In-memory collaborators
//!
//! Plain structs implementing the collaborator traits. Used by tests, the
//! scenario runner and the CLI.

use super::{GlobalsLike, LoanLike, PaymentBreakdown, PoolLike, PoolManagerLike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Loan with directly settable terms
///
/// # Example
///
/// ```rust
/// use loan_manager_core::collaborators::{InMemoryLoan, LoanLike};
///
/// let loan = InMemoryLoan::new(1_000_000, 2_592_000, 10_000)
///     .with_next_payment_due_date(1_700_000_000);
/// assert_eq!(loan.principal(), 1_000_000);
/// assert_eq!(loan.next_payment_breakdown().interest, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryLoan {
    id: String,
    principal: u128,
    payment_interval: u64,
    next_payment_due_date: u64,
    interest_per_payment: u128,
    principal_per_payment: u128,
    fees: [u128; 2],
    refinance_interest: u128,
    lender: Option<String>,
    pending_lender: Option<String>,
}

impl InMemoryLoan {
    /// Create a loan with a random (UUID) identifier
    pub fn new(principal: u128, payment_interval: u64, interest_per_payment: u128) -> Self {
        Self::with_id(
            uuid::Uuid::new_v4().to_string(),
            principal,
            payment_interval,
            interest_per_payment,
        )
    }

    /// Create a loan with a fixed identifier
    pub fn with_id(
        id: impl Into<String>,
        principal: u128,
        payment_interval: u64,
        interest_per_payment: u128,
    ) -> Self {
        Self {
            id: id.into(),
            principal,
            payment_interval,
            next_payment_due_date: 0,
            interest_per_payment,
            principal_per_payment: 0,
            fees: [0, 0],
            refinance_interest: 0,
            lender: None,
            pending_lender: None,
        }
    }

    /// Set the next due date (builder pattern)
    pub fn with_next_payment_due_date(mut self, due_date: u64) -> Self {
        self.next_payment_due_date = due_date;
        self
    }

    /// Set the principal repaid with each payment (builder pattern)
    pub fn with_principal_per_payment(mut self, amount: u128) -> Self {
        self.principal_per_payment = amount;
        self
    }

    pub fn set_next_payment_due_date(&mut self, due_date: u64) {
        self.next_payment_due_date = due_date;
    }

    pub fn set_principal(&mut self, principal: u128) {
        self.principal = principal;
    }

    pub fn set_interest_per_payment(&mut self, interest: u128) {
        self.interest_per_payment = interest;
    }

    pub fn set_payment_interval(&mut self, interval: u64) {
        self.payment_interval = interval;
    }

    pub fn set_refinance_interest(&mut self, interest: u128) {
        self.refinance_interest = interest;
    }

    pub fn set_fees(&mut self, fees: [u128; 2]) {
        self.fees = fees;
    }

    /// Current lender, if the handoff completed
    pub fn lender(&self) -> Option<&str> {
        self.lender.as_deref()
    }

    /// Apply a payment: reduce principal, clear refinance interest and move
    /// the due date forward one interval (or to `0` when fully repaid).
    pub fn make_payment(&mut self) -> PaymentBreakdown {
        let breakdown = self.next_payment_breakdown();
        self.principal = self.principal.saturating_sub(breakdown.principal);
        self.refinance_interest = 0;
        self.next_payment_due_date = if self.principal == 0 {
            0
        } else {
            self.next_payment_due_date + self.payment_interval
        };
        breakdown
    }
}

impl LoanLike for InMemoryLoan {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_payment_due_date(&self) -> u64 {
        self.next_payment_due_date
    }

    fn payment_interval(&self) -> u64 {
        self.payment_interval
    }

    fn principal(&self) -> u128 {
        self.principal
    }

    fn refinance_interest(&self) -> u128 {
        self.refinance_interest
    }

    fn next_payment_breakdown(&self) -> PaymentBreakdown {
        PaymentBreakdown {
            principal: self.principal_per_payment.min(self.principal),
            interest: self.interest_per_payment,
            fees: self.fees,
        }
    }

    fn set_pending_lender(&mut self, lender: &str) {
        self.pending_lender = Some(lender.to_string());
    }

    fn accept_lender(&mut self, lender: &str) -> bool {
        if self.pending_lender.as_deref() != Some(lender) {
            return false;
        }
        self.lender = self.pending_lender.take();
        true
    }
}

/// Pool with a fixed asset and manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryPool {
    pub asset: String,
    pub manager: String,
}

impl PoolLike for InMemoryPool {
    fn asset(&self) -> &str {
        &self.asset
    }

    fn manager(&self) -> &str {
        &self.manager
    }
}

/// Pool manager with a settable delegate fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryPoolManager {
    pub id: String,
    pub pool_delegate: String,
    pub delegate_management_fee_rate: u32,
}

impl PoolManagerLike for InMemoryPoolManager {
    fn id(&self) -> &str {
        &self.id
    }

    fn pool_delegate(&self) -> &str {
        &self.pool_delegate
    }

    fn delegate_management_fee_rate(&self) -> u32 {
        self.delegate_management_fee_rate
    }
}

/// Global configuration backed by maps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryGlobals {
    pub governor: String,
    pub migration_admin: String,
    #[serde(default)]
    pub platform_management_fee_rates: BTreeMap<String, u32>,
    #[serde(default)]
    pub pool_deployers: BTreeSet<String>,
}

impl InMemoryGlobals {
    pub fn new(governor: impl Into<String>, migration_admin: impl Into<String>) -> Self {
        Self {
            governor: governor.into(),
            migration_admin: migration_admin.into(),
            ..Self::default()
        }
    }

    /// Set the platform fee for a pool manager (builder pattern)
    pub fn with_platform_fee(mut self, pool_manager: impl Into<String>, rate: u32) -> Self {
        self.platform_management_fee_rates.insert(pool_manager.into(), rate);
        self
    }

    /// Allow an account to deploy pools (builder pattern)
    pub fn with_pool_deployer(mut self, account: impl Into<String>) -> Self {
        self.pool_deployers.insert(account.into());
        self
    }
}

impl GlobalsLike for InMemoryGlobals {
    fn platform_management_fee_rate(&self, pool_manager: &str) -> u32 {
        self.platform_management_fee_rates
            .get(pool_manager)
            .copied()
            .unwrap_or(0)
    }

    fn is_pool_deployer(&self, account: &str) -> bool {
        self.pool_deployers.contains(account)
    }

    fn migration_admin(&self) -> &str {
        &self.migration_admin
    }

    fn governor(&self) -> &str {
        &self.governor
    }
}
