//! External collaborators
//!
//! The loan manager reads loan terms, fee rates and roles from components
//! it does not own. Each is a narrow trait so the engine can be driven by
//! real integrations or by the in-memory implementations in [`memory`].
//!
//! None of these are mutated by the accounting core except the lender
//! handoff on a loan during migration.

pub mod memory;

pub use memory::{InMemoryGlobals, InMemoryLoan, InMemoryPool, InMemoryPoolManager};

use serde::{Deserialize, Serialize};

/// Split of the next payment due on a loan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    /// Principal portion
    pub principal: u128,

    /// Gross interest portion
    pub interest: u128,

    /// Loan-level fees (delegate service fee, platform service fee)
    pub fees: [u128; 2],
}

/// A loan whose payments the manager tracks
pub trait LoanLike {
    /// Stable loan identifier
    fn id(&self) -> &str;

    /// Due date of the next payment, `0` when nothing is scheduled
    fn next_payment_due_date(&self) -> u64;

    /// Seconds between payments
    fn payment_interval(&self) -> u64;

    /// Outstanding principal
    fn principal(&self) -> u128;

    /// Gross interest accrued under prior terms, settled with the next payment
    fn refinance_interest(&self) -> u128;

    /// Breakdown of the next payment
    fn next_payment_breakdown(&self) -> PaymentBreakdown;

    /// Nominate a new lender
    fn set_pending_lender(&mut self, lender: &str);

    /// Complete the lender handoff; `false` if `lender` was not nominated
    fn accept_lender(&mut self, lender: &str) -> bool;
}

/// The pool whose assets the manager accounts for
pub trait PoolLike {
    /// Settlement currency identifier
    fn asset(&self) -> &str;

    /// Pool manager identifier
    fn manager(&self) -> &str;
}

/// Pool manager: delegate identity and delegate fee rate
pub trait PoolManagerLike {
    /// Pool manager identifier
    fn id(&self) -> &str;

    /// Pool delegate identifier
    fn pool_delegate(&self) -> &str;

    /// Delegate management fee rate (ppm)
    fn delegate_management_fee_rate(&self) -> u32;
}

/// Global configuration: platform fee rates and roles
pub trait GlobalsLike {
    /// Platform management fee rate for a pool manager (ppm)
    fn platform_management_fee_rate(&self, pool_manager: &str) -> u32;

    /// Whether `account` may deploy pools
    fn is_pool_deployer(&self, account: &str) -> bool;

    /// Account authorized to migrate pre-existing loans
    fn migration_admin(&self) -> &str;

    /// Protocol governor
    fn governor(&self) -> &str;
}
