//! Loan Manager Core - pooled-lending accounting engine
//!
//! Tracks outstanding loan payments in a due-date ordered list and accrues
//! their net interest linearly, so the pool's assets under management can be
//! read at any instant without walking the portfolio.
//!
//! # Architecture
//!
//! - **core**: Bounded casting and fixed-point helpers
//! - **models**: Payment records, the sorted list, portfolio state, events
//! - **accounting**: Accrual window settlement and management fee splits
//! - **collaborators**: Loan, pool, pool manager and globals interfaces
//! - **orchestrator**: Lifecycle operations, checkpoints, shared handle
//! - **events**: Scenario replay
//!
//! # Critical Invariants
//!
//! 1. All money values are integer minor units (u128), no floating point
//! 2. `issuance_rate` always equals the sum over linked payments
//! 3. Interest is booked into `accounted_interest` exactly once

// Module declarations
pub mod accounting;
pub mod collaborators;
pub mod core;
pub mod events;
pub mod models;
pub mod orchestrator;

// Re-exports for convenience
pub use accounting::{FeeError, FeeSplit, SettlementOutcome};
pub use core::{BitWidth, CastError, HUNDRED_PERCENT, PRECISION};
pub use events::{Scenario, ScenarioEvent, ScenarioReport, ScenarioRunner, ScheduledEvent};
pub use models::{
    event::{Event, EventLog},
    payment::{ImpairmentInfo, PaymentId, PaymentInfo, SortedPayment},
    sorted_list::SortedPaymentList,
    state::PortfolioState,
};
pub use orchestrator::{
    CallContext, Claim, ClaimedFunds, DefaultOutcome, LoanManager, LoanManagerConfig,
    LoanManagerError, PortfolioSnapshot, SharedLoanManager,
};
