//! Accounting: linear interest accrual and management fee splitting

pub mod accrual;
pub mod fees;

pub use accrual::{accrued_interest, advance_accounting, assets_under_management, SettlementOutcome};
pub use fees::{split, FeeError, FeeSplit};
