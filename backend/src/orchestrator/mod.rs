//! Orchestrator - lifecycle operations over the portfolio
//!
//! See `engine.rs` for the operations, `checkpoint.rs` for save/load.

pub mod checkpoint;
pub mod context;
pub mod engine;
pub mod shared;

pub use checkpoint::{compute_config_hash, validate_snapshot, PaymentSnapshot, PortfolioSnapshot};
pub use context::CallContext;
pub use engine::{
    Claim, ClaimedFunds, DefaultOutcome, LoanManager, LoanManagerConfig, LoanManagerError,
};
pub use shared::SharedLoanManager;
