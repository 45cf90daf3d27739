//! Domain models for the loan manager

pub mod event;
pub mod payment;
pub mod sorted_list;
pub mod state;

// Re-exports
pub use event::{Event, EventLog};
pub use payment::{ImpairmentInfo, LoanId, PaymentId, PaymentInfo, SortedPayment};
pub use sorted_list::SortedPaymentList;
pub use state::PortfolioState;
