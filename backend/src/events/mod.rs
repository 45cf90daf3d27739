//! Scenario replay: timed lifecycle events driven against in-memory loans

pub mod handler;
pub mod types;

pub use handler::{LoanPosition, ScenarioReport, ScenarioRunner};
pub use types::{LoanTerms, Scenario, ScenarioEvent, ScheduledEvent};
