//! Event logging for replay and auditing.
//!
//! Every lifecycle operation records what it changed. Events enable:
//! - Auditing (verify that interest was booked exactly once)
//! - Debugging (understand which settlement moved the window)
//! - Reporting (the CLI prints the log after a scenario run)
//!
//! # Event Types
//!
//! - **List**: payments linked into or unlinked from the due-date list
//! - **Accounting**: issuance parameters, principal out, unrealized losses
//! - **Lifecycle**: funding, migration, claims, refinancing, impairment, default
//! - **Scenario**: a scripted event was executed
//!
//! # Example
//!
//! ```rust
//! use loan_manager_core::models::event::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::PaymentRemoved {
//!     timestamp: 10,
//!     loan_id: "loan-1".to_string(),
//!     payment_id: 3,
//! });
//!
//! assert_eq!(log.events_of_type("PaymentRemoved").len(), 1);
//! ```

use crate::models::payment::PaymentId;
use alloy_primitives::U256;
use serde::Serialize;

/// Loan manager event capturing a state change.
///
/// All events carry the timestamp of the operation that produced them and
/// are logged in the order they occur.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Payment written to the record store and linked into the list
    PaymentAdded {
        timestamp: u64,
        loan_id: String,
        payment_id: PaymentId,
        platform_management_fee_rate: u32,
        delegate_management_fee_rate: u32,
        start_date: u64,
        payment_due_date: u64,
        incoming_net_interest: u128,
        refinance_interest: u128,
        issuance_rate: U256,
    },

    /// Payment cleared from the record store
    PaymentRemoved {
        timestamp: u64,
        loan_id: String,
        payment_id: PaymentId,
    },

    /// Aggregates re-based at a settlement
    IssuanceParamsUpdated {
        timestamp: u64,
        domain_start: u64,
        domain_end: u64,
        issuance_rate: U256,
        accounted_interest: u128,
    },

    /// Outstanding principal changed
    PrincipalOutUpdated { timestamp: u64, principal_out: u128 },

    /// Unrealized losses changed
    UnrealizedLossesUpdated {
        timestamp: u64,
        unrealized_losses: u128,
    },

    /// New loan funded by the pool
    LoanFunded {
        timestamp: u64,
        loan_id: String,
        principal: u128,
    },

    /// Pre-existing loan migrated into the books
    LoanMigrated {
        timestamp: u64,
        loan_id: String,
        principal: u128,
    },

    /// Payment received and split between fund and fee recipients
    ClaimedFundsDistributed {
        timestamp: u64,
        loan_id: String,
        principal: u128,
        net_interest: u128,
        platform_fee: u128,
        delegate_fee: u128,
    },

    /// Loan terms replaced
    LoanRefinanced {
        timestamp: u64,
        loan_id: String,
        principal_increase: u128,
    },

    /// Loan impaired, accrual frozen
    LoanImpaired {
        timestamp: u64,
        loan_id: String,
        principal: u128,
        interest: u128,
        triggered_by_governor: bool,
    },

    /// Impairment reversed, original due date restored
    ImpairmentRemoved {
        timestamp: u64,
        loan_id: String,
        original_due_date: u64,
    },

    /// Loan removed with its loss booked
    DefaultTriggered {
        timestamp: u64,
        loan_id: String,
        principal: u128,
        interest: u128,
        recovered: u128,
        loss: u128,
    },

    /// Scripted scenario event executed
    ScenarioEventExecuted {
        timestamp: u64,
        event_type: String,
        details: serde_json::Value,
    },
}

impl Event {
    /// Get the timestamp when this event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Event::PaymentAdded { timestamp, .. } => *timestamp,
            Event::PaymentRemoved { timestamp, .. } => *timestamp,
            Event::IssuanceParamsUpdated { timestamp, .. } => *timestamp,
            Event::PrincipalOutUpdated { timestamp, .. } => *timestamp,
            Event::UnrealizedLossesUpdated { timestamp, .. } => *timestamp,
            Event::LoanFunded { timestamp, .. } => *timestamp,
            Event::LoanMigrated { timestamp, .. } => *timestamp,
            Event::ClaimedFundsDistributed { timestamp, .. } => *timestamp,
            Event::LoanRefinanced { timestamp, .. } => *timestamp,
            Event::LoanImpaired { timestamp, .. } => *timestamp,
            Event::ImpairmentRemoved { timestamp, .. } => *timestamp,
            Event::DefaultTriggered { timestamp, .. } => *timestamp,
            Event::ScenarioEventExecuted { timestamp, .. } => *timestamp,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::PaymentAdded { .. } => "PaymentAdded",
            Event::PaymentRemoved { .. } => "PaymentRemoved",
            Event::IssuanceParamsUpdated { .. } => "IssuanceParamsUpdated",
            Event::PrincipalOutUpdated { .. } => "PrincipalOutUpdated",
            Event::UnrealizedLossesUpdated { .. } => "UnrealizedLossesUpdated",
            Event::LoanFunded { .. } => "LoanFunded",
            Event::LoanMigrated { .. } => "LoanMigrated",
            Event::ClaimedFundsDistributed { .. } => "ClaimedFundsDistributed",
            Event::LoanRefinanced { .. } => "LoanRefinanced",
            Event::LoanImpaired { .. } => "LoanImpaired",
            Event::ImpairmentRemoved { .. } => "ImpairmentRemoved",
            Event::DefaultTriggered { .. } => "DefaultTriggered",
            Event::ScenarioEventExecuted { .. } => "ScenarioEventExecuted",
        }
    }

    /// Get loan ID if event relates to a specific loan
    pub fn loan_id(&self) -> Option<&str> {
        match self {
            Event::PaymentAdded { loan_id, .. } => Some(loan_id),
            Event::PaymentRemoved { loan_id, .. } => Some(loan_id),
            Event::LoanFunded { loan_id, .. } => Some(loan_id),
            Event::LoanMigrated { loan_id, .. } => Some(loan_id),
            Event::ClaimedFundsDistributed { loan_id, .. } => Some(loan_id),
            Event::LoanRefinanced { loan_id, .. } => Some(loan_id),
            Event::LoanImpaired { loan_id, .. } => Some(loan_id),
            Event::ImpairmentRemoved { loan_id, .. } => Some(loan_id),
            Event::DefaultTriggered { loan_id, .. } => Some(loan_id),
            _ => None,
        }
    }

    /// Get payment ID if event relates to a specific payment
    pub fn payment_id(&self) -> Option<PaymentId> {
        match self {
            Event::PaymentAdded { payment_id, .. } => Some(*payment_id),
            Event::PaymentRemoved { payment_id, .. } => Some(*payment_id),
            _ => None,
        }
    }
}

/// Event log for storing and querying loan manager events.
///
/// This is a simple wrapper around Vec<Event> with convenience methods.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Get the number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events recorded at a specific timestamp
    pub fn events_at(&self, timestamp: u64) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.timestamp() == timestamp)
            .collect()
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific loan
    pub fn events_for_loan(&self, loan_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.loan_id() == Some(loan_id))
            .collect()
    }

    /// Get events for a specific payment
    pub fn events_for_payment(&self, payment_id: PaymentId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.payment_id() == Some(payment_id))
            .collect()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
