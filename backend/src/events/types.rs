//! Scenario event types
//!
//! A scenario replays timed lifecycle events against one loan manager backed
//! by in-memory collaborators.
//!
//! # Design Principles
//!
//! 1. **Ordered**: events execute in timestamp order, ties in file order
//! 2. **Integer money**: amounts are whole minor units
//! 3. **Self-contained**: events carry every term the loan needs
//! 4. **Logged**: every execution is appended to the event log

use crate::collaborators::{InMemoryGlobals, InMemoryPoolManager};
use crate::orchestrator::LoanManagerConfig;
use serde::{Deserialize, Serialize};

/// Terms of an in-memory loan created by a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub id: String,
    pub principal: u64,
    pub payment_interval: u64,
    pub interest_per_payment: u64,
    #[serde(default)]
    pub principal_per_payment: u64,
    pub next_payment_due_date: u64,
}

/// A lifecycle event applied at a scheduled instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Pool delegate funds a new loan
    Fund { loan: LoanTerms },

    /// Migration admin brings an existing loan into the books
    Migrate { loan: LoanTerms },

    /// Borrower makes the next scheduled payment
    Claim { loan_id: String },

    /// Loan terms are replaced; the next payment falls one interval after
    /// the event
    Refinance {
        loan_id: String,
        #[serde(default)]
        principal_increase: u64,
        #[serde(default)]
        interest_per_payment: Option<u64>,
        #[serde(default)]
        payment_interval: Option<u64>,
        #[serde(default)]
        refinance_interest: u64,
    },

    Impair { loan_id: String },

    RemoveImpairment { loan_id: String },

    /// Loan written off after recovering `recovered`
    Default {
        loan_id: String,
        #[serde(default)]
        recovered: u64,
    },

    RemovePayment { payment_id: u32 },

    /// Settle the accrual window with no other change
    UpdateAccounting,
}

impl ScenarioEvent {
    /// Name used in `ScenarioEventExecuted` log entries
    pub fn event_type(&self) -> &'static str {
        match self {
            ScenarioEvent::Fund { .. } => "fund",
            ScenarioEvent::Migrate { .. } => "migrate",
            ScenarioEvent::Claim { .. } => "claim",
            ScenarioEvent::Refinance { .. } => "refinance",
            ScenarioEvent::Impair { .. } => "impair",
            ScenarioEvent::RemoveImpairment { .. } => "remove_impairment",
            ScenarioEvent::Default { .. } => "default",
            ScenarioEvent::RemovePayment { .. } => "remove_payment",
            ScenarioEvent::UpdateAccounting => "update_accounting",
        }
    }
}

/// A scenario event with its execution time and caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub timestamp: u64,
    pub caller: String,
    pub event: ScenarioEvent,
}

/// Complete scenario file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub config: LoanManagerConfig,
    pub globals: InMemoryGlobals,
    pub pool_manager: InMemoryPoolManager,
    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"timestamp": 10, "caller": "pd", "event": {"type": "default", "loan_id": "loan-1"}}"#;
        let scheduled: ScheduledEvent = serde_json::from_str(json).unwrap();

        assert_eq!(scheduled.timestamp, 10);
        assert_eq!(
            scheduled.event,
            ScenarioEvent::Default {
                loan_id: "loan-1".to_string(),
                recovered: 0
            }
        );
        assert_eq!(scheduled.event.event_type(), "default");
    }

    #[test]
    fn test_unit_variant_parses() {
        let event: ScenarioEvent = serde_json::from_str(r#"{"type": "update_accounting"}"#).unwrap();
        assert_eq!(event, ScenarioEvent::UpdateAccounting);
    }
}
