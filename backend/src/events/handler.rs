//! Scenario execution
//!
//! This module handles:
//! - Ordering scheduled events by timestamp
//! - Driving the in-memory loans alongside the loan manager
//! - Logging each executed event
//! - Summarizing the portfolio in a [`ScenarioReport`]

use crate::collaborators::{InMemoryGlobals, InMemoryLoan, InMemoryPoolManager, LoanLike};
use crate::events::types::{LoanTerms, Scenario, ScenarioEvent, ScheduledEvent};
use crate::models::event::Event;
use crate::models::payment::PaymentId;
use crate::orchestrator::{
    CallContext, Claim, ClaimedFunds, DefaultOutcome, LoanManager, LoanManagerError,
};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Position of one loan at report time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPosition {
    pub loan_id: String,
    pub payment_id: PaymentId,
    pub principal: u128,
    pub payment_due_date: u64,
    pub linked: bool,
    pub impaired: bool,
}

/// Portfolio summary after a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub timestamp: u64,
    pub events_executed: usize,
    pub payment_counter: PaymentId,
    pub domain_start: u64,
    pub domain_end: u64,
    pub issuance_rate: U256,
    pub principal_out: u128,
    pub accounted_interest: u128,
    pub accrued_interest: u128,
    pub assets_under_management: u128,
    pub unrealized_losses: u128,
    pub loans: Vec<LoanPosition>,
    pub claims: Vec<ClaimedFunds>,
    pub defaults: Vec<DefaultOutcome>,
}

/// Replays a [`Scenario`] against one loan manager
pub struct ScenarioRunner {
    manager: LoanManager,
    globals: InMemoryGlobals,
    pool_manager: InMemoryPoolManager,
    loans: BTreeMap<String, InMemoryLoan>,
    events: Vec<ScheduledEvent>,
    next_event: usize,
    last_timestamp: u64,
    claims: Vec<ClaimedFunds>,
    defaults: Vec<DefaultOutcome>,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario) -> Result<Self, LoanManagerError> {
        let start = scenario.config.start_timestamp;
        let manager = LoanManager::new(scenario.config)?;

        let mut events = scenario.events;
        events.sort_by_key(|scheduled| scheduled.timestamp);

        Ok(Self {
            manager,
            globals: scenario.globals,
            pool_manager: scenario.pool_manager,
            loans: BTreeMap::new(),
            events,
            next_event: 0,
            last_timestamp: start,
            claims: Vec::new(),
            defaults: Vec::new(),
        })
    }

    pub fn manager(&self) -> &LoanManager {
        &self.manager
    }

    /// Current state of an in-memory loan
    pub fn loan(&self, loan_id: &str) -> Option<&InMemoryLoan> {
        self.loans.get(loan_id)
    }

    /// Events not executed yet
    pub fn pending(&self) -> usize {
        self.events.len() - self.next_event
    }

    /// Execute every remaining event and report at the last event's time
    pub fn run(&mut self) -> Result<ScenarioReport, LoanManagerError> {
        while self.step()?.is_some() {}
        Ok(self.report(self.last_timestamp))
    }

    /// Execute events scheduled at or before `timestamp`
    ///
    /// Returns the number of events executed.
    pub fn run_until(&mut self, timestamp: u64) -> Result<usize, LoanManagerError> {
        let mut executed = 0;
        while self
            .events
            .get(self.next_event)
            .map(|scheduled| scheduled.timestamp <= timestamp)
            .unwrap_or(false)
        {
            self.step()?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Execute the next event; `None` when the scenario is exhausted
    pub fn step(&mut self) -> Result<Option<u64>, LoanManagerError> {
        let Some(scheduled) = self.events.get(self.next_event).cloned() else {
            return Ok(None);
        };

        self.execute(&scheduled)?;
        self.next_event += 1;
        self.last_timestamp = scheduled.timestamp;

        let details = serde_json::to_value(&scheduled.event)
            .map_err(|e| LoanManagerError::Serialization(format!("Scenario event: {}", e)))?;
        self.manager.log_event(Event::ScenarioEventExecuted {
            timestamp: scheduled.timestamp,
            event_type: scheduled.event.event_type().to_string(),
            details: json!({
                "caller": scheduled.caller,
                "event": details,
            }),
        });

        Ok(Some(scheduled.timestamp))
    }

    /// Summarize the portfolio as of `timestamp`
    pub fn report(&self, timestamp: u64) -> ScenarioReport {
        let state = self.manager.state();
        let loans = state
            .loans()
            .map(|(loan_id, payment_id)| LoanPosition {
                loan_id: loan_id.to_string(),
                payment_id,
                principal: self.loans.get(loan_id).map(|l| l.principal()).unwrap_or(0),
                payment_due_date: state
                    .payment(payment_id)
                    .map(|p| p.payment_due_date)
                    .unwrap_or(0),
                linked: state.sorted_list().contains(payment_id),
                impaired: state.impairment(loan_id).is_some(),
            })
            .collect();

        ScenarioReport {
            timestamp,
            events_executed: self.next_event,
            payment_counter: self.manager.payment_counter(),
            domain_start: self.manager.domain_start(),
            domain_end: self.manager.domain_end(),
            issuance_rate: self.manager.issuance_rate(),
            principal_out: self.manager.principal_out(),
            accounted_interest: self.manager.accounted_interest(),
            accrued_interest: self.manager.accrued_interest(timestamp),
            assets_under_management: self.manager.assets_under_management(timestamp),
            unrealized_losses: self.manager.unrealized_losses(),
            loans,
            claims: self.claims.clone(),
            defaults: self.defaults.clone(),
        }
    }

    // ========================================================================
    // Event Execution
    // ========================================================================

    fn execute(&mut self, scheduled: &ScheduledEvent) -> Result<(), LoanManagerError> {
        let ctx = CallContext::new(
            &scheduled.caller,
            scheduled.timestamp,
            &self.globals,
            &self.pool_manager,
        );

        match &scheduled.event {
            ScenarioEvent::Fund { loan: terms } => {
                let loan = new_loan(&self.loans, terms)?;
                self.manager.fund(&ctx, &loan)?;
                self.loans.insert(terms.id.clone(), loan);
            }

            ScenarioEvent::Migrate { loan: terms } => {
                let mut loan = new_loan(&self.loans, terms)?;
                loan.set_pending_lender(&self.manager.config().pool_id);
                self.manager.add(&ctx, &mut loan)?;
                self.loans.insert(terms.id.clone(), loan);
            }

            ScenarioEvent::Claim { loan_id } => {
                let loan = tracked_loan(&self.loans, loan_id)?;
                let previous_due_date = loan.next_payment_due_date();

                let mut advanced = loan.clone();
                let paid = advanced.make_payment();
                let next_due = advanced.next_payment_due_date();
                let claim = Claim {
                    principal: paid.principal,
                    interest: paid.interest,
                    previous_due_date,
                    next_due_date: (next_due != 0).then_some(next_due),
                };

                let funds = self.manager.claim(&ctx, &advanced, claim)?;
                self.claims.push(funds);
                if next_due == 0 {
                    self.loans.remove(loan_id);
                } else {
                    self.loans.insert(loan_id.clone(), advanced);
                }
            }

            ScenarioEvent::Refinance {
                loan_id,
                principal_increase,
                interest_per_payment,
                payment_interval,
                refinance_interest,
            } => {
                let mut refinanced = tracked_loan(&self.loans, loan_id)?.clone();
                let increase = u128::from(*principal_increase);
                refinanced.set_principal(refinanced.principal().saturating_add(increase));
                if let Some(interest) = interest_per_payment {
                    refinanced.set_interest_per_payment(u128::from(*interest));
                }
                if let Some(interval) = payment_interval {
                    refinanced.set_payment_interval(*interval);
                }
                refinanced.set_refinance_interest(u128::from(*refinance_interest));
                refinanced.set_next_payment_due_date(
                    scheduled.timestamp.saturating_add(refinanced.payment_interval()),
                );

                self.manager.refinance(&ctx, &refinanced, increase)?;
                self.loans.insert(loan_id.clone(), refinanced);
            }

            ScenarioEvent::Impair { loan_id } => {
                let loan = tracked_loan(&self.loans, loan_id)?;
                self.manager.impair_loan(&ctx, loan)?;
            }

            ScenarioEvent::RemoveImpairment { loan_id } => {
                let loan = tracked_loan(&self.loans, loan_id)?;
                self.manager.remove_loan_impairment(&ctx, loan)?;
            }

            ScenarioEvent::Default { loan_id, recovered } => {
                let loan = tracked_loan(&self.loans, loan_id)?;
                let outcome = self
                    .manager
                    .trigger_default(&ctx, loan, u128::from(*recovered))?;
                self.defaults.push(outcome);
                self.loans.remove(loan_id);
            }

            ScenarioEvent::RemovePayment { payment_id } => {
                self.manager.remove_payment_from_list(&ctx, *payment_id)?;
            }

            ScenarioEvent::UpdateAccounting => {
                self.manager.update_accounting(&ctx)?;
            }
        }

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn new_loan(
    loans: &BTreeMap<String, InMemoryLoan>,
    terms: &LoanTerms,
) -> Result<InMemoryLoan, LoanManagerError> {
    if loans.contains_key(&terms.id) {
        return Err(LoanManagerError::InvalidLoan {
            loan: terms.id.clone(),
            reason: "loan id already used in this scenario".to_string(),
        });
    }

    Ok(InMemoryLoan::with_id(
        terms.id.clone(),
        u128::from(terms.principal),
        terms.payment_interval,
        u128::from(terms.interest_per_payment),
    )
    .with_principal_per_payment(u128::from(terms.principal_per_payment))
    .with_next_payment_due_date(terms.next_payment_due_date))
}

fn tracked_loan<'a>(
    loans: &'a BTreeMap<String, InMemoryLoan>,
    loan_id: &str,
) -> Result<&'a InMemoryLoan, LoanManagerError> {
    loans
        .get(loan_id)
        .ok_or_else(|| LoanManagerError::NotLoan(loan_id.to_string()))
}
