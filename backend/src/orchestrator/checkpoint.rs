//! Checkpoint - Save/Load Portfolio State
//!
//! Serializes the persisted layout (payment counter, payment records, list
//! links, aggregates) plus the loan bindings and impairments, so a manager
//! can be restored exactly.
//!
//! # Critical Invariants
//!
//! - **Sorted**: walking `next` from the head visits non-decreasing due dates
//! - **Link Symmetry**: `next.previous == self` for every linked node
//! - **Conservation**: `issuance_rate` equals the sum over linked payments
//! - **Config Matching**: state can only be loaded with a matching config

use crate::models::payment::{ImpairmentInfo, LoanId, PaymentId, PaymentInfo, SortedPayment};
use crate::models::sorted_list::SortedPaymentList;
use crate::models::state::PortfolioState;
use crate::orchestrator::engine::{LoanManager, LoanManagerConfig, LoanManagerError};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete portfolio snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// SHA256 hash of the config the state was produced under
    pub config_hash: String,

    pub payment_counter: PaymentId,

    /// List head (`0` when empty)
    pub payment_with_earliest_due_date: PaymentId,

    pub domain_start: u64,
    pub domain_end: u64,
    pub issuance_rate: U256,
    pub accounted_interest: u128,
    pub principal_out: u128,
    pub unrealized_losses: u128,

    /// Live payment records
    pub payments: Vec<PaymentSnapshot>,

    /// Impaired loans
    #[serde(default)]
    pub impairments: BTreeMap<LoanId, ImpairmentInfo>,
}

/// One live payment record with its owning loan and list node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub payment_id: PaymentId,
    pub loan_id: LoanId,
    pub info: PaymentInfo,

    /// List node, `None` when the payment is not linked
    pub node: Option<SortedPayment>,
}

fn payment_snapshots(state: &PortfolioState) -> Vec<PaymentSnapshot> {
    state
        .loans()
        .filter_map(|(loan_id, payment_id)| {
            state.payment(payment_id).map(|info| PaymentSnapshot {
                payment_id,
                loan_id: loan_id.to_string(),
                info: info.clone(),
                node: state
                    .sorted_list()
                    .contains(payment_id)
                    .then(|| state.sorted_payment(payment_id)),
            })
        })
        .collect()
}

// ============================================================================
// Save / Load
// ============================================================================

impl LoanManager {
    /// Capture the current state
    pub fn snapshot(&self) -> Result<PortfolioSnapshot, LoanManagerError> {
        let state = self.state();

        Ok(PortfolioSnapshot {
            config_hash: compute_config_hash(self.config())?,
            payment_counter: state.payment_counter(),
            payment_with_earliest_due_date: state.payment_with_earliest_due_date(),
            domain_start: state.domain_start(),
            domain_end: state.domain_end(),
            issuance_rate: state.issuance_rate(),
            accounted_interest: state.accounted_interest(),
            principal_out: state.principal_out(),
            unrealized_losses: state.unrealized_losses(),
            payments: payment_snapshots(state),
            impairments: state.impairments.clone(),
        })
    }

    /// Restore a manager from a snapshot taken under `config`
    ///
    /// The event log starts empty.
    pub fn from_snapshot(
        config: LoanManagerConfig,
        snapshot: &PortfolioSnapshot,
    ) -> Result<Self, LoanManagerError> {
        let expected = compute_config_hash(&config)?;
        if expected != snapshot.config_hash {
            return Err(LoanManagerError::StateValidation(format!(
                "Config hash mismatch: expected {}, snapshot has {}",
                expected, snapshot.config_hash
            )));
        }
        validate_snapshot(snapshot)?;

        let mut state = PortfolioState::new(snapshot.domain_start);
        state.payment_counter = snapshot.payment_counter;
        state.domain_end = snapshot.domain_end;
        state.issuance_rate = snapshot.issuance_rate;
        state.accounted_interest = snapshot.accounted_interest;
        state.principal_out = snapshot.principal_out;
        state.unrealized_losses = snapshot.unrealized_losses;
        state.impairments = snapshot.impairments.clone();

        let mut linked = Vec::new();
        for entry in &snapshot.payments {
            let index = entry.payment_id as usize;
            if state.payments.len() <= index {
                state.payments.resize(index + 1, PaymentInfo::default());
            }
            state.payments[index] = entry.info.clone();
            state.payment_id_of.insert(entry.loan_id.clone(), entry.payment_id);
            state.loan_of.insert(entry.payment_id, entry.loan_id.clone());
            if let Some(node) = entry.node {
                linked.push((entry.payment_id, node));
            }
        }
        state.sorted = SortedPaymentList::from_parts(snapshot.payment_with_earliest_due_date, linked);

        Ok(LoanManager::from_parts(config, state))
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Uses canonical JSON serialization with sorted keys.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, LoanManagerError> {
    use serde_json::Value;

    let value = serde_json::to_value(config).map_err(|e| {
        LoanManagerError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        LoanManagerError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

fn invalid(message: String) -> LoanManagerError {
    LoanManagerError::StateValidation(message)
}

/// Validate snapshot integrity
///
/// Checks:
/// - identifiers are non-zero, unique and within `payment_counter`
/// - each loan owns at most one payment
/// - every record has `start_date <= payment_due_date`
/// - the list is acyclic, doubly linked and sorted by due date
/// - every linked node is reachable from the head
/// - `issuance_rate` equals the sum over linked payments
/// - `domain_start <= domain_end`
/// - impairments belong to loans with a live payment
pub fn validate_snapshot(snapshot: &PortfolioSnapshot) -> Result<(), LoanManagerError> {
    // 1. Window
    if snapshot.domain_start > snapshot.domain_end {
        return Err(invalid(format!(
            "domain_start {} is after domain_end {}",
            snapshot.domain_start, snapshot.domain_end
        )));
    }

    // 2. Identifiers and records
    let mut records = BTreeMap::new();
    let mut loans = BTreeSet::new();
    for entry in &snapshot.payments {
        if entry.payment_id == 0 || entry.payment_id > snapshot.payment_counter {
            return Err(invalid(format!(
                "Payment id {} outside 1..={}",
                entry.payment_id, snapshot.payment_counter
            )));
        }
        if records.insert(entry.payment_id, entry).is_some() {
            return Err(invalid(format!("Duplicate payment id {}", entry.payment_id)));
        }
        if !loans.insert(entry.loan_id.as_str()) {
            return Err(invalid(format!("Loan {} owns two payments", entry.loan_id)));
        }
        if entry.info.is_empty() {
            return Err(invalid(format!("Payment {} has an empty record", entry.payment_id)));
        }
        if entry.info.start_date > entry.info.payment_due_date {
            return Err(invalid(format!(
                "Payment {} starts after it is due",
                entry.payment_id
            )));
        }
    }

    // 3. List integrity
    let linked: BTreeMap<PaymentId, SortedPayment> = snapshot
        .payments
        .iter()
        .filter_map(|entry| entry.node.map(|node| (entry.payment_id, node)))
        .collect();

    let mut visited = 0usize;
    let mut previous = 0;
    let mut previous_due = 0;
    let mut current = snapshot.payment_with_earliest_due_date;
    while current != 0 {
        let node = linked.get(&current).ok_or_else(|| {
            invalid(format!("List references unlinked payment {}", current))
        })?;
        if node.previous != previous {
            return Err(invalid(format!(
                "Payment {} links back to {} instead of {}",
                current, node.previous, previous
            )));
        }
        if node.payment_due_date < previous_due {
            return Err(invalid(format!(
                "Payment {} due {} is before its predecessor's {}",
                current, node.payment_due_date, previous_due
            )));
        }
        if records
            .get(&current)
            .map(|entry| entry.info.payment_due_date != node.payment_due_date)
            .unwrap_or(true)
        {
            return Err(invalid(format!(
                "Payment {} due date differs between record and node",
                current
            )));
        }

        visited += 1;
        if visited > linked.len() {
            return Err(invalid("List contains a cycle".to_string()));
        }
        previous = current;
        previous_due = node.payment_due_date;
        current = node.next;
    }
    if visited != linked.len() {
        return Err(invalid(format!(
            "{} linked payments are unreachable from the head",
            linked.len() - visited
        )));
    }

    // 4. Conservation
    let mut expected_rate = U256::ZERO;
    for id in linked.keys() {
        if let Some(entry) = records.get(id) {
            expected_rate = expected_rate.saturating_add(entry.info.issuance_rate);
        }
    }
    if expected_rate != snapshot.issuance_rate {
        return Err(invalid(format!(
            "Issuance rate {} does not match linked payments' sum {}",
            snapshot.issuance_rate, expected_rate
        )));
    }

    // 5. Window end matches the head
    let expected_end = linked
        .get(&snapshot.payment_with_earliest_due_date)
        .map(|node| node.payment_due_date.max(snapshot.domain_start))
        .unwrap_or(snapshot.domain_start);
    if expected_end != snapshot.domain_end {
        return Err(invalid(format!(
            "domain_end {} does not match earliest due date {}",
            snapshot.domain_end, expected_end
        )));
    }

    // 6. Impairments
    for loan_id in snapshot.impairments.keys() {
        if !loans.contains(loan_id.as_str()) {
            return Err(invalid(format!("Impairment for unknown loan {}", loan_id)));
        }
    }

    Ok(())
}
