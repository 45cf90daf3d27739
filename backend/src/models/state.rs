//! Portfolio State
//!
//! The single owned aggregate behind the loan manager: payment records,
//! the due-date list, the loan-to-payment mapping, impairments, and the
//! accounting scalars. Nothing outside this struct holds references into
//! it; everything is looked up by identifier.
//!
//! # Critical Invariants
//!
//! 1. **Conservation**: `issuance_rate` equals the sum of `issuance_rate` over linked payments
//! 2. **Window**: `domain_start <= domain_end`
//! 3. **Identifier Uniqueness**: identifiers come from `payment_counter` and are never reused
//! 4. **Linked Records Exist**: every id in the sorted list has a non-empty payment record

use crate::core::cast::{self, CastError};
use crate::models::payment::{ImpairmentInfo, LoanId, PaymentId, PaymentInfo, SortedPayment};
use crate::models::sorted_list::SortedPaymentList;
use alloy_primitives::U256;
use std::collections::BTreeMap;

/// Complete accounting state of one loan manager
///
/// # Example
///
/// ```rust
/// use loan_manager_core::PortfolioState;
///
/// let state = PortfolioState::new(1_700_000_000);
/// assert_eq!(state.payment_counter(), 0);
/// assert_eq!(state.payment_with_earliest_due_date(), 0);
/// assert_eq!(state.domain_start(), state.domain_end());
/// ```
#[derive(Debug, Clone)]
pub struct PortfolioState {
    /// Last identifier assigned (next one is `payment_counter + 1`)
    pub(crate) payment_counter: PaymentId,

    /// Payment record arena indexed by identifier; cleared slots are all-zero
    pub(crate) payments: Vec<PaymentInfo>,

    /// Due-date ordered list of accruing payments
    pub(crate) sorted: SortedPaymentList,

    /// Loan → its current payment
    pub(crate) payment_id_of: BTreeMap<LoanId, PaymentId>,

    /// Payment → owning loan (reverse of `payment_id_of`)
    pub(crate) loan_of: BTreeMap<PaymentId, LoanId>,

    /// Loans currently impaired
    pub(crate) impairments: BTreeMap<LoanId, ImpairmentInfo>,

    /// Last settlement instant
    pub(crate) domain_start: u64,

    /// Earliest due date among linked payments (or `domain_start` if none)
    pub(crate) domain_end: u64,

    /// Sum of issuance rates of linked payments
    pub(crate) issuance_rate: U256,

    /// Interest booked as of `domain_start`
    pub(crate) accounted_interest: u128,

    /// Outstanding principal (112-bit)
    pub(crate) principal_out: u128,

    /// Impaired principal and interest pending resolution
    pub(crate) unrealized_losses: u128,
}

impl PortfolioState {
    /// Create an empty portfolio whose window opens (and is closed) at `start`
    pub fn new(start: u64) -> Self {
        Self {
            payment_counter: 0,
            payments: vec![PaymentInfo::default()],
            sorted: SortedPaymentList::new(),
            payment_id_of: BTreeMap::new(),
            loan_of: BTreeMap::new(),
            impairments: BTreeMap::new(),
            domain_start: start,
            domain_end: start,
            issuance_rate: U256::ZERO,
            accounted_interest: 0,
            principal_out: 0,
            unrealized_losses: 0,
        }
    }

    // ========================================================================
    // Aggregate accessors
    // ========================================================================

    pub fn payment_counter(&self) -> PaymentId {
        self.payment_counter
    }

    pub fn payment_with_earliest_due_date(&self) -> PaymentId {
        self.sorted.head()
    }

    pub fn domain_start(&self) -> u64 {
        self.domain_start
    }

    pub fn domain_end(&self) -> u64 {
        self.domain_end
    }

    pub fn issuance_rate(&self) -> U256 {
        self.issuance_rate
    }

    pub fn accounted_interest(&self) -> u128 {
        self.accounted_interest
    }

    pub fn principal_out(&self) -> u128 {
        self.principal_out
    }

    pub fn unrealized_losses(&self) -> u128 {
        self.unrealized_losses
    }

    // ========================================================================
    // Record store
    // ========================================================================

    /// Payment record for `id`, `None` if never written or already cleared
    pub fn payment(&self, id: PaymentId) -> Option<&PaymentInfo> {
        self.payments.get(id as usize).filter(|p| !p.is_empty())
    }

    /// Sorted-list node for `id` (all-zero when not linked)
    pub fn sorted_payment(&self, id: PaymentId) -> SortedPayment {
        self.sorted.node(id)
    }

    /// Due-date ordered list
    pub fn sorted_list(&self) -> &SortedPaymentList {
        &self.sorted
    }

    /// Current payment of `loan_id`
    pub fn payment_id_of(&self, loan_id: &str) -> Option<PaymentId> {
        self.payment_id_of.get(loan_id).copied()
    }

    /// Loan owning payment `id`
    pub fn loan_of(&self, id: PaymentId) -> Option<&str> {
        self.loan_of.get(&id).map(|s| s.as_str())
    }

    /// Impairment booked for `loan_id`
    pub fn impairment(&self, loan_id: &str) -> Option<&ImpairmentInfo> {
        self.impairments.get(loan_id)
    }

    /// All loans with a live payment, in loan-id order
    pub fn loans(&self) -> impl Iterator<Item = (&str, PaymentId)> {
        self.payment_id_of.iter().map(|(loan, id)| (loan.as_str(), *id))
    }

    pub(crate) fn payment_mut(&mut self, id: PaymentId) -> Option<&mut PaymentInfo> {
        self.payments.get_mut(id as usize).filter(|p| !p.is_empty())
    }

    /// Identifier the next write would receive (counter is not advanced)
    pub(crate) fn peek_next_payment_id(&self) -> Result<PaymentId, CastError> {
        cast::to_u24(U256::from(self.payment_counter) + U256::from(1u64))
    }

    /// Store `payment` under a fresh identifier and bind it to `loan_id`
    ///
    /// The record is not linked into the list; callers decide that.
    pub(crate) fn write_payment(
        &mut self,
        loan_id: &str,
        payment: PaymentInfo,
    ) -> Result<PaymentId, CastError> {
        let id = self.peek_next_payment_id()?;
        self.payment_counter = id;

        let index = id as usize;
        if self.payments.len() <= index {
            self.payments.resize(index + 1, PaymentInfo::default());
        }
        self.payments[index] = payment;
        self.payment_id_of.insert(loan_id.to_string(), id);
        self.loan_of.insert(id, loan_id.to_string());
        Ok(id)
    }

    /// Clear the record of `id` and its loan binding
    pub(crate) fn clear_payment(&mut self, id: PaymentId) {
        if let Some(slot) = self.payments.get_mut(id as usize) {
            *slot = PaymentInfo::default();
        }
        if let Some(loan_id) = self.loan_of.remove(&id) {
            if self.payment_id_of.get(&loan_id) == Some(&id) {
                self.payment_id_of.remove(&loan_id);
            }
        }
    }

    /// Sum of issuance rates over linked payments, computed from scratch
    pub fn recompute_issuance_rate(&self) -> U256 {
        self.sorted
            .iter()
            .filter_map(|id| self.payment(id))
            .fold(U256::ZERO, |acc, p| acc.saturating_add(p.issuance_rate))
    }

    /// Due dates from head to tail
    pub fn due_dates(&self) -> Vec<u64> {
        self.sorted
            .iter()
            .map(|id| self.sorted.node(id).payment_due_date)
            .collect()
    }
}
