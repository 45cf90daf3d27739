//! Lifecycle Tests - fund, migrate, queue, claim, refinance, default, remove
//!
//! Critical invariants tested:
//! - Conservation: issuance_rate equals the sum over linked payments after every operation
//! - No double counting: a claimed payment's interest leaves accounted_interest exactly once
//! - Role gating: each mutator rejects callers without the required role
//! - No partial mutation: failed validation leaves the books untouched

use alloy_primitives::U256;
use loan_manager_core::collaborators::{InMemoryGlobals, InMemoryLoan, InMemoryPoolManager, LoanLike};
use loan_manager_core::orchestrator::{CallContext, Claim, LoanManager, LoanManagerConfig, LoanManagerError};
use loan_manager_core::PRECISION;

const T0: u64 = 1_700_000_000;
const PRINCIPAL: u128 = 1_000_000;

// ============================================================================
// Test Helpers
// ============================================================================

struct Env {
    globals: InMemoryGlobals,
    pool_manager: InMemoryPoolManager,
}

impl Env {
    fn ctx<'a>(&'a self, caller: &'a str, now: u64) -> CallContext<'a> {
        CallContext::new(caller, now, &self.globals, &self.pool_manager)
    }
}

fn setup() -> (Env, LoanManager) {
    let env = Env {
        globals: InMemoryGlobals::new("governor", "admin"),
        pool_manager: InMemoryPoolManager {
            id: "pm".to_string(),
            pool_delegate: "delegate".to_string(),
            delegate_management_fee_rate: 0,
        },
    };
    let manager = LoanManager::new(LoanManagerConfig {
        pool_id: "pool".to_string(),
        asset: "USDC".to_string(),
        pool_manager: "pm".to_string(),
        start_timestamp: T0,
    })
    .unwrap();
    (env, manager)
}

fn assert_conservation(manager: &LoanManager) {
    assert_eq!(
        manager.issuance_rate(),
        manager.state().recompute_issuance_rate()
    );
    assert!(manager.domain_start() <= manager.domain_end());
}

/// 1 unit of interest per second over a 1_000 second interval
fn standard_loan(id: &str) -> InMemoryLoan {
    InMemoryLoan::with_id(id, PRINCIPAL, 1_000, 1_000).with_next_payment_due_date(T0 + 1_000)
}

fn claim_next(loan: &mut InMemoryLoan) -> Claim {
    let previous_due_date = loan.next_payment_due_date();
    let paid = loan.make_payment();
    let next = loan.next_payment_due_date();
    Claim {
        principal: paid.principal,
        interest: paid.interest,
        previous_due_date,
        next_due_date: (next != 0).then_some(next),
    }
}

// ============================================================================
// Fund
// ============================================================================

#[test]
fn test_fund_requires_pool_delegate() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    let ctx = CallContext::new("someone", T0, &env.globals, &env.pool_manager);

    assert_eq!(
        manager.fund(&ctx, &loan),
        Err(LoanManagerError::Unauthorized {
            caller: "someone".to_string(),
            action: "fund loans"
        })
    );
}

#[test]
fn test_fund_rejects_past_or_present_due_date() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1").with_next_payment_due_date(T0);
    let ctx = CallContext::new("delegate", T0, &env.globals, &env.pool_manager);

    assert!(matches!(
        manager.fund(&ctx, &loan),
        Err(LoanManagerError::InvalidLoan { .. })
    ));
    assert_eq!(manager.payment_counter(), 0);
}

#[test]
fn test_fund_links_payment_and_books_principal() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    let ctx = CallContext::new("delegate", T0, &env.globals, &env.pool_manager);

    let id = manager.fund(&ctx, &loan).unwrap();

    assert_eq!(manager.payment_id_of("loan-1"), Some(id));
    assert_eq!(manager.sorted_payment(id).payment_due_date, T0 + 1_000);
    assert_eq!(manager.issuance_rate(), U256::from(PRECISION));
    assert_eq!(manager.assets_under_management(T0 + 500), PRINCIPAL + 500);
    assert_conservation(&manager);
}

// ============================================================================
// Migration
// ============================================================================

#[test]
fn test_add_books_elapsed_interest_and_accepts_lender() {
    let (env, mut manager) = setup();
    // window [T0 - 400, T0 + 600)
    let mut loan = InMemoryLoan::with_id("loan-1", PRINCIPAL, 1_000, 1_000)
        .with_next_payment_due_date(T0 + 600);
    loan.set_pending_lender("pool");

    let ctx = CallContext::new("admin", T0, &env.globals, &env.pool_manager);
    let id = manager.add(&ctx, &mut loan).unwrap();

    assert_eq!(loan.lender(), Some("pool"));
    assert_eq!(manager.payment(id).unwrap().start_date, T0 - 400);
    assert_eq!(manager.accounted_interest(), 400);
    assert_eq!(manager.principal_out(), PRINCIPAL);
    assert_eq!(manager.assets_under_management(T0 + 100), PRINCIPAL + 500);
    assert_eq!(manager.event_log().events_of_type("LoanMigrated").len(), 1);
    assert_conservation(&manager);
}

#[test]
fn test_add_requires_migration_admin() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1");
    loan.set_pending_lender("pool");
    let ctx = CallContext::new("delegate", T0, &env.globals, &env.pool_manager);

    assert!(matches!(
        manager.add(&ctx, &mut loan),
        Err(LoanManagerError::Unauthorized { .. })
    ));
    assert_eq!(loan.lender(), None);
}

#[test]
fn test_add_rejects_due_date_equal_to_now() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1").with_next_payment_due_date(T0);
    loan.set_pending_lender("pool");
    let ctx = CallContext::new("admin", T0, &env.globals, &env.pool_manager);

    assert!(matches!(
        manager.add(&ctx, &mut loan),
        Err(LoanManagerError::InvalidLoan { .. })
    ));
}

#[test]
fn test_add_without_pending_lender_changes_nothing() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1");
    let ctx = CallContext::new("admin", T0, &env.globals, &env.pool_manager);

    assert!(matches!(
        manager.add(&ctx, &mut loan),
        Err(LoanManagerError::InvalidLoan { .. })
    ));
    assert_eq!(manager.payment_counter(), 0);
    assert_eq!(manager.principal_out(), 0);
    assert_eq!(manager.payment_id_of("loan-1"), None);
}

// ============================================================================
// Queue
// ============================================================================

#[test]
fn test_queue_next_payment_validates_window() {
    let (env, mut manager) = setup();
    let loan = InMemoryLoan::with_id("loan-1", PRINCIPAL, 200, 200);
    let ctx = CallContext::new("delegate", T0, &env.globals, &env.pool_manager);

    assert!(matches!(
        manager.queue_next_payment(&ctx, &loan, T0 + 100, T0 + 100),
        Err(LoanManagerError::InvalidLoan { .. })
    ));
    assert!(matches!(
        manager.queue_next_payment(&ctx, &loan, T0 - 200, T0),
        Err(LoanManagerError::InvalidLoan { .. })
    ));

    let id = manager
        .queue_next_payment(&ctx, &loan, T0 - 100, T0 + 100)
        .unwrap();

    assert_eq!(id, 1);
    assert_eq!(manager.accounted_interest(), 100);
    assert_eq!(manager.domain_end(), T0 + 100);
    assert_conservation(&manager);
}

#[test]
fn test_queue_next_payment_rejects_window_opening_later() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    let ctx = env.ctx("delegate", T0);

    assert!(matches!(
        manager.queue_next_payment(&ctx, &loan, T0 + 500, T0 + 1_000),
        Err(LoanManagerError::InvalidLoan { .. })
    ));

    assert_eq!(manager.payment_counter(), 0);
    assert_eq!(manager.payment_id_of("loan-1"), None);
    assert_eq!(manager.issuance_rate(), U256::ZERO);
    assert_eq!(manager.accounted_interest(), 0);
}

#[test]
fn test_queued_payment_interest_leaves_books_once() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1")
        .with_principal_per_payment(PRINCIPAL)
        .with_next_payment_due_date(T0 + 500);

    manager
        .queue_next_payment(&env.ctx("delegate", T0), &loan, T0 - 500, T0 + 500)
        .unwrap();
    assert_eq!(manager.accounted_interest(), 500);
    // interest for the whole window, nothing more
    assert_eq!(manager.assets_under_management(T0 + 500), 1_000);

    let claim = claim_next(&mut loan);
    manager
        .claim(&env.ctx("loan-1", T0 + 500), &loan, claim)
        .unwrap();

    assert_eq!(manager.accounted_interest(), 0);
    assert_eq!(manager.assets_under_management(T0 + 1_000), 0);
    assert_conservation(&manager);
}

#[test]
fn test_payment_ids_are_never_reused() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1").with_principal_per_payment(PRINCIPAL);
    manager
        .fund(&env.ctx("delegate", T0), &loan)
        .unwrap();

    let claim = claim_next(&mut loan);
    manager
        .claim(&env.ctx("loan-1", T0 + 1_000), &loan, claim)
        .unwrap();

    let second = standard_loan("loan-2").with_next_payment_due_date(T0 + 2_000);
    let id = manager.fund(&env.ctx("delegate", T0 + 1_000), &second).unwrap();
    assert_eq!(id, 2);
    assert_eq!(manager.payment_counter(), 2);
}

// ============================================================================
// Claim
// ============================================================================

#[test]
fn test_on_time_claim_rolls_to_next_payment() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    let claim = claim_next(&mut loan);
    let funds = manager
        .claim(&env.ctx("loan-1", T0 + 1_000), &loan, claim)
        .unwrap();

    assert_eq!(funds.net_interest, 1_000);
    assert_eq!(funds.next_payment_id, Some(2));
    assert!(manager.payment(1).is_none());
    assert_eq!(manager.payment_id_of("loan-1"), Some(2));
    assert_eq!(manager.accounted_interest(), 0);
    assert_eq!(manager.domain_end(), T0 + 2_000);
    assert_eq!(manager.assets_under_management(T0 + 1_500), PRINCIPAL + 500);
    assert_conservation(&manager);
}

#[test]
fn test_late_claim_starts_next_window_at_previous_due_date() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    // frozen after the due date
    assert_eq!(manager.assets_under_management(T0 + 1_100), PRINCIPAL + 1_000);

    let claim = claim_next(&mut loan);
    manager
        .claim(&env.ctx("loan-1", T0 + 1_200), &loan, claim)
        .unwrap();

    let next = manager.payment(2).unwrap();
    assert_eq!(next.start_date, T0 + 1_000);
    assert_eq!(manager.accounted_interest(), 200);
    assert_eq!(manager.assets_under_management(T0 + 1_500), PRINCIPAL + 500);
    assert_conservation(&manager);
}

#[test]
fn test_claim_with_next_due_date_already_past_books_it_in_full() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    let claim = claim_next(&mut loan);
    assert_eq!(claim.next_due_date, Some(T0 + 2_000));
    manager
        .claim(&env.ctx("loan-1", T0 + 2_500), &loan, claim)
        .unwrap();

    assert_eq!(manager.payment_id_of("loan-1"), Some(2));
    assert!(!manager.state().sorted_list().contains(2));
    assert_eq!(manager.payment_with_earliest_due_date(), 0);
    assert_eq!(manager.accounted_interest(), 1_000);
    assert_eq!(manager.issuance_rate(), U256::ZERO);
    assert_eq!(manager.assets_under_management(T0 + 3_000), PRINCIPAL + 1_000);

    // paying the overdue one removes exactly what was booked
    let claim = claim_next(&mut loan);
    manager
        .claim(&env.ctx("loan-1", T0 + 2_600), &loan, claim)
        .unwrap();
    let third = manager.payment(3).unwrap();
    assert_eq!(third.start_date, T0 + 2_000);
    assert_eq!(manager.accounted_interest(), 600);
    assert_conservation(&manager);
}

#[test]
fn test_final_claim_closes_loan() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1").with_principal_per_payment(PRINCIPAL);
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    let claim = claim_next(&mut loan);
    assert_eq!(claim.next_due_date, None);
    let funds = manager
        .claim(&env.ctx("loan-1", T0 + 1_000), &loan, claim)
        .unwrap();

    assert_eq!(funds.principal, PRINCIPAL);
    assert_eq!(funds.next_payment_id, None);
    assert_eq!(manager.principal_out(), 0);
    assert_eq!(manager.accounted_interest(), 0);
    assert_eq!(manager.payment_id_of("loan-1"), None);
    assert_eq!(manager.assets_under_management(T0 + 5_000), 0);
}

#[test]
fn test_claim_requires_loan_caller() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    let claim = claim_next(&mut loan);
    assert!(matches!(
        manager.claim(&env.ctx("delegate", T0 + 1_000), &loan, claim),
        Err(LoanManagerError::Unauthorized { .. })
    ));
}

#[test]
fn test_claim_on_unknown_loan() {
    let (env, mut manager) = setup();
    let loan = standard_loan("stranger");

    assert_eq!(
        manager
            .claim(&env.ctx("stranger", T0), &loan, Claim::default()),
        Err(LoanManagerError::NotLoan("stranger".to_string()))
    );
}

#[test]
fn test_claim_rejects_inverted_window() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    let claim = Claim {
        principal: 0,
        interest: 1_000,
        previous_due_date: T0 + 1_000,
        next_due_date: Some(T0 + 900),
    };
    assert_eq!(
        manager.claim(&env.ctx("loan-1", T0 + 1_000), &loan, claim),
        Err(LoanManagerError::InvalidWindow {
            start: T0 + 1_000,
            due: T0 + 900
        })
    );
}

// ============================================================================
// Refinance
// ============================================================================

#[test]
fn test_refinance_replaces_payment_and_carries_interest() {
    let (env, mut manager) = setup();
    let mut loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    loan.set_principal(PRINCIPAL + 500_000);
    loan.set_interest_per_payment(2_000);
    loan.set_refinance_interest(400);
    loan.set_next_payment_due_date(T0 + 1_400);

    let id = manager
        .refinance(&env.ctx("delegate", T0 + 400), &loan, 500_000)
        .unwrap();

    assert_eq!(id, 2);
    assert!(manager.payment(1).is_none());
    assert_eq!(manager.payment(2).unwrap().refinance_interest, 400);
    assert_eq!(manager.principal_out(), PRINCIPAL + 500_000);
    assert_eq!(manager.accounted_interest(), 400);
    assert_eq!(manager.assets_under_management(T0 + 900), PRINCIPAL + 500_000 + 1_400);
    assert_conservation(&manager);
}

#[test]
fn test_refinance_requires_tracked_loan() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");

    assert_eq!(
        manager.refinance(&env.ctx("delegate", T0), &loan, 0),
        Err(LoanManagerError::NotLoan("loan-1".to_string()))
    );
}

// ============================================================================
// Default
// ============================================================================

#[test]
fn test_default_writes_off_principal_and_interest() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    let outcome = manager
        .trigger_default(&env.ctx("delegate", T0 + 500), &loan, 600_000)
        .unwrap();

    assert_eq!(outcome.principal, PRINCIPAL);
    assert_eq!(outcome.interest, 500);
    assert_eq!(outcome.loss, 400_500);
    assert_eq!(outcome.remaining, 0);
    assert_eq!(manager.principal_out(), 0);
    assert_eq!(manager.accounted_interest(), 0);
    assert_eq!(manager.payment_id_of("loan-1"), None);
    assert_conservation(&manager);
}

#[test]
fn test_default_with_excess_recovery() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    let outcome = manager
        .trigger_default(&env.ctx("delegate", T0 + 100), &loan, PRINCIPAL + 1_000)
        .unwrap();

    assert_eq!(outcome.loss, 0);
    assert_eq!(outcome.remaining, 900);
}

#[test]
fn test_default_requires_pool_delegate() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    assert!(matches!(
        manager.trigger_default(&env.ctx("governor", T0 + 1), &loan, 0),
        Err(LoanManagerError::Unauthorized { .. })
    ));
}

// ============================================================================
// Remove from list
// ============================================================================

#[test]
fn test_remove_payment_from_list_stops_accrual() {
    let (env, mut manager) = setup();
    let a = InMemoryLoan::with_id("loan-a", 1_000, 100, 100).with_next_payment_due_date(T0 + 100);
    let b = InMemoryLoan::with_id("loan-b", 1_000, 200, 200).with_next_payment_due_date(T0 + 200);
    manager.fund(&env.ctx("delegate", T0), &a).unwrap();
    manager.fund(&env.ctx("delegate", T0), &b).unwrap();

    assert!(manager
        .remove_payment_from_list(&env.ctx("delegate", T0 + 50), 1)
        .unwrap());

    assert_eq!(manager.payment_with_earliest_due_date(), 2);
    assert_eq!(manager.domain_end(), T0 + 200);
    assert_eq!(manager.payment(1).unwrap().incoming_net_interest, 50);
    assert_eq!(manager.assets_under_management(T0 + 150), 2_000 + 200);
    assert_conservation(&manager);

    // closing loan-a later removes only what it earned
    let mut a = a.with_principal_per_payment(1_000);
    let claim = claim_next(&mut a);
    manager
        .claim(&env.ctx("loan-a", T0 + 150), &a, claim)
        .unwrap();
    assert_eq!(manager.accounted_interest(), 150);
    assert_eq!(manager.principal_out(), 1_000);
}

#[test]
fn test_remove_payment_from_list_is_idempotent() {
    let (env, mut manager) = setup();
    let loan = standard_loan("loan-1");
    manager.fund(&env.ctx("delegate", T0), &loan).unwrap();

    assert!(manager
        .remove_payment_from_list(&env.ctx("delegate", T0 + 10), 1)
        .unwrap());
    let accounted = manager.accounted_interest();

    assert!(!manager
        .remove_payment_from_list(&env.ctx("delegate", T0 + 10), 1)
        .unwrap());
    assert!(!manager
        .remove_payment_from_list(&env.ctx("delegate", T0 + 10), 42)
        .unwrap());
    assert_eq!(manager.accounted_interest(), accounted);
    assert_eq!(manager.issuance_rate(), U256::ZERO);
}

#[test]
fn test_remove_payment_from_list_checks_role_before_lookup() {
    let (env, mut manager) = setup();

    assert!(matches!(
        manager.remove_payment_from_list(&env.ctx("governor", T0), 42),
        Err(LoanManagerError::Unauthorized { .. })
    ));
    assert!(!manager
        .remove_payment_from_list(&env.ctx("delegate", T0), 42)
        .unwrap());
}
