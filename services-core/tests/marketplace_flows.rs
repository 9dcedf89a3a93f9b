//! End-to-end marketplace flows
//!
//! Full request/settle lifecycles over a real credits engine: escrow
//! accounting, auto-validation deadlines on virtual time, dispute
//! resolution and the authorization rules of every transition.

use chrono::{DateTime, Duration};
use credits_core::constants::AUTO_VALIDATION_DELAY_SECS;
use credits_core::{
    Address, CreditsEngine, CreditsError, FeeParams, ManualClock, Role, VisibilityId, U256,
};
use services_core::{ExecutionState, ServiceEvent, ServicesEngine, ServicesError};
use std::sync::Arc;

const ADMIN: u8 = 0xAA;
const TREASURY: u8 = 0x77;
const CREDITS_ADDR: u8 = 0xC0;
const SERVICES_ADDR: u8 = 0x5E;
const CHECKER: u8 = 0x0C;
const RESOLVER: u8 = 0x0D;
const CREATOR: u8 = 0x01;
const USER1: u8 = 0x02;
const USER2: u8 = 0x03;

fn addr(b: u8) -> Address {
    Address::repeat_byte(b)
}

fn vid() -> VisibilityId {
    VisibilityId::new("x-V")
}

struct Harness {
    credits: CreditsEngine,
    services: ServicesEngine,
    clock: Arc<ManualClock>,
}

/// Engines wired together: roles granted, creator bound, user1 holding
/// 50 credits of `x-V`.
fn setup() -> Harness {
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    let mut credits = CreditsEngine::new(
        addr(CREDITS_ADDR),
        addr(ADMIN),
        addr(TREASURY),
        FeeParams::default(),
        clock.clone(),
    )
    .unwrap();
    let services = ServicesEngine::new(addr(SERVICES_ADDR), clock.clone()).unwrap();

    let admin = addr(ADMIN);
    credits
        .roles_mut()
        .grant_role(&admin, Role::CreatorsChecker, addr(CHECKER))
        .unwrap();
    credits
        .roles_mut()
        .grant_role(&admin, Role::CreditsTransfer, services.address())
        .unwrap();
    credits
        .roles_mut()
        .grant_role(&admin, Role::DisputeResolver, addr(RESOLVER))
        .unwrap();
    credits
        .set_creator_visibility(addr(CHECKER), &vid(), Some(addr(CREATOR)))
        .unwrap();

    let funds = U256::from(10u64).pow(U256::from(20u64));
    credits.deposit_native(addr(USER1), funds);
    credits
        .buy_credits(addr(USER1), &vid(), U256::from(50u64), None, funds)
        .unwrap();
    assert_eq!(
        credits.credit_balance_of(&vid(), &addr(USER1)),
        U256::from(50u64)
    );

    Harness {
        credits,
        services,
        clock,
    }
}

/// Create the standard ten-credit `x-post` service
fn create_service(h: &mut Harness) -> u64 {
    h.services
        .create_service(
            &h.credits,
            addr(CREATOR),
            "x-post",
            vid(),
            U256::from(10u64),
        )
        .unwrap()
}

fn escrow_balance(h: &Harness) -> U256 {
    h.credits
        .credit_balance_of(&vid(), &h.services.address())
}

// ============================================================
// Service Management
// ============================================================

#[test]
fn test_create_service_requires_creator() {
    let mut h = setup();
    let err = h
        .services
        .create_service(&h.credits, addr(USER1), "x-post", vid(), U256::from(10u64))
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::Credits(CreditsError::InvalidCreator { .. })
    ));
}

#[test]
fn test_service_nonces_are_monotonic() {
    let mut h = setup();
    assert_eq!(create_service(&mut h), 0);
    assert_eq!(create_service(&mut h), 1);
    let service = h.services.get_service(1).unwrap();
    assert!(service.enabled);
    assert_eq!(service.executions_nonce, 0);
}

#[test]
fn test_disabled_service_rejects_request() {
    let mut h = setup();
    let sn = create_service(&mut h);
    h.services
        .update_service(&h.credits, addr(CREATOR), sn, false)
        .unwrap();

    let before = h.credits.credit_balance_of(&vid(), &addr(USER1));
    let err = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap_err();
    assert!(matches!(err, ServicesError::DisabledService { .. }));
    // No credits moved.
    assert_eq!(h.credits.credit_balance_of(&vid(), &addr(USER1)), before);
    assert_eq!(escrow_balance(&h), U256::zero());
}

#[test]
fn test_unknown_service_reads_as_disabled() {
    let mut h = setup();
    let err = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), 42, "req")
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::DisabledService { service_nonce: 42 }
    ));
}

#[test]
fn test_update_service_by_non_creator_rejected() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let err = h
        .services
        .update_service(&h.credits, addr(USER1), sn, false)
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::Credits(CreditsError::InvalidCreator { .. })
    ));
}

// ============================================================
// Happy Path and Escrow Accounting
// ============================================================

#[test]
fn test_request_accept_validate_happy_path() {
    let mut h = setup();
    let sn = create_service(&mut h);

    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    assert_eq!(en, 0);
    assert_eq!(escrow_balance(&h), U256::from(10u64));
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(USER1)),
        U256::from(40u64)
    );
    assert_eq!(
        h.services.get_service_execution(sn, en).state,
        ExecutionState::Requested
    );

    h.services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap();
    assert_eq!(
        h.services.get_service_execution(sn, en).state,
        ExecutionState::Accepted
    );

    h.services
        .validate_service_execution(&mut h.credits, addr(USER1), sn, en)
        .unwrap();
    assert_eq!(escrow_balance(&h), U256::zero());
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(CREATOR)),
        U256::from(10u64)
    );
    assert_eq!(
        h.services.get_service_execution(sn, en).state,
        ExecutionState::Validated
    );
    assert!(h.credits.verify_invariants(&vid()));
}

#[test]
fn test_underfunded_requester_rejected() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let err = h
        .services
        .request_service_execution(&mut h.credits, addr(USER2), sn, "req")
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::Credits(CreditsError::NotEnoughCreditsOwned { .. })
    ));
    assert_eq!(
        h.services.get_service_execution(sn, 0).state,
        ExecutionState::Uninitialized
    );
}

#[test]
fn test_escrow_covers_all_open_executions() {
    let mut h = setup();
    let sn = create_service(&mut h);
    for _ in 0..3 {
        h.services
            .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
            .unwrap();
    }
    h.services
        .cancel_service_execution(&mut h.credits, addr(USER1), sn, 1, "cancel")
        .unwrap();

    let open = U256::from(h.services.open_executions(sn) as u64);
    assert_eq!(open, U256::from(2u64));
    assert!(open * U256::from(10u64) <= escrow_balance(&h));
}

// ============================================================
// Cancellation
// ============================================================

#[test]
fn test_cancel_by_requester_refunds_escrow() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();

    h.services
        .cancel_service_execution(&mut h.credits, addr(USER1), sn, en, "cancel")
        .unwrap();
    assert_eq!(escrow_balance(&h), U256::zero());
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(USER1)),
        U256::from(50u64)
    );
    assert_eq!(
        h.services.get_service_execution(sn, en).state,
        ExecutionState::Refunded
    );
}

#[test]
fn test_cancel_by_creator_refunds_requester() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();

    h.services
        .cancel_service_execution(&mut h.credits, addr(CREATOR), sn, en, "cancel")
        .unwrap();
    // The refund goes to the requester, not the canceling creator.
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(USER1)),
        U256::from(50u64)
    );
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(CREATOR)),
        U256::zero()
    );
}

#[test]
fn test_cancel_by_third_party_rejected() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    let err = h
        .services
        .cancel_service_execution(&mut h.credits, addr(USER2), sn, en, "cancel")
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::UnauthorizedExecutionAction { .. }
    ));
}

// ============================================================
// Validation and Auto-Validation
// ============================================================

#[test]
fn test_only_requester_validates_before_deadline() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    h.services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap();

    let err = h
        .services
        .validate_service_execution(&mut h.credits, addr(USER2), sn, en)
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::UnauthorizedExecutionAction { .. }
    ));
}

#[test]
fn test_auto_validation_after_deadline() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    h.services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap();

    // Exactly at the deadline the window is still closed.
    h.clock
        .advance(Duration::seconds(AUTO_VALIDATION_DELAY_SECS));
    assert!(h
        .services
        .validate_service_execution(&mut h.credits, addr(USER2), sn, en)
        .is_err());

    // One second past it, anyone may settle.
    h.clock.advance(Duration::seconds(1));
    h.services
        .validate_service_execution(&mut h.credits, addr(USER2), sn, en)
        .unwrap();
    assert_eq!(
        h.services.get_service_execution(sn, en).state,
        ExecutionState::Validated
    );
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(CREATOR)),
        U256::from(10u64)
    );
}

// ============================================================
// Disputes
// ============================================================

fn disputed_execution(h: &mut Harness) -> (u64, u64) {
    let sn = create_service(h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    h.services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap();
    h.services
        .dispute_service_execution(addr(USER1), sn, en, "D")
        .unwrap();
    (sn, en)
}

#[test]
fn test_dispute_by_non_requester_rejected() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    h.services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap();
    let err = h
        .services
        .dispute_service_execution(addr(CREATOR), sn, en, "D")
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::UnauthorizedExecutionAction { .. }
    ));
}

#[test]
fn test_resolve_with_refund_restores_requester() {
    let mut h = setup();
    let (sn, en) = disputed_execution(&mut h);

    h.services
        .resolve_service_execution(&mut h.credits, addr(RESOLVER), sn, en, true, "refund")
        .unwrap();
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(USER1)),
        U256::from(50u64)
    );
    assert_eq!(escrow_balance(&h), U256::zero());
    assert_eq!(
        h.services.get_service_execution(sn, en).state,
        ExecutionState::Refunded
    );
}

#[test]
fn test_resolve_without_refund_pays_creator() {
    let mut h = setup();
    let (sn, en) = disputed_execution(&mut h);

    h.services
        .resolve_service_execution(&mut h.credits, addr(RESOLVER), sn, en, false, "keep")
        .unwrap();
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(CREATOR)),
        U256::from(10u64)
    );
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(USER1)),
        U256::from(40u64)
    );
    assert_eq!(
        h.services.get_service_execution(sn, en).state,
        ExecutionState::Validated
    );
}

#[test]
fn test_resolve_requires_dispute_resolver_role() {
    let mut h = setup();
    let (sn, en) = disputed_execution(&mut h);
    let err = h
        .services
        .resolve_service_execution(&mut h.credits, addr(USER2), sn, en, true, "refund")
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::Credits(CreditsError::MissingRole { .. })
    ));
}

// ============================================================
// Terminal States and Invalid Transitions
// ============================================================

#[test]
fn test_terminal_execution_accepts_no_transition() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    h.services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap();
    h.services
        .validate_service_execution(&mut h.credits, addr(USER1), sn, en)
        .unwrap();

    let creator_balance = h.credits.credit_balance_of(&vid(), &addr(CREATOR));
    for result in [
        h.services
            .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp"),
        h.services
            .cancel_service_execution(&mut h.credits, addr(USER1), sn, en, "cancel"),
        h.services
            .validate_service_execution(&mut h.credits, addr(USER1), sn, en),
        h.services
            .dispute_service_execution(addr(USER1), sn, en, "D"),
        h.services
            .resolve_service_execution(&mut h.credits, addr(RESOLVER), sn, en, true, "r"),
    ] {
        assert!(matches!(
            result,
            Err(ServicesError::InvalidExecutionState {
                current: ExecutionState::Validated
            })
        ));
    }
    // Settlement happened exactly once.
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &addr(CREATOR)),
        creator_balance
    );
}

#[test]
fn test_validate_straight_from_requested_rejected() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    let err = h
        .services
        .validate_service_execution(&mut h.credits, addr(USER1), sn, en)
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::InvalidExecutionState {
            current: ExecutionState::Requested
        }
    ));
}

// ============================================================
// Live Creator Lookup
// ============================================================

#[test]
fn test_creator_rebind_moves_authorization() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();

    // Rebind the visibility to a new creator mid-flight.
    let new_creator = addr(0x33);
    h.credits
        .set_creator_visibility(addr(CHECKER), &vid(), Some(new_creator))
        .unwrap();

    let err = h
        .services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap_err();
    assert!(matches!(
        err,
        ServicesError::UnauthorizedExecutionAction { .. }
    ));

    h.services
        .accept_service_execution(&h.credits, new_creator, sn, en, "resp")
        .unwrap();
    h.services
        .validate_service_execution(&mut h.credits, addr(USER1), sn, en)
        .unwrap();
    assert_eq!(
        h.credits.credit_balance_of(&vid(), &new_creator),
        U256::from(10u64)
    );
}

// ============================================================
// Random Lifecycle Properties
// ============================================================

/// One transition attempt in a random execution lifecycle, each issued
/// by its canonical principal
#[derive(Clone, Debug)]
enum LifecycleStep {
    Accept,
    Cancel,
    Validate,
    Dispute,
    Resolve { refund: bool },
    AdvanceDays(u8),
}

fn lifecycle_step() -> impl proptest::strategy::Strategy<Value = LifecycleStep> {
    use proptest::prelude::*;
    prop_oneof![
        Just(LifecycleStep::Accept),
        Just(LifecycleStep::Cancel),
        Just(LifecycleStep::Validate),
        Just(LifecycleStep::Dispute),
        any::<bool>().prop_map(|refund| LifecycleStep::Resolve { refund }),
        (1u8..8).prop_map(LifecycleStep::AdvanceDays),
    ]
}

proptest::proptest! {
    /// Whatever order transitions are attempted in, credits never leak:
    /// requester, creator and escrow always hold exactly the original
    /// fifty credits between them, the escrow covers every open
    /// execution, and a terminal state never changes again.
    #[test]
    fn prop_escrow_conservation_over_random_lifecycles(
        steps in proptest::collection::vec(lifecycle_step(), 1..25)
    ) {
        let mut h = setup();
        let sn = create_service(&mut h);
        let en = h
            .services
            .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
            .unwrap();

        let mut terminal: Option<ExecutionState> = None;
        for step in steps {
            match step {
                LifecycleStep::Accept => {
                    let _ = h
                        .services
                        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "r");
                }
                LifecycleStep::Cancel => {
                    let _ = h
                        .services
                        .cancel_service_execution(&mut h.credits, addr(USER1), sn, en, "c");
                }
                LifecycleStep::Validate => {
                    let _ = h
                        .services
                        .validate_service_execution(&mut h.credits, addr(USER2), sn, en);
                }
                LifecycleStep::Dispute => {
                    let _ = h
                        .services
                        .dispute_service_execution(addr(USER1), sn, en, "d");
                }
                LifecycleStep::Resolve { refund } => {
                    let _ = h.services.resolve_service_execution(
                        &mut h.credits,
                        addr(RESOLVER),
                        sn,
                        en,
                        refund,
                        "r",
                    );
                }
                LifecycleStep::AdvanceDays(days) => {
                    h.clock.advance(Duration::days(days as i64));
                }
            }

            let state = h.services.get_service_execution(sn, en).state;
            if let Some(settled) = terminal {
                proptest::prop_assert_eq!(state, settled);
            } else if state.is_terminal() {
                terminal = Some(state);
            }

            let held = h.credits.credit_balance_of(&vid(), &addr(USER1))
                + h.credits.credit_balance_of(&vid(), &addr(CREATOR))
                + escrow_balance(&h);
            proptest::prop_assert_eq!(held, U256::from(50u64));
            proptest::prop_assert_eq!(
                escrow_balance(&h),
                U256::from(h.services.open_executions(sn) as u64) * U256::from(10u64)
            );
            proptest::prop_assert!(h.credits.verify_invariants(&vid()));
        }
    }
}

// ============================================================
// Event Stream
// ============================================================

#[test]
fn test_lifecycle_event_sequence() {
    let mut h = setup();
    let sn = create_service(&mut h);
    let en = h
        .services
        .request_service_execution(&mut h.credits, addr(USER1), sn, "req")
        .unwrap();
    h.services
        .accept_service_execution(&h.credits, addr(CREATOR), sn, en, "resp")
        .unwrap();
    h.services
        .validate_service_execution(&mut h.credits, addr(USER1), sn, en)
        .unwrap();

    let events = h.services.drain_events();
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], ServiceEvent::ServiceCreated { .. }));
    assert!(matches!(
        &events[1],
        ServiceEvent::ServiceExecutionRequested { requester, request_data, .. }
            if *requester == addr(USER1) && request_data == "req"
    ));
    assert!(matches!(
        &events[2],
        ServiceEvent::ServiceExecutionAccepted { response_data, .. } if response_data == "resp"
    ));
    assert!(matches!(
        events[3],
        ServiceEvent::ServiceExecutionValidated {
            service_nonce,
            execution_nonce,
        } if service_nonce == sn && execution_nonce == en
    ));
}
