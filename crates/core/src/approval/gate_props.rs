//! Property-based tests for the approval state machine.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::ApprovalError;
use super::gate::ApprovalGate;
use super::types::{ActionStatus, Actor, ApprovalRequest, ApprovalStatus, ApproverRole};
use crate::ledger::types::SourceType;

fn arb_role() -> impl Strategy<Value = ApproverRole> {
    prop_oneof![
        Just(ApproverRole::Employee),
        Just(ApproverRole::Finance),
        Just(ApproverRole::Manager),
        Just(ApproverRole::Director),
    ]
}

fn arb_request() -> impl Strategy<Value = ApprovalRequest> {
    prop::collection::vec(arb_role(), 1..6).prop_map(|roles| {
        ApprovalGate::open(SourceType::Purchase, 1, Decimal::ONE_HUNDRED, &roles).unwrap()
    })
}

fn actor(role: ApproverRole) -> Actor {
    Actor {
        user_id: Uuid::new_v4(),
        role,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property 6.1: Approving every step in order approves the request exactly at the end.**
    #[test]
    fn prop_in_order_approval(mut request in arb_request()) {
        let total = request.steps.len();
        for idx in 0..total {
            let step = request.active_step().unwrap().clone();
            prop_assert_eq!(step.step_order, i32::try_from(idx + 1).unwrap());

            let approver = actor(step.role);
            let t = ApprovalGate::approve(&request, step.id, &approver, None, Utc::now()).unwrap();
            let last = idx + 1 == total;
            prop_assert_eq!(t.request_status == ApprovalStatus::Approved, last);
            prop_assert_eq!(t.signal.is_some(), last);
            t.apply(&mut request);
        }
        prop_assert!(request.active_step().is_none());
        prop_assert!(request.all_steps_cleared());
    }

    /// **Property 6.2: No step after the active one can be acted on.**
    #[test]
    fn prop_no_skipping(request in arb_request()) {
        for step in request.steps.iter().skip(1) {
            let approver = actor(step.role);
            let result = ApprovalGate::approve(&request, step.id, &approver, None, Utc::now());
            let is_not_active = matches!(result, Err(ApprovalError::StepNotActive { .. }));
            prop_assert!(is_not_active);
        }
    }

    /// **Property 6.3: A rejection at any position closes the request.**
    #[test]
    fn prop_reject_anywhere_closes(
        mut request in arb_request(),
        at in any::<prop::sample::Index>(),
    ) {
        let position = at.index(request.steps.len());
        for _ in 0..position {
            let step = request.active_step().unwrap().clone();
            ApprovalGate::approve(&request, step.id, &actor(step.role), None, Utc::now())
                .unwrap()
                .apply(&mut request);
        }

        let step = request.active_step().unwrap().clone();
        ApprovalGate::reject(&request, step.id, &actor(step.role), "no", Utc::now())
            .unwrap()
            .apply(&mut request);

        prop_assert_eq!(request.status, ApprovalStatus::Rejected);
        let pending_left = request
            .steps
            .iter()
            .filter(|s| s.action.status == ActionStatus::Pending)
            .count();
        prop_assert_eq!(pending_left, request.steps.len() - position - 1);
        let admin = actor(ApproverRole::Admin);
        for step in &request.steps {
            let closed = matches!(
                ApprovalGate::approve(&request, step.id, &admin, None, Utc::now()),
                Err(ApprovalError::RequestClosed { .. })
            );
            prop_assert!(closed);
        }
    }

    /// **Property 6.4: Escalation keeps every original role binding and orders stay dense.**
    #[test]
    fn prop_escalation_preserves_roles(mut request in arb_request()) {
        let base = request.base_roles();
        let step = request.active_step().unwrap().clone();
        prop_assume!(step.role < ApproverRole::Admin);

        let approver = actor(step.role);
        ApprovalGate::escalate(
            &request,
            step.id,
            &approver,
            ApproverRole::Admin,
            "escalate",
            Utc::now(),
        )
        .unwrap()
            .apply(&mut request);

        let base_len = base.len();
        prop_assert_eq!(request.base_roles(), base);
        prop_assert_eq!(request.steps.len(), base_len + 1);
        for (idx, s) in request.steps.iter().enumerate() {
            prop_assert_eq!(s.step_order, i32::try_from(idx + 1).unwrap());
        }
        prop_assert_eq!(request.active_step().unwrap().role, ApproverRole::Admin);
    }
}
