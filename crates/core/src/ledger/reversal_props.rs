//! Property-based tests for ReversalService.

use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::reversal::{ReversalService, VoidTarget};
use super::types::{EntryStatus, EntryTotals, ResolvedLine};

/// Strategy for generating random UUIDs.
fn arb_uuid() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

/// Strategy for generating random positive Decimal amounts.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Balanced debit/credit pair over two accounts.
fn arb_balanced_pair() -> impl Strategy<Value = Vec<ResolvedLine>> {
    (arb_uuid(), arb_uuid(), arb_amount(), prop::option::of("[a-zA-Z ]{0,20}")).prop_map(
        |(debit_account, credit_account, amount, description)| {
            vec![
                ResolvedLine {
                    account_id: debit_account,
                    line_number: 1,
                    debit: amount,
                    credit: Decimal::ZERO,
                    description: description.clone(),
                },
                ResolvedLine {
                    account_id: credit_account,
                    line_number: 2,
                    debit: Decimal::ZERO,
                    credit: amount,
                    description,
                },
            ]
        },
    )
}

/// Balanced sets of 2 or 4 lines, accounts possibly repeated.
fn arb_balanced_lines() -> impl Strategy<Value = Vec<ResolvedLine>> {
    prop_oneof![
        arb_balanced_pair(),
        (arb_balanced_pair(), arb_balanced_pair()).prop_map(|(mut a, b)| {
            a.extend(b.into_iter().map(|mut line| {
                line.line_number += 2;
                line
            }));
            a
        }),
    ]
}

fn target(lines: Vec<ResolvedLine>) -> VoidTarget {
    VoidTarget {
        entry_id: Uuid::new_v4(),
        entry_number: "JE-2026-000001".to_string(),
        status: EntryStatus::Posted,
        reverses_entry_id: None,
        reversed_by_entry_id: None,
        lines,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Property 3: Void Creates Balanced Compensating Entry
    // =========================================================================

    /// **Property 3.1: Columns are swapped line by line.**
    #[test]
    fn prop_compensation_swaps_columns(lines in arb_balanced_lines()) {
        let comp = ReversalService::compensate(&target(lines.clone()), "Test void").unwrap();

        prop_assert_eq!(comp.lines.len(), lines.len());
        for (original, reversed) in lines.iter().zip(comp.lines.iter()) {
            prop_assert_eq!(original.account_id, reversed.account_id);
            prop_assert_eq!(original.debit, reversed.credit);
            prop_assert_eq!(original.credit, reversed.debit);
            prop_assert_eq!(original.line_number, reversed.line_number);
        }
    }

    /// **Property 3.2: Balanced originals produce balanced compensation.**
    #[test]
    fn prop_compensation_balanced(lines in arb_balanced_lines()) {
        let original = EntryTotals::from_lines(&lines).unwrap();
        let comp = ReversalService::compensate(&target(lines), "Test void").unwrap();

        prop_assert_eq!(comp.totals.total_debit, original.total_credit);
        prop_assert_eq!(comp.totals.total_credit, original.total_debit);
        prop_assert_eq!(comp.totals.difference(), Decimal::ZERO);
    }

    /// **Property 3.3: Original plus compensation nets to zero per account.**
    #[test]
    fn prop_net_effect_zero(lines in arb_balanced_lines()) {
        let comp = ReversalService::compensate(&target(lines.clone()), "Test void").unwrap();

        for (_, net) in ReversalService::net_effect(&lines, &comp.lines) {
            prop_assert_eq!(net, Decimal::ZERO);
        }
    }

    /// **Property 3.4: Descriptions carry the reversal prefix.**
    #[test]
    fn prop_description_prefixed(lines in arb_balanced_pair(), reason in "[a-zA-Z]{1,20}") {
        let comp = ReversalService::compensate(&target(lines), &reason).unwrap();

        prop_assert!(comp.description.ends_with(&reason));
        for line in &comp.lines {
            prop_assert!(line.description.as_deref().unwrap_or_default().starts_with("Reversal: "));
        }
    }
}
