//! Property-based tests for LedgerService.
//!
//! - Property 1: Entry Balance Integrity
//! - Property 2: Line Resolution Preserves Amounts

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::LedgerError;
use super::service::LedgerService;
use super::types::{
    AccountInfo, AccountType, EntryType, JournalDraft, LineInput, SourceType,
};

/// Strategy to generate positive decimal amounts (0.01 to 10,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate entry type.
fn entry_type_strategy() -> impl Strategy<Value = EntryType> {
    prop_oneof![Just(EntryType::Debit), Just(EntryType::Credit)]
}

fn make_line(entry_type: EntryType, amount: Decimal) -> LineInput {
    LineInput {
        account_id: Uuid::new_v4(),
        entry_type,
        amount,
        description: None,
    }
}

fn make_draft(lines: Vec<LineInput>) -> JournalDraft {
    JournalDraft {
        source_type: SourceType::Manual,
        source_id: None,
        entry_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
        description: "Property entry".to_string(),
        lines,
    }
}

/// Mock account lookup that always finds an active leaf.
#[allow(clippy::unnecessary_wraps)]
fn ok_lookup(id: Uuid) -> Option<AccountInfo> {
    Some(AccountInfo {
        id,
        code: "1000".to_string(),
        account_type: AccountType::Asset,
        is_active: true,
        is_header: false,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Property 1: Entry Balance Integrity
    // =========================================================================

    /// **Property 1.1: Balanced entries are accepted.**
    ///
    /// *For any* entry whose debit amounts sum to its credit amounts,
    /// validation SHALL succeed with equal totals.
    #[test]
    fn prop_balanced_entry_accepted(
        amounts in prop::collection::vec(positive_amount(), 1..6),
    ) {
        let total: Decimal = amounts.iter().copied().sum();
        let mut lines: Vec<LineInput> = amounts
            .iter()
            .map(|a| make_line(EntryType::Debit, *a))
            .collect();
        lines.push(make_line(EntryType::Credit, total));

        let result = LedgerService::validate_and_resolve(
            &make_draft(lines),
            Decimal::new(1, 2),
            ok_lookup,
        );

        prop_assert!(result.is_ok(), "Balanced entry should be accepted");
        let (_, totals) = result.unwrap();
        prop_assert_eq!(totals.total_debit, totals.total_credit);
        prop_assert_eq!(totals.total_debit, total);
    }

    /// **Property 1.2: Unbalanced entries are rejected.**
    ///
    /// *For any* two-decimal amounts that differ, validation SHALL fail with
    /// UnbalancedEntry carrying the computed totals.
    #[test]
    fn prop_unbalanced_entry_rejected(
        debit_amount in positive_amount(),
        credit_amount in positive_amount(),
    ) {
        prop_assume!(debit_amount != credit_amount);

        let lines = vec![
            make_line(EntryType::Debit, debit_amount),
            make_line(EntryType::Credit, credit_amount),
        ];

        let result = LedgerService::validate_and_resolve(
            &make_draft(lines),
            Decimal::new(1, 2),
            ok_lookup,
        );

        prop_assert!(
            matches!(
                result,
                Err(LedgerError::UnbalancedEntry { debit, credit })
                    if debit == debit_amount && credit == credit_amount
            ),
            "Unbalanced entry should be rejected"
        );
    }

    // =========================================================================
    // Property 2: Line Resolution Preserves Amounts
    // =========================================================================

    /// **Property 2.1: Exactly one column carries the amount.**
    ///
    /// *For any* valid line, resolution SHALL put the full amount in the
    /// column of its entry type and zero in the other.
    #[test]
    fn prop_resolution_single_column(
        entry_type in entry_type_strategy(),
        amount in positive_amount(),
    ) {
        let resolved = LedgerService::resolve_lines(&[make_line(entry_type, amount)]).unwrap();
        let line = &resolved[0];

        match entry_type {
            EntryType::Debit => {
                prop_assert_eq!(line.debit, amount);
                prop_assert_eq!(line.credit, Decimal::ZERO);
            }
            EntryType::Credit => {
                prop_assert_eq!(line.credit, amount);
                prop_assert_eq!(line.debit, Decimal::ZERO);
            }
        }
    }

    /// **Property 2.2: Line numbers are dense and 1-based.**
    #[test]
    fn prop_line_numbers_dense(
        types in prop::collection::vec(entry_type_strategy(), 1..10),
        amount in positive_amount(),
    ) {
        let lines: Vec<LineInput> = types.iter().map(|t| make_line(*t, amount)).collect();
        let resolved = LedgerService::resolve_lines(&lines).unwrap();

        for (idx, line) in resolved.iter().enumerate() {
            prop_assert_eq!(usize::try_from(line.line_number).unwrap(), idx + 1);
        }
    }

    /// **Property 2.3: Non-positive amounts never resolve.**
    #[test]
    fn prop_non_positive_rejected(
        entry_type in entry_type_strategy(),
        cents in -1_000_000i64..=0i64,
    ) {
        let result = LedgerService::resolve_lines(&[make_line(entry_type, Decimal::new(cents, 2))]);
        let rejected = matches!(
            result,
            Err(LedgerError::ZeroAmount { .. } | LedgerError::NegativeAmount { .. })
        );
        prop_assert!(rejected, "amount {} should be rejected", cents);
    }
}
