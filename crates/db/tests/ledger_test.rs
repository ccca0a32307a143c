//! Journal ledger integration tests.
//!
//! Covers posting, draft lifecycle, void by compensation, balance
//! synchronization through the hierarchy and the storage guards that back
//! the ledger rules.

#![allow(clippy::too_many_lines)]

mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait, QueryFilter, Statement,
};

use common::{
    Chart, approve_source, balance_of, connect_or_skip, credit, debit, ledger_config,
    manual_draft,
};
use tally_core::balance::DisplayConvention;
use tally_core::ledger::{EntryNumber, LedgerError, SourceType};
use tally_db::entities::{journal_entries, journal_lines, sea_orm_active_enums::EntryStatus};
use tally_db::repositories::{
    AccountRepository, ApprovalRepository, CashBankRepository, CreateCashBankInput,
    JournalRepository, ReportingRepository,
};
use tally_shared::types::PageRequest;

#[tokio::test]
async fn test_post_updates_leaves_headers_and_mirror() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());

    let mirror = CashBankRepository::new(db.clone())
        .link(CreateCashBankInput {
            name: "Petty cash".to_string(),
            account_number: None,
            account_id: chart.cash.id,
        })
        .await
        .unwrap();
    assert_eq!(mirror.balance, Decimal::ZERO);

    let outcome = journal
        .create_and_post(&manual_draft(
            "Cash sale",
            vec![debit(chart.cash.id, dec!(1000.00)), credit(chart.revenue.id, dec!(1000.00))],
        ))
        .await
        .unwrap();
    assert!(!outcome.is_existing());

    let posted = outcome.into_entry();
    assert_eq!(posted.entry.status, EntryStatus::Posted);
    assert_eq!(posted.entry.total_debit, dec!(1000.00));
    assert_eq!(posted.entry.total_credit, dec!(1000.00));
    assert_eq!(posted.lines.len(), 2);
    assert!(posted.entry.posted_at.is_some());

    let number = EntryNumber::parse(posted.entry.entry_number.as_deref().unwrap()).unwrap();
    assert_eq!(number.prefix(), "JE");
    assert_eq!(number.year(), 2026);

    assert_eq!(balance_of(&db, chart.cash.id).await, dec!(1000.00));
    assert_eq!(balance_of(&db, chart.revenue.id).await, dec!(1000.00));
    assert_eq!(balance_of(&db, chart.cash_and_bank.id).await, dec!(1000.00));
    assert_eq!(balance_of(&db, chart.assets.id).await, dec!(1000.00));
    assert_eq!(balance_of(&db, chart.bank.id).await, Decimal::ZERO);

    let mirror = CashBankRepository::new(db.clone())
        .find_by_id(mirror.id)
        .await
        .unwrap();
    assert_eq!(mirror.balance, dec!(1000.00));
}

#[tokio::test]
async fn test_unbalanced_entry_is_rejected_without_rows() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());

    let err = journal
        .create_and_post(&manual_draft(
            "Unbalanced",
            vec![debit(chart.cash.id, dec!(100.00)), credit(chart.revenue.id, dec!(90.00))],
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::UnbalancedEntry { debit, credit }
            if debit == dec!(100.00) && credit == dec!(90.00)
    ));

    let lines = journal_lines::Entity::find()
        .filter(journal_lines::Column::AccountId.is_in([chart.cash.id, chart.revenue.id]))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(lines, 0);
    assert_eq!(balance_of(&db, chart.cash.id).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_posting_to_header_or_inactive_account_is_rejected() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());

    let err = journal
        .create_and_post(&manual_draft(
            "To header",
            vec![debit(chart.cash_and_bank.id, dec!(10)), credit(chart.revenue.id, dec!(10))],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::HeaderAccountPosting { .. }));

    AccountRepository::new(db.clone(), 8)
        .deactivate(chart.expense.id)
        .await
        .unwrap();
    let err = journal
        .create_and_post(&manual_draft(
            "To inactive",
            vec![debit(chart.expense.id, dec!(10)), credit(chart.cash.id, dec!(10))],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccountInactive { .. }));

    let err = journal
        .create_and_post(&manual_draft(
            "To nowhere",
            vec![debit(uuid::Uuid::now_v7(), dec!(10)), credit(chart.cash.id, dec!(10))],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DanglingReference { .. }));
}

#[tokio::test]
async fn test_draft_lifecycle() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());

    // Unbalanced drafts may be saved but not posted.
    let draft = journal
        .save_draft(&manual_draft(
            "Work in progress",
            vec![debit(chart.expense.id, dec!(50.00)), credit(chart.cash.id, dec!(40.00))],
        ))
        .await
        .unwrap()
        .into_entry();
    assert_eq!(draft.entry.status, EntryStatus::Draft);
    assert!(draft.entry.entry_number.is_none());
    assert_eq!(balance_of(&db, chart.expense.id).await, Decimal::ZERO);

    let err = journal.post_draft(draft.entry.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::UnbalancedEntry { .. }));

    let discarded = journal.discard_draft(draft.entry.id).await.unwrap();
    assert_eq!(discarded.status, EntryStatus::Void);

    let err = journal.post_draft(draft.entry.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStatusTransition { .. }));

    // A balanced draft posts and gets its number only then.
    let draft = journal
        .save_draft(&manual_draft(
            "Office supplies",
            vec![debit(chart.expense.id, dec!(75.50)), credit(chart.cash.id, dec!(75.50))],
        ))
        .await
        .unwrap()
        .into_entry();
    let posted = journal.post_draft(draft.entry.id).await.unwrap();
    assert_eq!(posted.entry.status, EntryStatus::Posted);
    assert!(posted.entry.entry_number.is_some());
    assert_eq!(balance_of(&db, chart.expense.id).await, dec!(75.50));
    assert_eq!(balance_of(&db, chart.cash.id).await, dec!(-75.50));

    let err = journal.discard_draft(draft.entry.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn test_void_posts_compensating_entry() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());

    let original = journal
        .create_and_post(&manual_draft(
            "Invoice",
            vec![
                debit(chart.receivables.id, dec!(500.00)),
                credit(chart.revenue.id, dec!(500.00)),
            ],
        ))
        .await
        .unwrap()
        .into_entry();
    assert_eq!(balance_of(&db, chart.assets.id).await, dec!(500.00));

    let err = journal.void_entry(original.entry.id, "   ").await.unwrap_err();
    assert!(matches!(err, LedgerError::VoidReasonRequired));

    let voided = journal
        .void_entry(original.entry.id, "Customer cancelled")
        .await
        .unwrap();

    // The original keeps its status and lines, and carries the audit stamp.
    assert_eq!(voided.original.status, EntryStatus::Posted);
    assert_eq!(voided.original.reversed_by_entry_id, Some(voided.compensating.entry.id));
    assert_eq!(voided.original.void_reason.as_deref(), Some("Customer cancelled"));
    assert!(voided.original.voided_at.is_some());

    let compensating = &voided.compensating;
    assert_eq!(compensating.entry.status, EntryStatus::Posted);
    assert_eq!(compensating.entry.reverses_entry_id, Some(original.entry.id));
    assert_eq!(
        compensating.entry.description,
        format!(
            "Void of {}: Customer cancelled",
            original.entry.entry_number.as_deref().unwrap()
        )
    );
    for (orig, comp) in original.lines.iter().zip(&compensating.lines) {
        assert_eq!(orig.account_id, comp.account_id);
        assert_eq!(orig.debit, comp.credit);
        assert_eq!(orig.credit, comp.debit);
        assert!(comp.description.as_deref().unwrap().starts_with("Reversal: "));
    }

    assert_eq!(balance_of(&db, chart.receivables.id).await, Decimal::ZERO);
    assert_eq!(balance_of(&db, chart.revenue.id).await, Decimal::ZERO);
    assert_eq!(balance_of(&db, chart.assets.id).await, Decimal::ZERO);

    let err = journal
        .void_entry(original.entry.id, "Again")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyVoided { .. }));

    let err = journal
        .void_entry(compensating.entry.id, "Undo the undo")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CannotVoidCompensating(_)));
}

#[tokio::test]
async fn test_void_keeps_both_entries_on_the_source() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());
    let sale_id = common::create_source(&db, SourceType::Sale, dec!(200)).await;
    let approvals = ApprovalRepository::new(db.clone());
    approve_source(&approvals, SourceType::Sale, sale_id, dec!(200)).await;

    let draft = common::sourced_draft(
        SourceType::Sale,
        sale_id,
        "Sale",
        vec![debit(chart.cash.id, dec!(200)), credit(chart.revenue.id, dec!(200))],
    );
    let first = journal.create_and_post(&draft).await.unwrap().into_entry();

    let again = journal.create_and_post(&draft).await.unwrap();
    assert!(again.is_existing());
    assert_eq!(again.entry().entry.id, first.entry.id);

    journal.void_entry(first.entry.id, "Wrong amount").await.unwrap();

    // The voided original and its compensation both stay attached to the source.
    let entries = journal.list_by_source(SourceType::Sale, sale_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    let live = journal.find_live_by_source(SourceType::Sale, sale_id).await.unwrap();
    assert_eq!(live.map(|e| e.entry.id), Some(first.entry.id));
}

#[tokio::test]
async fn test_storage_guards_protect_posted_entries() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());

    let posted = journal
        .create_and_post(&manual_draft(
            "Guarded",
            vec![debit(chart.cash.id, dec!(10)), credit(chart.revenue.id, dec!(10))],
        ))
        .await
        .unwrap()
        .into_entry();

    let edit = db
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE journal_entries SET description = 'edited' WHERE id = $1",
            [posted.entry.id.into()],
        ))
        .await;
    assert!(edit.is_err(), "posted entry content must be immutable");

    let line_edit = db
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE journal_lines SET debit = 20 WHERE entry_id = $1 AND debit > 0",
            [posted.entry.id.into()],
        ))
        .await;
    assert!(line_edit.is_err(), "lines of a posted entry must be immutable");

    let delete = db
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM journal_entries WHERE id = $1",
            [posted.entry.id.into()],
        ))
        .await;
    assert!(delete.is_err(), "posted entries cannot be deleted");

    let account_delete = db
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM accounts WHERE id = $1",
            [chart.bank.id.into()],
        ))
        .await;
    assert!(account_delete.is_err(), "accounts cannot be deleted");

    let reloaded = journal_entries::Entity::find_by_id(posted.entry.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.description, "Guarded");
}

#[tokio::test]
async fn test_reporting_queries() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());
    let reporting = ReportingRepository::new(db.clone());

    for (day, amount) in [(1, dec!(100)), (10, dec!(250)), (20, dec!(50))] {
        let mut draft = manual_draft(
            "Deposit",
            vec![debit(chart.bank.id, amount), credit(chart.payables.id, amount)],
        );
        draft.entry_date = common::date(2026, 4, day);
        journal.create_and_post(&draft).await.unwrap();
    }

    let current = reporting
        .account_balance(chart.bank.id, None, DisplayConvention::NormalSide)
        .await
        .unwrap();
    assert_eq!(current.balance, dec!(400));

    let as_of = reporting
        .account_balance(
            chart.assets.id,
            Some(common::date(2026, 4, 15)),
            DisplayConvention::NormalSide,
        )
        .await
        .unwrap();
    assert!(as_of.is_header);
    assert_eq!(as_of.balance, dec!(350));

    let payables = reporting
        .account_balance(chart.payables.id, None, DisplayConvention::DebitPositive)
        .await
        .unwrap();
    assert_eq!(payables.balance, dec!(400));
    assert_eq!(payables.display_balance, dec!(-400));

    // Second page continues the running balance of the first.
    let page = reporting
        .ledger_lines(chart.bank.id, None, None, PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(page.meta.total, 3);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].debit, dec!(50));
    assert_eq!(page.data[0].running_balance, dec!(400));

    let ranged = reporting
        .ledger_lines(
            chart.bank.id,
            Some(common::date(2026, 4, 5)),
            Some(common::date(2026, 4, 15)),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(ranged.meta.total, 1);
    assert_eq!(ranged.data[0].running_balance, dec!(350));

    let tree = reporting
        .hierarchy_balances(chart.assets.id, DisplayConvention::NormalSide)
        .await
        .unwrap();
    assert_eq!(tree.balance, dec!(400));
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].code, chart.code("1100"));
    assert_eq!(tree.children[0].children[1].balance, dec!(400));
}
