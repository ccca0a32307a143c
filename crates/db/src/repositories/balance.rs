//! Balance synchronizer.
//!
//! Cached balances are never adjusted incrementally. Inside the posting
//! transaction every touched leaf is recomputed from its posted lines, then
//! each ancestor header is recomputed from its children, deepest first, and
//! finally the cash/bank mirrors of the touched leaves are overwritten.
//!
//! All rows that will be written are locked up front, ascending by id, so
//! two postings touching overlapping accounts serialize instead of
//! deadlocking.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait,
};
use tracing::debug;
use uuid::Uuid;

use tally_core::balance::AccountTree;
use tally_core::ledger::{AccountInfo, AccountType, LedgerError};
use tally_shared::types::AccountId;

use super::account::{load_ancestry, to_info};
use crate::entities::sea_orm_active_enums::EntryStatus;
use crate::entities::{accounts, cash_banks, journal_entries, journal_lines};
use crate::error::ledger_error;

#[derive(Debug, FromQueryResult)]
struct LineSums {
    account_id: Uuid,
    debit: Option<Decimal>,
    credit: Option<Decimal>,
}

/// Debit and credit totals of posted lines per account.
///
/// `accounts` restricts the accounts summed; `as_of` ignores entries dated
/// after it.
pub(crate) async fn posted_sums<C: ConnectionTrait>(
    conn: &C,
    accounts: Option<&[Uuid]>,
    as_of: Option<NaiveDate>,
) -> Result<HashMap<Uuid, (Decimal, Decimal)>, DbErr> {
    let mut query = journal_lines::Entity::find()
        .select_only()
        .column(journal_lines::Column::AccountId)
        .column_as(
            Expr::col((journal_lines::Entity, journal_lines::Column::Debit)).sum(),
            "debit",
        )
        .column_as(
            Expr::col((journal_lines::Entity, journal_lines::Column::Credit)).sum(),
            "credit",
        )
        .join(JoinType::InnerJoin, journal_lines::Relation::JournalEntries.def())
        .filter(journal_entries::Column::Status.eq(EntryStatus::Posted));

    if let Some(ids) = accounts {
        query = query.filter(journal_lines::Column::AccountId.is_in(ids.iter().copied()));
    }
    if let Some(date) = as_of {
        query = query.filter(journal_entries::Column::EntryDate.lte(date));
    }

    let rows = query
        .group_by(journal_lines::Column::AccountId)
        .into_model::<LineSums>()
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            (
                r.account_id,
                (
                    r.debit.unwrap_or(Decimal::ZERO),
                    r.credit.unwrap_or(Decimal::ZERO),
                ),
            )
        })
        .collect())
}

/// Accounts locked for one posting, with the hierarchy they were resolved in.
#[derive(Debug)]
pub struct LockedAccounts {
    tree: AccountTree,
    leaves: Vec<AccountId>,
    rows: HashMap<Uuid, accounts::Model>,
}

impl LockedAccounts {
    /// Eligibility facts of a locked account.
    #[must_use]
    pub fn info(&self, id: Uuid) -> Option<AccountInfo> {
        self.rows.get(&id).map(to_info)
    }

    /// Number of locked rows, leaves and headers together.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when nothing was locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What one synchronization wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Leaf accounts recomputed.
    pub leaves: usize,
    /// Header accounts recomputed.
    pub headers: usize,
    /// Cash/bank mirrors overwritten.
    pub mirrors: u64,
}

/// Keeps `accounts.balance` and `cash_banks.balance` equal to their derivation.
pub struct BalanceSynchronizer;

impl BalanceSynchronizer {
    /// Locks `leaves` and every ancestor header, ascending by id.
    ///
    /// Only the parent chains of `leaves` are read. Unknown ids are skipped;
    /// the caller reports them when checking eligibility.
    ///
    /// # Errors
    ///
    /// Returns `Database` for a corrupted hierarchy or a failed query.
    pub async fn lock<C: ConnectionTrait>(
        conn: &C,
        leaves: &[Uuid],
    ) -> Result<LockedAccounts, LedgerError> {
        let tree = load_ancestry(conn, leaves).await.map_err(ledger_error)?;

        let mut known: Vec<AccountId> = leaves
            .iter()
            .map(|id| AccountId::from_uuid(*id))
            .filter(|id| tree.get(*id).is_some())
            .collect();
        known.sort();
        known.dedup();

        let order = tree
            .lock_order(&known)
            .map_err(|issue| LedgerError::Database(issue.to_string()))?;
        let ids: Vec<Uuid> = order.into_iter().map(AccountId::into_inner).collect();

        let rows = accounts::Entity::find()
            .filter(accounts::Column::Id.is_in(ids))
            .order_by_asc(accounts::Column::Id)
            .lock_exclusive()
            .all(conn)
            .await
            .map_err(ledger_error)?;

        Ok(LockedAccounts {
            tree,
            leaves: known,
            rows: rows.into_iter().map(|r| (r.id, r)).collect(),
        })
    }

    /// Recomputes every locked account and the mirrors of the locked leaves.
    ///
    /// Must run in the same transaction as [`Self::lock`], after the lines
    /// being posted are visible.
    ///
    /// # Errors
    ///
    /// Returns `Database` or `ConcurrentModification` from storage.
    pub async fn synchronize<C: ConnectionTrait>(
        conn: &C,
        locked: &LockedAccounts,
    ) -> Result<SyncSummary, LedgerError> {
        let leaf_ids: Vec<Uuid> = locked.leaves.iter().map(|id| id.into_inner()).collect();
        let sums = posted_sums(conn, Some(&leaf_ids), None)
            .await
            .map_err(ledger_error)?;
        let now = Utc::now();

        let mut summary = SyncSummary::default();
        let mut leaf_balances: HashMap<Uuid, Decimal> = HashMap::with_capacity(leaf_ids.len());

        for id in &leaf_ids {
            let Some(row) = locked.rows.get(id) else {
                continue;
            };
            let (debit, credit) = sums.get(id).copied().unwrap_or_default();
            let balance = AccountType::from(row.account_type)
                .normal_balance()
                .signed_balance(debit, credit);

            write_balance(conn, *id, balance, now).await?;
            leaf_balances.insert(*id, balance);
            summary.leaves += 1;
        }

        let headers = locked
            .tree
            .rollup_order(&locked.leaves)
            .map_err(|issue| LedgerError::Database(issue.to_string()))?;

        for header in headers {
            let balance: Option<Decimal> = accounts::Entity::find()
                .select_only()
                .column_as(Expr::col(accounts::Column::Balance).sum(), "total")
                .filter(accounts::Column::ParentId.eq(header.into_inner()))
                .into_tuple::<Option<Decimal>>()
                .one(conn)
                .await
                .map_err(ledger_error)?
                .flatten();

            write_balance(conn, header.into_inner(), balance.unwrap_or(Decimal::ZERO), now).await?;
            summary.headers += 1;
        }

        for (account_id, balance) in &leaf_balances {
            let result = cash_banks::Entity::update_many()
                .col_expr(cash_banks::Column::Balance, Expr::value(*balance))
                .col_expr(cash_banks::Column::UpdatedAt, Expr::value(now))
                .filter(cash_banks::Column::AccountId.eq(*account_id))
                .exec(conn)
                .await
                .map_err(ledger_error)?;
            summary.mirrors += result.rows_affected;
        }

        debug!(
            leaves = summary.leaves,
            headers = summary.headers,
            mirrors = summary.mirrors,
            "balances synchronized"
        );
        Ok(summary)
    }

    /// Locks and synchronizes in one call.
    ///
    /// # Errors
    ///
    /// See [`Self::lock`] and [`Self::synchronize`].
    pub async fn sync_accounts<C: ConnectionTrait>(
        conn: &C,
        leaves: &[Uuid],
    ) -> Result<SyncSummary, LedgerError> {
        let locked = Self::lock(conn, leaves).await?;
        Self::synchronize(conn, &locked).await
    }
}

async fn write_balance<C: ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
    balance: Decimal,
    now: chrono::DateTime<Utc>,
) -> Result<(), LedgerError> {
    accounts::Entity::update_many()
        .col_expr(accounts::Column::Balance, Expr::value(balance))
        .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
        .filter(accounts::Column::Id.eq(account_id))
        .exec(conn)
        .await
        .map_err(ledger_error)?;
    Ok(())
}
