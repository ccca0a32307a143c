//! Balance queries.
//!
//! Every query runs in a read-only snapshot, so a hierarchy is never shown
//! half-way through a posting.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DbBackend, DbErr, EntityTrait, FromQueryResult, Statement};
use serde::Serialize;
use uuid::Uuid;

use tally_core::balance::{AccountTree, DisplayConvention};
use tally_core::ledger::{AccountType, SourceType};
use tally_shared::types::{AccountId, PageRequest, PageResponse};

use super::account::to_node;
use super::balance::posted_sums;
use crate::entities::accounts;
use crate::snapshot::SnapshotExt;

/// Posted lines of one account with the running net (debit minus credit)
/// from the account's first line.
const LEDGER_LINES_SQL: &str = r"
SELECT * FROM (
    SELECT
        l.id AS line_id,
        l.entry_id,
        e.entry_number,
        e.entry_date,
        e.source_type::text AS source_type,
        e.source_id,
        l.line_number,
        l.description,
        l.debit,
        l.credit,
        SUM(l.debit - l.credit) OVER (
            ORDER BY e.entry_date, e.entry_number, l.line_number
            ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
        ) AS net_to_date
    FROM journal_lines l
    JOIN journal_entries e ON e.id = l.entry_id
    WHERE l.account_id = $1
      AND e.status = 'POSTED'
      AND ($2::date IS NULL OR e.entry_date <= $2::date)
) ledger
WHERE ($3::date IS NULL OR entry_date >= $3::date)
ORDER BY entry_date, entry_number, line_number
LIMIT $4 OFFSET $5
";

const LEDGER_LINES_COUNT_SQL: &str = r"
SELECT COUNT(*) AS total
FROM journal_lines l
JOIN journal_entries e ON e.id = l.entry_id
WHERE l.account_id = $1
  AND e.status = 'POSTED'
  AND ($2::date IS NULL OR e.entry_date <= $2::date)
  AND ($3::date IS NULL OR e.entry_date >= $3::date)
";

/// Error types for balance queries.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// `from` is after `to`.
    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange {
        /// Start of the range.
        from: NaiveDate,
        /// End of the range.
        to: NaiveDate,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Balance of one account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountBalanceView {
    /// The account.
    pub account_id: Uuid,
    /// Its code.
    pub code: String,
    /// Its name.
    pub name: String,
    /// Its type.
    pub account_type: AccountType,
    /// Whether it aggregates children.
    pub is_header: bool,
    /// Cut-off date, `None` for the cached current balance.
    pub as_of: Option<NaiveDate>,
    /// Normal-sign balance.
    pub balance: Decimal,
    /// Balance in the requested convention.
    pub display_balance: Decimal,
}

/// One line of an account ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerLineView {
    /// The line.
    pub line_id: Uuid,
    /// Its entry.
    pub entry_id: Uuid,
    /// Entry number.
    pub entry_number: Option<String>,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Originating event type.
    pub source_type: Option<SourceType>,
    /// Originating record.
    pub source_id: Option<i64>,
    /// Position within the entry.
    pub line_number: i32,
    /// Line description.
    pub description: Option<String>,
    /// Debit amount.
    pub debit: Decimal,
    /// Credit amount.
    pub credit: Decimal,
    /// Normal-sign balance after this line.
    pub running_balance: Decimal,
}

/// A node of the balance hierarchy.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyNode {
    /// The account.
    pub account_id: Uuid,
    /// Its code.
    pub code: String,
    /// Its name.
    pub name: String,
    /// Its type.
    pub account_type: AccountType,
    /// Whether it aggregates children.
    pub is_header: bool,
    /// Cached normal-sign balance.
    pub balance: Decimal,
    /// Balance in the requested convention.
    pub display_balance: Decimal,
    /// Children ordered by code.
    pub children: Vec<HierarchyNode>,
}

#[derive(Debug, FromQueryResult)]
struct LineRow {
    line_id: Uuid,
    entry_id: Uuid,
    entry_number: Option<String>,
    entry_date: NaiveDate,
    source_type: String,
    source_id: Option<i64>,
    line_number: i32,
    description: Option<String>,
    debit: Decimal,
    credit: Decimal,
    net_to_date: Decimal,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    total: i64,
}

/// Read-side balance queries.
#[derive(Debug, Clone)]
pub struct ReportingRepository {
    db: DatabaseConnection,
}

impl ReportingRepository {
    /// Creates a new reporting repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Balance of an account, cached or as of a date.
    ///
    /// Without `as_of` the cached balance is returned. With it the balance
    /// is derived from posted lines dated on or before `as_of`; for a
    /// header, over every leaf beneath it.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if the account does not exist.
    pub async fn account_balance(
        &self,
        account_id: Uuid,
        as_of: Option<NaiveDate>,
        convention: DisplayConvention,
    ) -> Result<AccountBalanceView, ReportError> {
        let snapshot = self.db.snapshot().await?;
        let conn = snapshot.transaction();

        let account = accounts::Entity::find_by_id(account_id)
            .one(conn)
            .await?
            .ok_or(ReportError::AccountNotFound(account_id))?;
        let account_type = AccountType::from(account.account_type);

        let balance = match as_of {
            None => account.balance,
            Some(date) => {
                let rows = accounts::Entity::find().all(conn).await?;
                let tree = AccountTree::new(rows.iter().map(to_node));
                let leaves: Vec<Uuid> = tree
                    .leaves_under(AccountId::from_uuid(account_id))
                    .into_iter()
                    .map(AccountId::into_inner)
                    .collect();
                let sums = posted_sums(conn, Some(&leaves), Some(date)).await?;
                leaf_balances(&rows, &sums)
                    .into_iter()
                    .filter(|(id, _)| leaves.contains(&id.into_inner()))
                    .map(|(_, b)| b)
                    .sum()
            }
        };
        snapshot.finish().await?;

        Ok(AccountBalanceView {
            account_id,
            code: account.code,
            name: account.name,
            account_type,
            is_header: account.is_header,
            as_of,
            balance,
            display_balance: convention.present(account_type, balance),
        })
    }

    /// Posted lines of a leaf account with running balances.
    ///
    /// The running balance counts every earlier posted line, including
    /// those before `from`, so page N starts where page N-1 ended.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDateRange` or `AccountNotFound`.
    pub async fn ledger_lines(
        &self,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerLineView>, ReportError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ReportError::InvalidDateRange { from, to });
            }
        }

        let snapshot = self.db.snapshot().await?;
        let conn = snapshot.transaction();

        let account = accounts::Entity::find_by_id(account_id)
            .one(conn)
            .await?
            .ok_or(ReportError::AccountNotFound(account_id))?;
        let normal = AccountType::from(account.account_type).normal_balance();

        let total = CountRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            LEDGER_LINES_COUNT_SQL,
            [account_id.into(), to.into(), from.into()],
        ))
        .one(conn)
        .await?
        .map_or(0, |r| r.total);

        let rows = LineRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            LEDGER_LINES_SQL,
            [
                account_id.into(),
                to.into(),
                from.into(),
                i64::try_from(page.limit()).unwrap_or(i64::MAX).into(),
                i64::try_from(page.offset()).unwrap_or(i64::MAX).into(),
            ],
        ))
        .all(conn)
        .await?;
        snapshot.finish().await?;

        let lines = rows
            .into_iter()
            .map(|r| LedgerLineView {
                line_id: r.line_id,
                entry_id: r.entry_id,
                entry_number: r.entry_number,
                entry_date: r.entry_date,
                source_type: SourceType::parse(&r.source_type),
                source_id: r.source_id,
                line_number: r.line_number,
                description: r.description,
                debit: r.debit,
                credit: r.credit,
                running_balance: normal.signed_balance(r.net_to_date, Decimal::ZERO),
            })
            .collect();

        Ok(PageResponse::new(
            lines,
            page,
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    /// Cached balances of `root` and everything beneath it.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if `root` does not exist.
    pub async fn hierarchy_balances(
        &self,
        root: Uuid,
        convention: DisplayConvention,
    ) -> Result<HierarchyNode, ReportError> {
        let snapshot = self.db.snapshot().await?;
        let rows = accounts::Entity::find().all(snapshot.transaction()).await?;
        snapshot.finish().await?;

        let tree = AccountTree::new(rows.iter().map(to_node));
        let by_id: HashMap<Uuid, &accounts::Model> = rows.iter().map(|r| (r.id, r)).collect();

        build_node(&tree, &by_id, root, convention).ok_or(ReportError::AccountNotFound(root))
    }
}

fn leaf_balances(
    rows: &[accounts::Model],
    sums: &HashMap<Uuid, (Decimal, Decimal)>,
) -> HashMap<AccountId, Decimal> {
    rows.iter()
        .filter(|r| !r.is_header)
        .map(|r| {
            let (debit, credit) = sums.get(&r.id).copied().unwrap_or_default();
            let balance = AccountType::from(r.account_type)
                .normal_balance()
                .signed_balance(debit, credit);
            (AccountId::from_uuid(r.id), balance)
        })
        .collect()
}

fn build_node(
    tree: &AccountTree,
    by_id: &HashMap<Uuid, &accounts::Model>,
    id: Uuid,
    convention: DisplayConvention,
) -> Option<HierarchyNode> {
    let row = by_id.get(&id)?;
    let account_type = AccountType::from(row.account_type);

    let mut children: Vec<HierarchyNode> = tree
        .children(AccountId::from_uuid(id))
        .iter()
        .filter_map(|child| build_node(tree, by_id, child.into_inner(), convention))
        .collect();
    children.sort_by(|a, b| a.code.cmp(&b.code));

    Some(HierarchyNode {
        account_id: row.id,
        code: row.code.clone(),
        name: row.name.clone(),
        account_type,
        is_header: row.is_header,
        balance: row.balance,
        display_balance: convention.present(account_type, row.balance),
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::AccountType as DbAccountType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn row(
        code: &str,
        account_type: DbAccountType,
        parent_id: Option<Uuid>,
        is_header: bool,
        balance: Decimal,
    ) -> accounts::Model {
        let now = Utc::now().into();
        accounts::Model {
            id: Uuid::now_v7(),
            code: code.to_string(),
            name: code.to_string(),
            account_type,
            parent_id,
            is_header,
            is_active: true,
            balance,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_build_node_orders_children_and_applies_convention() {
        let header = row("2000", DbAccountType::Liability, None, true, dec!(300));
        let payable = row("2200", DbAccountType::Liability, Some(header.id), false, dec!(100));
        let accrued = row("2100", DbAccountType::Liability, Some(header.id), false, dec!(200));
        let rows = vec![header.clone(), payable, accrued];

        let tree = AccountTree::new(rows.iter().map(to_node));
        let by_id: HashMap<Uuid, &accounts::Model> = rows.iter().map(|r| (r.id, r)).collect();

        let node = build_node(&tree, &by_id, header.id, DisplayConvention::DebitPositive).unwrap();
        assert_eq!(node.display_balance, dec!(-300));
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].code, "2100");
        assert_eq!(node.children[1].display_balance, dec!(-100));
    }

    #[test]
    fn test_build_node_unknown_root() {
        let tree = AccountTree::new(Vec::new());
        let by_id = HashMap::new();
        assert!(build_node(&tree, &by_id, Uuid::now_v7(), DisplayConvention::NormalSide).is_none());
    }

    #[test]
    fn test_leaf_balances_use_normal_side() {
        let cash = row("1110", DbAccountType::Asset, None, false, dec!(0));
        let revenue = row("4100", DbAccountType::Revenue, None, false, dec!(0));
        let sums = HashMap::from([
            (cash.id, (dec!(500), dec!(200))),
            (revenue.id, (dec!(0), dec!(300))),
        ]);

        let balances = leaf_balances(&[cash.clone(), revenue.clone()], &sums);
        assert_eq!(balances[&AccountId::from_uuid(cash.id)], dec!(300));
        assert_eq!(balances[&AccountId::from_uuid(revenue.id)], dec!(300));
    }
}
