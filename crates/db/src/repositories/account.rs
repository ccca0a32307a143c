//! Chart of accounts repository.
//!
//! Accounts are created once during setup and never deleted; deactivation
//! is the only way to retire one. The balance column is written solely by
//! the balance synchronizer.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use tracing::info;
use uuid::Uuid;

use tally_core::balance::{AccountNode, AccountTree, HierarchyIssue};
use tally_core::ledger::{AccountInfo, AccountType};
use tally_shared::types::AccountId;

use crate::entities::{accounts, journal_lines};
use crate::error::is_unique_violation;

/// Error types for chart-of-accounts operations.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Account not found.
    #[error("Account not found: {0}")]
    NotFound(Uuid),

    /// Account code already exists.
    #[error("Account code already exists: {0}")]
    DuplicateCode(String),

    /// Blank account code.
    #[error("Account code must not be empty")]
    EmptyCode,

    /// The account cannot be placed where requested.
    #[error(transparent)]
    Hierarchy(HierarchyIssue),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<HierarchyIssue> for AccountError {
    fn from(issue: HierarchyIssue) -> Self {
        match issue {
            HierarchyIssue::DuplicateCode { code } => Self::DuplicateCode(code),
            other => Self::Hierarchy(other),
        }
    }
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct CreateAccountInput {
    /// Stable business key.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Account type; must equal the parent's.
    pub account_type: AccountType,
    /// Parent header account.
    pub parent_id: Option<Uuid>,
    /// Aggregation node that never receives lines.
    pub is_header: bool,
}

/// Chart-of-accounts repository.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    db: DatabaseConnection,
    max_depth: usize,
}

impl AccountRepository {
    /// Creates a new account repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection, max_depth: usize) -> Self {
        Self { db, max_depth }
    }

    /// Creates an account with a zero balance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The code is blank or already taken
    /// - The parent does not exist, is not a header, or has another type
    /// - The account would sit deeper than the configured maximum
    pub async fn create_account(
        &self,
        input: CreateAccountInput,
    ) -> Result<accounts::Model, AccountError> {
        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(AccountError::EmptyCode);
        }

        let tree = load_account_tree(&self.db).await?;
        tree.check_new_account(
            &code,
            input.parent_id.map(AccountId::from_uuid),
            input.account_type,
            self.max_depth,
        )?;

        let now = Utc::now().into();
        let account = accounts::ActiveModel {
            id: Set(AccountId::new().into_inner()),
            code: Set(code.clone()),
            name: Set(input.name),
            account_type: Set(input.account_type.into()),
            parent_id: Set(input.parent_id),
            is_header: Set(input.is_header),
            is_active: Set(true),
            balance: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let account = account.insert(&self.db).await.map_err(|e| {
            if is_unique_violation(&e, "accounts_code_key") {
                AccountError::DuplicateCode(code.clone())
            } else {
                AccountError::Database(e)
            }
        })?;

        info!(
            account_id = %account.id,
            code = %account.code,
            account_type = %input.account_type,
            is_header = account.is_header,
            "account created"
        );
        Ok(account)
    }

    /// Soft-disables an account. Existing lines stay; new lines are refused.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the update fails.
    pub async fn deactivate(&self, account_id: Uuid) -> Result<accounts::Model, AccountError> {
        let account = self.find_account_by_id(account_id).await?;
        if !account.is_active {
            return Ok(account);
        }

        let mut active: accounts::ActiveModel = account.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&self.db).await?;

        info!(account_id = %updated.id, code = %updated.code, "account deactivated");
        Ok(updated)
    }

    /// Finds an account by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn find_account_by_id(
        &self,
        account_id: Uuid,
    ) -> Result<accounts::Model, AccountError> {
        accounts::Entity::find_by_id(account_id)
            .one(&self.db)
            .await?
            .ok_or(AccountError::NotFound(account_id))
    }

    /// Finds an account by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_account_by_code(
        &self,
        code: &str,
    ) -> Result<Option<accounts::Model>, AccountError> {
        Ok(accounts::Entity::find()
            .filter(accounts::Column::Code.eq(code))
            .one(&self.db)
            .await?)
    }

    /// Lists accounts ordered by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_accounts(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<accounts::Model>, AccountError> {
        let mut query = accounts::Entity::find();
        if !include_inactive {
            query = query.filter(accounts::Column::IsActive.eq(true));
        }
        Ok(query.order_by_asc(accounts::Column::Code).all(&self.db).await?)
    }

    /// Reports every structural problem in the stored chart of accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn validate_hierarchy(&self) -> Result<Vec<HierarchyIssue>, AccountError> {
        let tree = load_account_tree(&self.db).await?;

        let with_lines: HashSet<AccountId> = journal_lines::Entity::find()
            .select_only()
            .column(journal_lines::Column::AccountId)
            .distinct()
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await?
            .into_iter()
            .map(AccountId::from_uuid)
            .collect();

        Ok(tree.validate(self.max_depth, &with_lines))
    }
}

/// Loads every account into an [`AccountTree`].
async fn load_account_tree<C: ConnectionTrait>(
    conn: &C,
) -> Result<AccountTree, DbErr> {
    let rows = accounts::Entity::find().all(conn).await?;
    Ok(AccountTree::new(rows.iter().map(to_node)))
}

/// Loads `ids` and every account above them into an [`AccountTree`].
///
/// The parent chain is walked in the database; `UNION` stops on a cycle.
pub(crate) async fn load_ancestry<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<AccountTree, DbErr> {
    if ids.is_empty() {
        return Ok(AccountTree::new(std::iter::empty()));
    }

    let placeholders = (1..=ids.len())
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r"
WITH RECURSIVE chain (id, parent_id) AS (
    SELECT id, parent_id FROM accounts WHERE id IN ({placeholders})
    UNION
    SELECT a.id, a.parent_id FROM accounts a JOIN chain c ON a.id = c.parent_id
)
SELECT accounts.* FROM accounts WHERE id IN (SELECT id FROM chain)
"
    );

    let rows = accounts::Entity::find()
        .from_raw_sql(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            ids.iter().map(|id| (*id).into()),
        ))
        .all(conn)
        .await?;
    Ok(AccountTree::new(rows.iter().map(to_node)))
}

/// Hierarchy view of an account row.
pub(crate) fn to_node(model: &accounts::Model) -> AccountNode {
    AccountNode {
        id: AccountId::from_uuid(model.id),
        code: model.code.clone(),
        parent_id: model.parent_id.map(AccountId::from_uuid),
        account_type: model.account_type.into(),
        is_header: model.is_header,
    }
}

/// Posting-eligibility view of an account row.
pub(crate) fn to_info(model: &accounts::Model) -> AccountInfo {
    AccountInfo {
        id: model.id,
        code: model.code.clone(),
        account_type: model.account_type.into(),
        is_active: model.is_active,
        is_header: model.is_header,
    }
}
