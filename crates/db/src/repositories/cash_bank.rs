//! Cash and bank accounts.
//!
//! A cash/bank row mirrors the balance of one asset ledger account. The
//! mirror is written by the balance synchronizer only; this repository
//! links and reads mirrors.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use tally_shared::types::CashBankId;

use crate::entities::accounts;
use crate::entities::cash_banks;
use crate::entities::sea_orm_active_enums::AccountType;
use crate::error::is_unique_violation;

/// Error types for cash/bank operations.
#[derive(Debug, thiserror::Error)]
pub enum CashBankError {
    /// Cash/bank row not found.
    #[error("Cash/bank account not found: {0}")]
    NotFound(Uuid),

    /// Ledger account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Only active, non-header asset accounts can be mirrored.
    #[error("Account {code} must be an active, non-header asset account")]
    NotAssetLeaf {
        /// The account code.
        code: String,
    },

    /// The account already has a mirror.
    #[error("Account {code} is already linked to a cash/bank account")]
    AlreadyLinked {
        /// The account code.
        code: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Input for linking a cash/bank account.
#[derive(Debug, Clone)]
pub struct CreateCashBankInput {
    /// Display name.
    pub name: String,
    /// External account number.
    pub account_number: Option<String>,
    /// Ledger account mirrored.
    pub account_id: Uuid,
}

/// Cash/bank repository.
#[derive(Debug, Clone)]
pub struct CashBankRepository {
    db: DatabaseConnection,
}

impl CashBankRepository {
    /// Creates a new cash/bank repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Links a cash/bank row to an asset account.
    ///
    /// The mirror starts at the account's current balance. The account row
    /// is locked so a concurrent posting cannot slip between the read and
    /// the insert.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound`, `NotAssetLeaf` or `AlreadyLinked`.
    pub async fn link(
        &self,
        input: CreateCashBankInput,
    ) -> Result<cash_banks::Model, CashBankError> {
        let txn = self.db.begin().await?;

        let account = accounts::Entity::find_by_id(input.account_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(CashBankError::AccountNotFound(input.account_id))?;

        if account.account_type != AccountType::Asset || account.is_header || !account.is_active {
            return Err(CashBankError::NotAssetLeaf { code: account.code });
        }

        let now = Utc::now().into();
        let inserted = cash_banks::ActiveModel {
            id: Set(CashBankId::new().into_inner()),
            name: Set(input.name),
            account_number: Set(input.account_number),
            account_id: Set(account.id),
            balance: Set(account.balance),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "cash_banks_account_id_key") {
                CashBankError::AlreadyLinked {
                    code: account.code.clone(),
                }
            } else {
                CashBankError::Database(e)
            }
        })?;

        txn.commit().await?;

        info!(
            cash_bank_id = %inserted.id,
            account_code = %account.code,
            balance = %inserted.balance,
            "cash/bank account linked"
        );
        Ok(inserted)
    }

    /// Finds a cash/bank row by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    pub async fn find_by_id(&self, id: Uuid) -> Result<cash_banks::Model, CashBankError> {
        cash_banks::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(CashBankError::NotFound(id))
    }

    /// Finds the mirror of a ledger account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<cash_banks::Model>, CashBankError> {
        Ok(cash_banks::Entity::find()
            .filter(cash_banks::Column::AccountId.eq(account_id))
            .one(&self.db)
            .await?)
    }

    /// Lists cash/bank rows by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<cash_banks::Model>, CashBankError> {
        Ok(cash_banks::Entity::find()
            .order_by_asc(cash_banks::Column::Name)
            .all(&self.db)
            .await?)
    }
}
