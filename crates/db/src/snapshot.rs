//! Read-only snapshots for balance queries and reconciliation.
//!
//! Readers run inside a `REPEATABLE READ READ ONLY` transaction so that a
//! rollup being rewritten by a concurrent posting is observed either wholly
//! before or wholly after that posting commits.
//!
//! # Usage
//!
//! ```ignore
//! use tally_db::snapshot::SnapshotExt;
//!
//! let snapshot = db.snapshot().await?;
//! let accounts = Accounts::find().all(snapshot.transaction()).await?;
//! snapshot.finish().await?;
//! ```

use sea_orm::{
    AccessMode, DatabaseConnection, DatabaseTransaction, DbErr, IsolationLevel, TransactionTrait,
};

/// A read-only transaction with a stable view of committed data.
pub struct ReadSnapshot {
    txn: DatabaseTransaction,
}

impl ReadSnapshot {
    /// Begins a `REPEATABLE READ READ ONLY` transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let txn = db
            .begin_with_config(
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            )
            .await?;
        Ok(Self { txn })
    }

    /// The transaction every snapshot query runs on.
    #[must_use]
    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Ends the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be closed.
    pub async fn finish(self) -> Result<(), DbErr> {
        self.txn.commit().await
    }
}

/// Extension trait for `DatabaseConnection` to open snapshots.
#[async_trait::async_trait]
pub trait SnapshotExt {
    /// Opens a read-only snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be opened.
    async fn snapshot(&self) -> Result<ReadSnapshot, DbErr>;
}

#[async_trait::async_trait]
impl SnapshotExt for DatabaseConnection {
    async fn snapshot(&self) -> Result<ReadSnapshot, DbErr> {
        ReadSnapshot::begin(self).await
    }
}
