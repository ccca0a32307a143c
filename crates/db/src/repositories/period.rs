//! Accounting period repository.
//!
//! Closing and reopening take an exclusive lock on `accounting_periods`.
//! Posting transactions read the covering period `FOR SHARE`, so a close
//! waits for in-flight postings and every later posting sees it.

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{info, warn};
use uuid::Uuid;

use tally_core::ledger::{ClosedPeriod, LedgerError, PeriodRules};

use crate::entities::accounting_periods;
use crate::error::ledger_error;

const LOCK_PERIODS_SQL: &str = "LOCK TABLE accounting_periods IN EXCLUSIVE MODE";

impl From<&accounting_periods::Model> for ClosedPeriod {
    fn from(model: &accounting_periods::Model) -> Self {
        Self {
            start_date: model.start_date,
            end_date: model.end_date,
        }
    }
}

/// Accounting period repository.
#[derive(Debug, Clone)]
pub struct PeriodRepository {
    db: DatabaseConnection,
}

impl PeriodRepository {
    /// Creates a new period repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Closes `[start_date, end_date]` to posting.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriodRange`, `PeriodOverlap` when a closed period
    /// shares a day with the range, or a storage error.
    pub async fn close_period(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        description: Option<&str>,
    ) -> Result<accounting_periods::Model, LedgerError> {
        let txn = self.db.begin().await.map_err(ledger_error)?;
        txn.execute_unprepared(LOCK_PERIODS_SQL)
            .await
            .map_err(ledger_error)?;

        let closed = closed_periods(&txn).await.map_err(ledger_error)?;
        PeriodRules::check_closable(start_date, end_date, &closed)?;

        let now = Utc::now().into();
        let period = accounting_periods::ActiveModel {
            id: Set(Uuid::now_v7()),
            start_date: Set(start_date),
            end_date: Set(end_date),
            is_closed: Set(true),
            description: Set(description.map(str::to_string)),
            closed_at: Set(now),
            reopened_at: Set(None),
            reopen_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ledger_error)?;

        txn.commit().await.map_err(ledger_error)?;

        info!(%start_date, %end_date, period_id = %period.id, "accounting period closed");
        Ok(period)
    }

    /// Reopens the closed period spanning exactly `[start_date, end_date]`.
    ///
    /// The row is kept with the reason and time for audit.
    ///
    /// # Errors
    ///
    /// Returns `PeriodReopenReasonRequired`, `PeriodNotFound`,
    /// `LaterPeriodClosed`, or a storage error.
    pub async fn reopen_period(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: &str,
    ) -> Result<accounting_periods::Model, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::PeriodReopenReasonRequired);
        }

        let txn = self.db.begin().await.map_err(ledger_error)?;
        txn.execute_unprepared(LOCK_PERIODS_SQL)
            .await
            .map_err(ledger_error)?;

        let period = accounting_periods::Entity::find()
            .filter(accounting_periods::Column::IsClosed.eq(true))
            .filter(accounting_periods::Column::StartDate.eq(start_date))
            .filter(accounting_periods::Column::EndDate.eq(end_date))
            .one(&txn)
            .await
            .map_err(ledger_error)?
            .ok_or(LedgerError::PeriodNotFound {
                start_date,
                end_date,
            })?;

        let closed = closed_periods(&txn).await.map_err(ledger_error)?;
        PeriodRules::check_reopenable(ClosedPeriod::from(&period), &closed, reason)?;

        let now = Utc::now().into();
        let mut active: accounting_periods::ActiveModel = period.into();
        active.is_closed = Set(false);
        active.reopened_at = Set(Some(now));
        active.reopen_reason = Set(Some(reason.trim().to_string()));
        active.updated_at = Set(now);
        let reopened = active.update(&txn).await.map_err(ledger_error)?;

        txn.commit().await.map_err(ledger_error)?;

        warn!(
            %start_date,
            %end_date,
            reason = reason.trim(),
            "accounting period reopened"
        );
        Ok(reopened)
    }

    /// The closed period containing `date`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn closed_period_for(
        &self,
        date: NaiveDate,
    ) -> Result<Option<ClosedPeriod>, LedgerError> {
        covering_period(&self.db, date).await.map_err(ledger_error)
    }

    /// Closed periods, earliest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_closed(&self) -> Result<Vec<accounting_periods::Model>, LedgerError> {
        accounting_periods::Entity::find()
            .filter(accounting_periods::Column::IsClosed.eq(true))
            .order_by_asc(accounting_periods::Column::StartDate)
            .all(&self.db)
            .await
            .map_err(ledger_error)
    }
}

/// Rejects a posting dated inside a closed period.
///
/// Holds a share lock on the covering row, so the period cannot be closed
/// underneath the calling transaction.
pub(crate) async fn ensure_period_open<C: ConnectionTrait>(
    conn: &C,
    entry_date: NaiveDate,
) -> Result<(), LedgerError> {
    let closed = accounting_periods::Entity::find()
        .filter(accounting_periods::Column::IsClosed.eq(true))
        .filter(accounting_periods::Column::StartDate.lte(entry_date))
        .filter(accounting_periods::Column::EndDate.gte(entry_date))
        .lock_shared()
        .one(conn)
        .await
        .map_err(ledger_error)?;

    PeriodRules::ensure_open(entry_date, closed.as_ref().map(ClosedPeriod::from))
}

async fn covering_period<C: ConnectionTrait>(
    conn: &C,
    date: NaiveDate,
) -> Result<Option<ClosedPeriod>, DbErr> {
    Ok(accounting_periods::Entity::find()
        .filter(accounting_periods::Column::IsClosed.eq(true))
        .filter(accounting_periods::Column::StartDate.lte(date))
        .filter(accounting_periods::Column::EndDate.gte(date))
        .one(conn)
        .await?
        .as_ref()
        .map(ClosedPeriod::from))
}

async fn closed_periods<C: ConnectionTrait>(conn: &C) -> Result<Vec<ClosedPeriod>, DbErr> {
    Ok(accounting_periods::Entity::find()
        .filter(accounting_periods::Column::IsClosed.eq(true))
        .order_by_asc(accounting_periods::Column::StartDate)
        .all(conn)
        .await?
        .iter()
        .map(ClosedPeriod::from)
        .collect())
}
