//! Classification of storage errors into domain errors.
//!
//! Postgres reports serialization failures (`40001`) and deadlocks
//! (`40P01`) as ordinary query errors. They are the only storage errors a
//! caller may retry transparently.

use sea_orm::{DbErr, RuntimeErr};
use sqlx::error::DatabaseError;

use tally_core::approval::ApprovalError;
use tally_core::ledger::LedgerError;

/// SQLSTATE for `serialization_failure`.
pub const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for `deadlock_detected`.
pub const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

fn database_error(err: &DbErr) -> Option<&dyn DatabaseError> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(e)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(e)))
        | DbErr::Conn(RuntimeErr::SqlxError(sqlx::Error::Database(e))) => Some(e.as_ref()),
        _ => None,
    }
}

/// Returns the SQLSTATE of a database error, if any.
#[must_use]
pub fn sql_state(err: &DbErr) -> Option<String> {
    database_error(err)
        .and_then(|e| e.code())
        .map(std::borrow::Cow::into_owned)
}

/// True for serialization failures and deadlocks.
#[must_use]
pub fn is_retryable(err: &DbErr) -> bool {
    matches!(
        sql_state(err).as_deref(),
        Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
    )
}

/// True when `err` is a unique violation of `constraint`.
#[must_use]
pub fn is_unique_violation(err: &DbErr, constraint: &str) -> bool {
    database_error(err).is_some_and(|e| {
        e.code().as_deref() == Some(UNIQUE_VIOLATION) && e.constraint() == Some(constraint)
    })
}

/// Maps a storage error into a ledger error.
#[must_use]
pub fn ledger_error(err: DbErr) -> LedgerError {
    if is_retryable(&err) {
        LedgerError::ConcurrentModification(err.to_string())
    } else {
        LedgerError::Database(err.to_string())
    }
}

/// Maps a storage error into an approval error.
#[must_use]
pub fn approval_error(err: DbErr) -> ApprovalError {
    if is_retryable(&err) {
        ApprovalError::ConcurrentModification(err.to_string())
    } else {
        ApprovalError::Database(err.to_string())
    }
}
