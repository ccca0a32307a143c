//! Ledger error types for validation and state errors.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::AppError;
use thiserror::Error;
use uuid::Uuid;

use super::types::{EntryStatus, SourceType};

/// What a dangling reference pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// An account code in a posting template.
    AccountCode,
    /// An account ID on a journal line.
    Account,
    /// The originating business record.
    Source(SourceType),
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccountCode => f.write_str("account code"),
            Self::Account => f.write_str("account"),
            Self::Source(source_type) => write!(f, "{source_type} record"),
        }
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// A draft needs at least one line, a posted entry at least two.
    #[error("Journal entry needs at least {required} lines, got {actual}")]
    InsufficientLines {
        /// Minimum line count.
        required: usize,
        /// Lines supplied.
        actual: usize,
    },

    /// Debits and credits differ by at least the tolerance.
    #[error("Journal entry is not balanced. Debit: {debit}, Credit: {credit}")]
    UnbalancedEntry {
        /// Total debit.
        debit: Decimal,
        /// Total credit.
        credit: Decimal,
    },

    /// Line amount cannot be zero.
    #[error("Line {line}: amount cannot be zero")]
    ZeroAmount {
        /// 1-based line number.
        line: usize,
    },

    /// Line amount cannot be negative.
    #[error("Line {line}: amount cannot be negative")]
    NegativeAmount {
        /// 1-based line number.
        line: usize,
    },

    /// Line amount has more than two decimal places.
    #[error("Line {line}: amount {amount} has more than 2 decimal places")]
    ExcessPrecision {
        /// 1-based line number.
        line: usize,
        /// The offending amount.
        amount: Decimal,
    },

    /// Line amount does not fit the monetary columns.
    #[error("Line {line}: amount {amount} exceeds the largest postable amount")]
    AmountOutOfRange {
        /// 1-based line number.
        line: usize,
        /// The offending amount.
        amount: Decimal,
    },

    /// Debit or credit total does not fit the monetary columns.
    #[error("Journal entry totals exceed the largest postable amount")]
    TotalOutOfRange,

    /// A non-manual entry was submitted without its source record.
    #[error("{0} entries require a source id")]
    MissingSourceId(SourceType),

    /// A manual entry was submitted with a source record.
    #[error("Manual entries cannot reference source id {0}")]
    UnexpectedSourceId(i64),

    /// Voiding requires a reason.
    #[error("Void reason is required")]
    VoidReasonRequired,

    // ========== Reference Errors ==========
    /// A referenced record does not exist.
    #[error("Dangling reference: {kind} {reference} does not exist")]
    DanglingReference {
        /// What kind of record was referenced.
        kind: ReferenceKind,
        /// The reference as given.
        reference: String,
    },

    /// Account is inactive and cannot be posted to.
    #[error("Account {code} is inactive")]
    AccountInactive {
        /// The account ID.
        account_id: Uuid,
        /// The account code.
        code: String,
    },

    /// Header accounts only aggregate their children.
    #[error("Account {code} is a header account and cannot receive lines")]
    HeaderAccountPosting {
        /// The account ID.
        account_id: Uuid,
        /// The account code.
        code: String,
    },

    // ========== Approval Gate ==========
    /// The source record has no approved approval request.
    #[error("{source_type} {source_id} is not approved (latest request: {latest})")]
    NotApproved {
        /// Source type.
        source_type: SourceType,
        /// Source record.
        source_id: i64,
        /// Latest request status, or "none".
        latest: String,
    },

    // ========== Accounting Periods ==========
    /// The entry date falls inside a closed period.
    #[error("Cannot post on {entry_date}: period {start_date} to {end_date} is closed")]
    PeriodClosed {
        /// Date of the rejected entry.
        entry_date: NaiveDate,
        /// First day of the closed period.
        start_date: NaiveDate,
        /// Last day of the closed period.
        end_date: NaiveDate,
    },

    /// A period must end on or after its start.
    #[error("Period end {end_date} is before its start {start_date}")]
    InvalidPeriodRange {
        /// Requested start.
        start_date: NaiveDate,
        /// Requested end.
        end_date: NaiveDate,
    },

    /// The range overlaps a period already closed.
    #[error("Period overlaps closed period {start_date} to {end_date}")]
    PeriodOverlap {
        /// Start of the closed period.
        start_date: NaiveDate,
        /// End of the closed period.
        end_date: NaiveDate,
    },

    /// No closed period has exactly this range.
    #[error("No closed period from {start_date} to {end_date}")]
    PeriodNotFound {
        /// Requested start.
        start_date: NaiveDate,
        /// Requested end.
        end_date: NaiveDate,
    },

    /// Reopening requires a reason.
    #[error("Reopen reason is required")]
    PeriodReopenReasonRequired,

    /// Later closed periods must be reopened first.
    #[error("Period {start_date} to {end_date} is closed after it and must be reopened first")]
    LaterPeriodClosed {
        /// Start of the later period.
        start_date: NaiveDate,
        /// End of the later period.
        end_date: NaiveDate,
    },

    // ========== Entry State Errors ==========
    /// Journal entry not found.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(Uuid),

    /// Status change outside DRAFT -> POSTED / DRAFT -> VOID.
    #[error("Cannot move journal entry from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: EntryStatus,
        /// Requested status.
        to: EntryStatus,
    },

    /// Only posted entries can be voided.
    #[error("Journal entry {entry_id} is {status}; only posted entries can be voided")]
    NotPosted {
        /// The entry.
        entry_id: Uuid,
        /// Its current status.
        status: EntryStatus,
    },

    /// The entry already has a compensating entry.
    #[error("Journal entry {entry_id} was already voided by {reversed_by}")]
    AlreadyVoided {
        /// The entry.
        entry_id: Uuid,
        /// The compensating entry.
        reversed_by: Uuid,
    },

    /// Compensating entries are final.
    #[error("Journal entry {0} is a compensating entry and cannot be voided")]
    CannotVoidCompensating(Uuid),

    // ========== Concurrency Errors ==========
    /// Serialization failure or deadlock that survived all retries.
    #[error("Concurrent modification detected, please retry: {0}")]
    ConcurrentModification(String),

    // ========== Database Errors ==========
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientLines { .. } => "INSUFFICIENT_LINES",
            Self::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            Self::ZeroAmount { .. } => "ZERO_AMOUNT",
            Self::NegativeAmount { .. } => "NEGATIVE_AMOUNT",
            Self::ExcessPrecision { .. } => "EXCESS_PRECISION",
            Self::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            Self::TotalOutOfRange => "TOTAL_OUT_OF_RANGE",
            Self::MissingSourceId(_) => "MISSING_SOURCE_ID",
            Self::UnexpectedSourceId(_) => "UNEXPECTED_SOURCE_ID",
            Self::VoidReasonRequired => "VOID_REASON_REQUIRED",
            Self::DanglingReference { .. } => "DANGLING_REFERENCE",
            Self::AccountInactive { .. } => "ACCOUNT_INACTIVE",
            Self::HeaderAccountPosting { .. } => "HEADER_ACCOUNT_POSTING",
            Self::NotApproved { .. } => "NOT_APPROVED",
            Self::PeriodClosed { .. } => "PERIOD_CLOSED",
            Self::InvalidPeriodRange { .. } => "INVALID_PERIOD_RANGE",
            Self::PeriodOverlap { .. } => "PERIOD_OVERLAP",
            Self::PeriodNotFound { .. } => "PERIOD_NOT_FOUND",
            Self::PeriodReopenReasonRequired => "PERIOD_REOPEN_REASON_REQUIRED",
            Self::LaterPeriodClosed { .. } => "LATER_PERIOD_CLOSED",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::NotPosted { .. } => "NOT_POSTED",
            Self::AlreadyVoided { .. } => "ALREADY_VOIDED",
            Self::CannotVoidCompensating(_) => "CANNOT_VOID_COMPENSATING",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::InsufficientLines { .. }
            | Self::UnbalancedEntry { .. }
            | Self::ZeroAmount { .. }
            | Self::NegativeAmount { .. }
            | Self::ExcessPrecision { .. }
            | Self::AmountOutOfRange { .. }
            | Self::TotalOutOfRange
            | Self::MissingSourceId(_)
            | Self::UnexpectedSourceId(_)
            | Self::VoidReasonRequired
            | Self::InvalidPeriodRange { .. }
            | Self::PeriodReopenReasonRequired => 400,

            // 404 Not Found
            Self::EntryNotFound(_) | Self::PeriodNotFound { .. } => 404,

            // 409 Conflict - state and concurrency errors
            Self::InvalidStatusTransition { .. }
            | Self::NotPosted { .. }
            | Self::AlreadyVoided { .. }
            | Self::CannotVoidCompensating(_)
            | Self::PeriodOverlap { .. }
            | Self::LaterPeriodClosed { .. }
            | Self::ConcurrentModification(_) => 409,

            // 422 Unprocessable - business rule violations
            Self::DanglingReference { .. }
            | Self::AccountInactive { .. }
            | Self::HeaderAccountPosting { .. }
            | Self::NotApproved { .. }
            | Self::PeriodClosed { .. } => 422,

            // 500 Internal Server Error
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err.http_status_code() {
            400 => Self::Validation(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            422 => Self::BusinessRule(message),
            _ => Self::Internal(message),
        }
    }
}
