//! Double-entry bookkeeping logic.
//!
//! This module implements the journal ledger rules:
//! - Closed vocabularies (account types, source types, entry statuses)
//! - Draft and posting validation
//! - Entry numbering
//! - Void by compensating entry
//! - Closed accounting periods
//! - Error types for ledger operations

pub mod error;
pub mod numbering;
pub mod period;
pub mod reversal;
pub mod service;
pub mod types;

#[cfg(test)]
mod reversal_props;
#[cfg(test)]
mod service_props;

pub use error::{LedgerError, ReferenceKind};
pub use numbering::EntryNumber;
pub use period::{ClosedPeriod, PeriodRules};
pub use reversal::{CompensatingEntry, ReversalService, VoidTarget};
pub use service::LedgerService;
pub use types::{
    AMOUNT_LIMIT, AccountInfo, AccountType, EntryStatus, EntryTotals, EntryType, JournalDraft,
    LineInput, NormalBalance, ResolvedLine, SourceType,
};
