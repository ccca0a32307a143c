//! Posting requests as sent by source modules.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::types::{EntryType, SourceType};

/// One line of a posting request, addressed by account code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTemplate {
    /// Chart-of-accounts code.
    pub account_code: String,
    /// Debit or credit.
    pub entry_type: EntryType,
    /// Positive amount.
    pub amount: Decimal,
    /// Optional line description.
    pub description: Option<String>,
}

impl LineTemplate {
    /// A debit line.
    #[must_use]
    pub fn debit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            entry_type: EntryType::Debit,
            amount,
            description: None,
        }
    }

    /// A credit line.
    #[must_use]
    pub fn credit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            entry_type: EntryType::Credit,
            amount,
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// `RequestPosting` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingRequest {
    /// Originating business event type.
    pub source_type: SourceType,
    /// Originating record; `None` only for manual entries.
    pub source_id: Option<i64>,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Entry description.
    pub description: String,
    /// Lines by account code.
    pub lines: Vec<LineTemplate>,
}

impl PostingRequest {
    /// Sum of debit template amounts.
    #[must_use]
    pub fn total_debit(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.entry_type == EntryType::Debit)
            .map(|l| l.amount)
            .sum()
    }

    /// The source key for non-manual requests.
    #[must_use]
    pub fn source_key(&self) -> Option<SourceKey> {
        match (self.source_type, self.source_id) {
            (SourceType::Manual, _) | (_, None) => None,
            (source_type, Some(source_id)) => Some(SourceKey {
                source_type,
                source_id,
            }),
        }
    }
}

/// `(source_type, source_id)` of a non-manual source transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    /// Source type.
    pub source_type: SourceType,
    /// Source record.
    pub source_id: i64,
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.source_type, self.source_id)
    }
}
