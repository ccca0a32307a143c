//! Ledger domain types for journal entry creation and validation.
//!
//! This module defines the closed vocabularies of the ledger (account types,
//! source types, entry statuses) and the line/total types that flow from a
//! draft into a posted journal entry.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::LedgerError;

/// Exclusive upper bound for a line amount or an entry total.
///
/// Monetary columns are NUMERIC(20,2): at most 18 integer digits.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

/// Entry type: either Debit or Credit.
///
/// In double-entry bookkeeping:
/// - Debits increase asset/expense accounts, decrease liability/equity/revenue accounts
/// - Credits decrease asset/expense accounts, increase liability/equity/revenue accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Debit entry.
    Debit,
    /// Credit entry.
    Credit,
}

impl EntryType {
    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }

    /// Splits an amount into `(debit, credit)` columns.
    #[must_use]
    pub fn split(self, amount: Decimal) -> (Decimal, Decimal) {
        match self {
            Self::Debit => (amount, Decimal::ZERO),
            Self::Credit => (Decimal::ZERO, amount),
        }
    }
}

/// The side on which an account type naturally increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NormalBalance {
    /// Assets, Expenses.
    Debit,
    /// Liabilities, Equity, Revenue.
    Credit,
}

impl NormalBalance {
    /// Signed balance from debit/credit totals.
    ///
    /// - Debit-normal: debit - credit
    /// - Credit-normal: credit - debit
    #[must_use]
    pub fn signed_balance(self, debit_total: Decimal, credit_total: Decimal) -> Decimal {
        match self {
            Self::Debit => debit_total - credit_total,
            Self::Credit => credit_total - debit_total,
        }
    }
}

/// Chart of accounts classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    /// Resources owned.
    Asset,
    /// Obligations owed.
    Liability,
    /// Owner's residual interest.
    Equity,
    /// Income earned.
    Revenue,
    /// Costs incurred.
    Expense,
}

impl AccountType {
    /// Every account type, in chart order.
    pub const ALL: [Self; 5] = [
        Self::Asset,
        Self::Liability,
        Self::Equity,
        Self::Revenue,
        Self::Expense,
    ];

    /// Returns the normal balance side for this account type.
    #[must_use]
    pub const fn normal_balance(self) -> NormalBalance {
        match self {
            Self::Asset | Self::Expense => NormalBalance::Debit,
            Self::Liability | Self::Equity | Self::Revenue => NormalBalance::Credit,
        }
    }

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "ASSET",
            Self::Liability => "LIABILITY",
            Self::Equity => "EQUITY",
            Self::Revenue => "REVENUE",
            Self::Expense => "EXPENSE",
        }
    }

    /// Parses the storage representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ASSET" => Some(Self::Asset),
            "LIABILITY" => Some(Self::Liability),
            "EQUITY" => Some(Self::Equity),
            "REVENUE" => Some(Self::Revenue),
            "EXPENSE" => Some(Self::Expense),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The business event that originated a journal entry.
///
/// Adding a variant forces every `match` on it to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    /// Sales invoice.
    Sale,
    /// Purchase / vendor bill.
    Purchase,
    /// Incoming or outgoing payment.
    Payment,
    /// Cash/bank transfer.
    Transfer,
    /// Manual journal, no originating record.
    Manual,
}

impl SourceType {
    /// Every source type.
    pub const ALL: [Self; 5] = [
        Self::Sale,
        Self::Purchase,
        Self::Payment,
        Self::Transfer,
        Self::Manual,
    ];

    /// Whether entries of this type reference an originating record.
    #[must_use]
    pub const fn requires_source_id(self) -> bool {
        match self {
            Self::Sale | Self::Purchase | Self::Payment | Self::Transfer => true,
            Self::Manual => false,
        }
    }

    /// Whether postings of this type must pass the approval gate.
    #[must_use]
    pub const fn requires_approval(self) -> bool {
        match self {
            Self::Sale | Self::Purchase | Self::Payment | Self::Transfer => true,
            Self::Manual => false,
        }
    }

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "SALE",
            Self::Purchase => "PURCHASE",
            Self::Payment => "PAYMENT",
            Self::Transfer => "TRANSFER",
            Self::Manual => "MANUAL",
        }
    }

    /// Parses the storage representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SALE" => Some(Self::Sale),
            "PURCHASE" => Some(Self::Purchase),
            "PAYMENT" => Some(Self::Payment),
            "TRANSFER" => Some(Self::Transfer),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Journal entry lifecycle status.
///
/// ```text
/// DRAFT -> POSTED
/// DRAFT -> VOID
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    /// Lines may still change; no ledger effect.
    Draft,
    /// Counts toward balances; immutable.
    Posted,
    /// Discarded draft; immutable, no ledger effect.
    Void,
}

impl EntryStatus {
    /// Returns true if lines of the entry may be changed.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Returns true if the entry's lines count toward account balances.
    #[must_use]
    pub const fn affects_balances(self) -> bool {
        matches!(self, Self::Posted)
    }

    /// Returns true if `self -> next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Posted) | (Self::Draft, Self::Void)
        )
    }

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Void => "VOID",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for a single journal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInput {
    /// The account to post to.
    pub account_id: Uuid,
    /// Whether this is a debit or credit line.
    pub entry_type: EntryType,
    /// The amount (must be positive).
    pub amount: Decimal,
    /// Optional line description.
    pub description: Option<String>,
}

/// A draft journal entry as submitted to the ledger.
#[derive(Debug, Clone)]
pub struct JournalDraft {
    /// Originating business event type.
    pub source_type: SourceType,
    /// Originating record, `None` for manual entries.
    pub source_id: Option<i64>,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Entry description.
    pub description: String,
    /// The lines.
    pub lines: Vec<LineInput>,
}

/// A validated line with its position and debit/credit columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    /// The account to post to.
    pub account_id: Uuid,
    /// 1-based order within the entry.
    pub line_number: i32,
    /// Debit amount (0 if credit).
    pub debit: Decimal,
    /// Credit amount (0 if debit).
    pub credit: Decimal,
    /// Optional line description.
    pub description: Option<String>,
}

/// Entry totals, always recomputed from lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTotals {
    /// Sum of debit columns.
    pub total_debit: Decimal,
    /// Sum of credit columns.
    pub total_credit: Decimal,
}

impl EntryTotals {
    /// Creates totals from debit and credit sums.
    #[must_use]
    pub const fn new(total_debit: Decimal, total_credit: Decimal) -> Self {
        Self {
            total_debit,
            total_credit,
        }
    }

    /// Sums the debit/credit columns of resolved lines.
    ///
    /// # Errors
    ///
    /// Returns `TotalOutOfRange` when either total reaches `AMOUNT_LIMIT`.
    pub fn from_lines(lines: &[ResolvedLine]) -> Result<Self, LedgerError> {
        lines
            .iter()
            .try_fold(Self::default(), |acc, line| acc.checked_add(line.debit, line.credit))
    }

    /// Adds one line's debit and credit columns.
    ///
    /// # Errors
    ///
    /// Returns `TotalOutOfRange` when either total reaches `AMOUNT_LIMIT`.
    pub fn checked_add(self, debit: Decimal, credit: Decimal) -> Result<Self, LedgerError> {
        Ok(Self {
            total_debit: bounded_sum(self.total_debit, debit)?,
            total_credit: bounded_sum(self.total_credit, credit)?,
        })
    }

    /// Returns debit minus credit.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.total_debit - self.total_credit
    }

    /// `|debit - credit| < tolerance`.
    #[must_use]
    pub fn is_balanced(&self, tolerance: Decimal) -> bool {
        self.difference().abs() < tolerance
    }
}

impl Default for EntryTotals {
    fn default() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }
}

fn bounded_sum(total: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
    total
        .checked_add(amount)
        .filter(|sum| *sum < AMOUNT_LIMIT)
        .ok_or(LedgerError::TotalOutOfRange)
}

/// Account facts needed to validate a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// The account ID.
    pub id: Uuid,
    /// Business key.
    pub code: String,
    /// Classification.
    pub account_type: AccountType,
    /// Whether the account is active.
    pub is_active: bool,
    /// Aggregation node that must never receive lines.
    pub is_header: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normal_balance_by_type() {
        assert_eq!(AccountType::Asset.normal_balance(), NormalBalance::Debit);
        assert_eq!(AccountType::Expense.normal_balance(), NormalBalance::Debit);
        assert_eq!(AccountType::Liability.normal_balance(), NormalBalance::Credit);
        assert_eq!(AccountType::Equity.normal_balance(), NormalBalance::Credit);
        assert_eq!(AccountType::Revenue.normal_balance(), NormalBalance::Credit);
    }

    #[test]
    fn test_signed_balance() {
        assert_eq!(
            NormalBalance::Debit.signed_balance(dec!(150), dec!(50)),
            dec!(100)
        );
        assert_eq!(
            NormalBalance::Credit.signed_balance(dec!(150), dec!(50)),
            dec!(-100)
        );
    }

    #[test]
    fn test_account_type_parse() {
        for account_type in AccountType::ALL {
            assert_eq!(AccountType::parse(account_type.as_str()), Some(account_type));
        }
        assert_eq!(AccountType::parse("asset"), Some(AccountType::Asset));
        assert_eq!(AccountType::parse("contra"), None);
    }

    #[test]
    fn test_source_type_parse() {
        for source_type in SourceType::ALL {
            assert_eq!(SourceType::parse(source_type.as_str()), Some(source_type));
        }
        assert_eq!(SourceType::parse("REVERSAL"), None);
    }

    #[test]
    fn test_only_manual_is_exempt() {
        for source_type in SourceType::ALL {
            let manual = source_type == SourceType::Manual;
            assert_eq!(source_type.requires_approval(), !manual);
            assert_eq!(source_type.requires_source_id(), !manual);
        }
    }

    #[test]
    fn test_entry_status_transitions() {
        assert!(EntryStatus::Draft.can_transition_to(EntryStatus::Posted));
        assert!(EntryStatus::Draft.can_transition_to(EntryStatus::Void));
        assert!(!EntryStatus::Posted.can_transition_to(EntryStatus::Void));
        assert!(!EntryStatus::Posted.can_transition_to(EntryStatus::Draft));
        assert!(!EntryStatus::Void.can_transition_to(EntryStatus::Posted));
        assert!(!EntryStatus::Draft.can_transition_to(EntryStatus::Draft));
    }

    #[test]
    fn test_only_posted_affects_balances() {
        assert!(EntryStatus::Posted.affects_balances());
        assert!(!EntryStatus::Draft.affects_balances());
        assert!(!EntryStatus::Void.affects_balances());
    }

    #[test]
    fn test_entry_type_split() {
        assert_eq!(EntryType::Debit.split(dec!(10)), (dec!(10), Decimal::ZERO));
        assert_eq!(EntryType::Credit.split(dec!(10)), (Decimal::ZERO, dec!(10)));
        assert_eq!(EntryType::Debit.opposite(), EntryType::Credit);
    }

    #[test]
    fn test_totals_tolerance() {
        let tolerance = dec!(0.01);
        assert!(EntryTotals::new(dec!(100.00), dec!(100.00)).is_balanced(tolerance));
        assert!(EntryTotals::new(dec!(100.004), dec!(100.00)).is_balanced(tolerance));
        assert!(!EntryTotals::new(dec!(100.01), dec!(100.00)).is_balanced(tolerance));
        assert!(!EntryTotals::new(dec!(500000), dec!(400000)).is_balanced(tolerance));
    }

    #[test]
    fn test_totals_from_lines() {
        let account = Uuid::new_v4();
        let lines = vec![
            ResolvedLine {
                account_id: account,
                line_number: 1,
                debit: dec!(70),
                credit: Decimal::ZERO,
                description: None,
            },
            ResolvedLine {
                account_id: account,
                line_number: 2,
                debit: Decimal::ZERO,
                credit: dec!(70),
                description: None,
            },
        ];
        let totals = EntryTotals::from_lines(&lines).unwrap();
        assert_eq!(totals.total_debit, dec!(70));
        assert_eq!(totals.total_credit, dec!(70));
        assert_eq!(totals.difference(), Decimal::ZERO);
    }

    #[test]
    fn test_amount_limit_is_eighteen_digits() {
        assert_eq!(AMOUNT_LIMIT, dec!(1000000000000000000));
    }

    #[test]
    fn test_totals_refuse_overflow() {
        let near = AMOUNT_LIMIT - dec!(0.01);
        let totals = EntryTotals::default().checked_add(near, Decimal::ZERO).unwrap();
        assert_eq!(totals.total_debit, near);

        assert!(matches!(
            totals.checked_add(dec!(0.01), Decimal::ZERO),
            Err(LedgerError::TotalOutOfRange)
        ));
        assert!(matches!(
            EntryTotals::new(Decimal::MAX, Decimal::ZERO).checked_add(Decimal::MAX, Decimal::ZERO),
            Err(LedgerError::TotalOutOfRange)
        ));
    }
}
