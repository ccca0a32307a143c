//! Account balance calculations.
//!
//! Stored balances are always in the account's normal sign:
//! - Asset/Expense: debit - credit
//! - Liability/Equity/Revenue: credit - debit
//!
//! Presentation conventions are applied on read only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::AccountId;

use crate::ledger::types::{AccountType, NormalBalance};

/// Accumulates posted line totals for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    /// The account ID.
    pub account_id: AccountId,
    /// Side the account increases on.
    pub normal_balance: NormalBalance,
    /// Total debit amount.
    pub debit_total: Decimal,
    /// Total credit amount.
    pub credit_total: Decimal,
}

impl AccountBalance {
    /// Creates an empty balance for an account of `account_type`.
    #[must_use]
    pub fn new(account_id: AccountId, account_type: AccountType) -> Self {
        Self {
            account_id,
            normal_balance: account_type.normal_balance(),
            debit_total: Decimal::ZERO,
            credit_total: Decimal::ZERO,
        }
    }

    /// Adds one line's columns.
    pub fn add_line(&mut self, debit: Decimal, credit: Decimal) {
        self.debit_total += debit;
        self.credit_total += credit;
    }

    /// Net balance in the account's normal sign.
    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.normal_balance
            .signed_balance(self.debit_total, self.credit_total)
    }
}

/// How balances are presented to readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayConvention {
    /// Positive means "more of what the account normally holds".
    #[default]
    NormalSide,
    /// Positive means net debit; credit-normal accounts are negated.
    DebitPositive,
}

impl DisplayConvention {
    /// Converts a stored (normal-sign) balance for presentation.
    #[must_use]
    pub fn present(self, account_type: AccountType, stored: Decimal) -> Decimal {
        match (self, account_type.normal_balance()) {
            (Self::NormalSide, _) | (Self::DebitPositive, NormalBalance::Debit) => stored,
            (Self::DebitPositive, NormalBalance::Credit) => -stored,
        }
    }
}

/// Running balance for one line in an account's ledger.
///
/// - current_balance[N] = previous_balance[N] + change[N]
/// - previous_balance[N] = current_balance[N-1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningBalance {
    /// 1-based position within the listing.
    pub sequence: i64,
    /// Balance before this line.
    pub previous_balance: Decimal,
    /// Balance after this line.
    pub current_balance: Decimal,
}

impl RunningBalance {
    /// Running balance for the first listed line, starting from `opening`.
    #[must_use]
    pub fn first_line(opening: Decimal, balance_change: Decimal) -> Self {
        Self {
            sequence: 1,
            previous_balance: opening,
            current_balance: opening + balance_change,
        }
    }

    /// Running balance for the line after `previous`.
    #[must_use]
    pub fn next_line(previous: &Self, balance_change: Decimal) -> Self {
        Self {
            sequence: previous.sequence + 1,
            previous_balance: previous.current_balance,
            current_balance: previous.current_balance + balance_change,
        }
    }

    /// Builds the chain for a sequence of changes.
    #[must_use]
    pub fn chain(opening: Decimal, changes: &[Decimal]) -> Vec<Self> {
        let mut out: Vec<Self> = Vec::with_capacity(changes.len());
        for change in changes {
            let next = match out.last() {
                Some(prev) => Self::next_line(prev, *change),
                None => Self::first_line(opening, *change),
            };
            out.push(next);
        }
        out
    }
}
