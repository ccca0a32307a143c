//! Ledger service for journal entry validation and resolution.
//!
//! Pure business logic: every check the ledger applies before a draft is
//! stored or an entry is posted. Persistence layers call into this with a
//! closure that looks up account facts inside their own transaction.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::{LedgerError, ReferenceKind};
use super::types::{
    AMOUNT_LIMIT, AccountInfo, EntryStatus, EntryTotals, JournalDraft, LineInput, ResolvedLine,
    SourceType,
};

/// Monetary columns are NUMERIC(20,2).
const MAX_SCALE: u32 = 2;

/// Ledger service for journal entry validation.
pub struct LedgerService;

impl LedgerService {
    /// Checks the source type / source id pairing.
    ///
    /// Manual entries have no source record; every other type must name one.
    ///
    /// # Errors
    ///
    /// Returns `MissingSourceId` or `UnexpectedSourceId`.
    pub fn validate_source(
        source_type: SourceType,
        source_id: Option<i64>,
    ) -> Result<(), LedgerError> {
        match (source_type.requires_source_id(), source_id) {
            (true, None) => Err(LedgerError::MissingSourceId(source_type)),
            (false, Some(id)) => Err(LedgerError::UnexpectedSourceId(id)),
            _ => Ok(()),
        }
    }

    /// Validates a draft for saving.
    ///
    /// Drafts may be unbalanced and reference accounts that are later
    /// deactivated; those rules apply at posting time. Structure is still
    /// enforced: source pairing, at least one line, positive 2-decimal amounts.
    ///
    /// # Errors
    ///
    /// Returns the first structural violation found.
    pub fn validate_draft(draft: &JournalDraft) -> Result<Vec<ResolvedLine>, LedgerError> {
        Self::validate_source(draft.source_type, draft.source_id)?;
        if draft.lines.is_empty() {
            return Err(LedgerError::InsufficientLines {
                required: 1,
                actual: 0,
            });
        }
        Self::resolve_lines(&draft.lines)
    }

    /// Validate and resolve a journal entry before posting.
    ///
    /// 1. Source id pairing
    /// 2. At least 2 lines
    /// 3. Each amount positive, non-zero, at most 2 decimals
    /// 4. Each account exists, is active and is not a header
    /// 5. |debit - credit| < tolerance
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if any check fails; nothing has been persisted.
    pub fn validate_and_resolve<A>(
        draft: &JournalDraft,
        tolerance: Decimal,
        account_lookup: A,
    ) -> Result<(Vec<ResolvedLine>, EntryTotals), LedgerError>
    where
        A: Fn(Uuid) -> Option<AccountInfo>,
    {
        Self::validate_source(draft.source_type, draft.source_id)?;
        let resolved = Self::resolve_lines(&draft.lines)?;
        let totals = Self::check_postable(&resolved, tolerance, account_lookup)?;
        Ok((resolved, totals))
    }

    /// Posting checks over already-resolved lines (stored drafts).
    ///
    /// # Errors
    ///
    /// Returns `InsufficientLines`, an account error or `UnbalancedEntry`.
    pub fn check_postable<A>(
        lines: &[ResolvedLine],
        tolerance: Decimal,
        account_lookup: A,
    ) -> Result<EntryTotals, LedgerError>
    where
        A: Fn(Uuid) -> Option<AccountInfo>,
    {
        if lines.len() < 2 {
            return Err(LedgerError::InsufficientLines {
                required: 2,
                actual: lines.len(),
            });
        }

        for line in lines {
            let account = account_lookup(line.account_id).ok_or_else(|| {
                LedgerError::DanglingReference {
                    kind: ReferenceKind::Account,
                    reference: line.account_id.to_string(),
                }
            })?;
            Self::check_account(&account)?;
        }

        let totals = EntryTotals::from_lines(lines)?;
        if !totals.is_balanced(tolerance) {
            return Err(LedgerError::UnbalancedEntry {
                debit: totals.total_debit,
                credit: totals.total_credit,
            });
        }

        Ok(totals)
    }

    /// An account may receive lines only if it is active and not a header.
    ///
    /// # Errors
    ///
    /// Returns `AccountInactive` or `HeaderAccountPosting`.
    pub fn check_account(account: &AccountInfo) -> Result<(), LedgerError> {
        if !account.is_active {
            return Err(LedgerError::AccountInactive {
                account_id: account.id,
                code: account.code.clone(),
            });
        }
        if account.is_header {
            return Err(LedgerError::HeaderAccountPosting {
                account_id: account.id,
                code: account.code.clone(),
            });
        }
        Ok(())
    }

    /// Numbers lines from 1 and splits amounts into debit/credit columns.
    ///
    /// # Errors
    ///
    /// Returns `ZeroAmount`, `NegativeAmount` or `ExcessPrecision`.
    pub fn resolve_lines(lines: &[LineInput]) -> Result<Vec<ResolvedLine>, LedgerError> {
        lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                let number = idx + 1;
                Self::check_amount(number, line.amount)?;
                let (debit, credit) = line.entry_type.split(line.amount);
                Ok(ResolvedLine {
                    account_id: line.account_id,
                    line_number: i32::try_from(number)
                        .map_err(|_| LedgerError::Internal("too many lines".to_string()))?,
                    debit,
                    credit,
                    description: line.description.clone(),
                })
            })
            .collect()
    }

    /// Validates a single line amount.
    ///
    /// # Errors
    ///
    /// Returns `ZeroAmount`, `NegativeAmount`, `AmountOutOfRange` or
    /// `ExcessPrecision`.
    pub fn check_amount(line: usize, amount: Decimal) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount { line });
        }
        if amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount { line });
        }
        if amount >= AMOUNT_LIMIT {
            return Err(LedgerError::AmountOutOfRange { line, amount });
        }
        if amount.normalize().scale() > MAX_SCALE {
            return Err(LedgerError::ExcessPrecision { line, amount });
        }
        Ok(())
    }

    /// Validates a status change.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStatusTransition` unless `from -> to` is allowed.
    pub fn validate_transition(from: EntryStatus, to: EntryStatus) -> Result<(), LedgerError> {
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(LedgerError::InvalidStatusTransition { from, to })
        }
    }
}
