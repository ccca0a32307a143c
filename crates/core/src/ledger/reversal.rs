//! Void by compensation.
//!
//! A posted entry is never edited. Voiding it produces a new posted entry
//! whose lines mirror the original with debit and credit swapped, so the
//! net effect of both on every account is zero.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::LedgerError;
use super::types::{EntryStatus, EntryTotals, ResolvedLine};

/// The entry being voided, as loaded under lock.
#[derive(Debug, Clone)]
pub struct VoidTarget {
    /// The original entry.
    pub entry_id: Uuid,
    /// Its entry number, used in the compensating description.
    pub entry_number: String,
    /// Current status.
    pub status: EntryStatus,
    /// Set when the original is itself a compensating entry.
    pub reverses_entry_id: Option<Uuid>,
    /// Set once the original has been voided.
    pub reversed_by_entry_id: Option<Uuid>,
    /// The original lines.
    pub lines: Vec<ResolvedLine>,
}

/// The compensating entry to insert.
#[derive(Debug, Clone)]
pub struct CompensatingEntry {
    /// Description: `Void of {entry_number}: {reason}`.
    pub description: String,
    /// Mirrored lines.
    pub lines: Vec<ResolvedLine>,
    /// Totals of the mirrored lines.
    pub totals: EntryTotals,
}

/// Stateless service for creating compensating entries.
pub struct ReversalService;

impl ReversalService {
    /// Checks that `target` may be voided with `reason`.
    ///
    /// # Errors
    ///
    /// - `VoidReasonRequired` for a blank reason
    /// - `NotPosted` unless the entry is posted
    /// - `CannotVoidCompensating` for a compensating entry
    /// - `AlreadyVoided` if a compensating entry already exists
    pub fn validate_void(target: &VoidTarget, reason: &str) -> Result<(), LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::VoidReasonRequired);
        }
        if target.status != EntryStatus::Posted {
            return Err(LedgerError::NotPosted {
                entry_id: target.entry_id,
                status: target.status,
            });
        }
        if target.reverses_entry_id.is_some() {
            return Err(LedgerError::CannotVoidCompensating(target.entry_id));
        }
        if let Some(reversed_by) = target.reversed_by_entry_id {
            return Err(LedgerError::AlreadyVoided {
                entry_id: target.entry_id,
                reversed_by,
            });
        }
        Ok(())
    }

    /// Builds the compensating entry for a valid void.
    ///
    /// For each original line, in order:
    /// - Debits become credits and credits become debits
    /// - The account is preserved
    /// - The description is prefixed with "Reversal: "
    ///
    /// # Errors
    ///
    /// Returns the `validate_void` error if the target cannot be voided.
    pub fn compensate(target: &VoidTarget, reason: &str) -> Result<CompensatingEntry, LedgerError> {
        Self::validate_void(target, reason)?;

        let lines: Vec<ResolvedLine> = target
            .lines
            .iter()
            .map(|line| ResolvedLine {
                account_id: line.account_id,
                line_number: line.line_number,
                debit: line.credit,
                credit: line.debit,
                description: Some(format!(
                    "Reversal: {}",
                    line.description.clone().unwrap_or_default()
                )),
            })
            .collect();

        let totals = EntryTotals::from_lines(&lines)?;

        Ok(CompensatingEntry {
            description: format!("Void of {}: {}", target.entry_number, reason.trim()),
            lines,
            totals,
        })
    }

    /// Net debit-minus-credit per account over an entry and its compensation.
    ///
    /// Every value is zero for a correct compensation.
    #[must_use]
    pub fn net_effect(
        original: &[ResolvedLine],
        compensating: &[ResolvedLine],
    ) -> Vec<(Uuid, Decimal)> {
        let mut net: Vec<(Uuid, Decimal)> = Vec::new();
        for line in original.iter().chain(compensating) {
            let delta = line.debit - line.credit;
            match net.iter_mut().find(|(id, _)| *id == line.account_id) {
                Some((_, total)) => *total += delta,
                None => net.push((line.account_id, delta)),
            }
        }
        net
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn posted_target() -> VoidTarget {
        VoidTarget {
            entry_id: Uuid::new_v4(),
            entry_number: "JE-2026-000001".to_string(),
            status: EntryStatus::Posted,
            reverses_entry_id: None,
            reversed_by_entry_id: None,
            lines: vec![
                ResolvedLine {
                    account_id: Uuid::new_v4(),
                    line_number: 1,
                    debit: dec!(100.00),
                    credit: Decimal::ZERO,
                    description: Some("Office supplies".to_string()),
                },
                ResolvedLine {
                    account_id: Uuid::new_v4(),
                    line_number: 2,
                    debit: Decimal::ZERO,
                    credit: dec!(100.00),
                    description: None,
                },
            ],
        }
    }

    #[test]
    fn test_compensate_swaps_columns() {
        let target = posted_target();
        let comp = ReversalService::compensate(&target, "Duplicate entry").unwrap();

        assert_eq!(comp.lines.len(), 2);
        assert_eq!(comp.lines[0].credit, dec!(100.00));
        assert_eq!(comp.lines[0].debit, Decimal::ZERO);
        assert_eq!(comp.lines[1].debit, dec!(100.00));
        assert_eq!(comp.lines[0].account_id, target.lines[0].account_id);
        assert_eq!(
            comp.lines[0].description.as_deref(),
            Some("Reversal: Office supplies")
        );
        assert_eq!(comp.lines[1].description.as_deref(), Some("Reversal: "));
        assert_eq!(comp.description, "Void of JE-2026-000001: Duplicate entry");
        assert_eq!(comp.totals.total_debit, comp.totals.total_credit);
    }

    #[test]
    fn test_net_effect_is_zero() {
        let target = posted_target();
        let comp = ReversalService::compensate(&target, "wrong amount").unwrap();

        for (_, net) in ReversalService::net_effect(&target.lines, &comp.lines) {
            assert_eq!(net, Decimal::ZERO);
        }
    }

    #[test]
    fn test_reason_required() {
        let target = posted_target();
        assert!(matches!(
            ReversalService::validate_void(&target, "   "),
            Err(LedgerError::VoidReasonRequired)
        ));
    }

    #[test]
    fn test_only_posted_can_be_voided() {
        let target = VoidTarget {
            status: EntryStatus::Draft,
            ..posted_target()
        };
        assert!(matches!(
            ReversalService::validate_void(&target, "reason"),
            Err(LedgerError::NotPosted {
                status: EntryStatus::Draft,
                ..
            })
        ));
    }

    #[test]
    fn test_void_twice_rejected() {
        let reversed_by = Uuid::new_v4();
        let target = VoidTarget {
            reversed_by_entry_id: Some(reversed_by),
            ..posted_target()
        };
        assert!(matches!(
            ReversalService::validate_void(&target, "again"),
            Err(LedgerError::AlreadyVoided { reversed_by: r, .. }) if r == reversed_by
        ));
    }

    #[test]
    fn test_compensating_entry_is_final() {
        let target = VoidTarget {
            reverses_entry_id: Some(Uuid::new_v4()),
            ..posted_target()
        };
        assert!(matches!(
            ReversalService::validate_void(&target, "undo the undo"),
            Err(LedgerError::CannotVoidCompensating(_))
        ));
    }
}
