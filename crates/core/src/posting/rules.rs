//! Gateway rules applied before the ledger is touched.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::types::{LineTemplate, PostingRequest, SourceKey};
use crate::approval::types::{ApprovalSignal, ApprovalStatus};
use crate::ledger::error::{LedgerError, ReferenceKind};
use crate::ledger::service::LedgerService;
use crate::ledger::types::{EntryTotals, JournalDraft, LineInput};

/// Stateless posting rules.
pub struct PostingRules;

impl PostingRules {
    /// Structural validation of a request, balance included.
    ///
    /// Runs before any storage access so that an unbalanced request leaves
    /// no trace.
    ///
    /// # Errors
    ///
    /// Source pairing, line count, amount and balance errors.
    pub fn validate_request(
        request: &PostingRequest,
        tolerance: Decimal,
    ) -> Result<Option<SourceKey>, LedgerError> {
        LedgerService::validate_source(request.source_type, request.source_id)?;

        if request.lines.len() < 2 {
            return Err(LedgerError::InsufficientLines {
                required: 2,
                actual: request.lines.len(),
            });
        }

        let mut totals = EntryTotals::default();
        for (idx, line) in request.lines.iter().enumerate() {
            LedgerService::check_amount(idx + 1, line.amount)?;
            let (debit, credit) = line.entry_type.split(line.amount);
            totals = totals.checked_add(debit, credit)?;
        }

        if !totals.is_balanced(tolerance) {
            return Err(LedgerError::UnbalancedEntry {
                debit: totals.total_debit,
                credit: totals.total_credit,
            });
        }

        Ok(request.source_key())
    }

    /// The newest approval request for `key` must be APPROVED.
    ///
    /// # Errors
    ///
    /// Returns `NotApproved` with the latest status, or "none".
    pub fn ensure_approved(
        key: SourceKey,
        latest: Option<ApprovalStatus>,
    ) -> Result<(), LedgerError> {
        match latest {
            Some(ApprovalStatus::Approved) => Ok(()),
            other => Err(LedgerError::NotApproved {
                source_type: key.source_type,
                source_id: key.source_id,
                latest: other.map_or_else(|| "none".to_string(), |s| s.as_str().to_string()),
            }),
        }
    }

    /// Turns account codes into account ids.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` for the first unknown code.
    pub fn resolve_templates<R>(
        templates: &[LineTemplate],
        resolve: R,
    ) -> Result<Vec<LineInput>, LedgerError>
    where
        R: Fn(&str) -> Option<Uuid>,
    {
        templates
            .iter()
            .map(|t| {
                let account_id =
                    resolve(&t.account_code).ok_or_else(|| LedgerError::DanglingReference {
                        kind: ReferenceKind::AccountCode,
                        reference: t.account_code.clone(),
                    })?;
                Ok(LineInput {
                    account_id,
                    entry_type: t.entry_type,
                    amount: t.amount,
                    description: t.description.clone(),
                })
            })
            .collect()
    }

    /// Builds the ledger draft for a resolved request.
    #[must_use]
    pub fn to_draft(request: &PostingRequest, lines: Vec<LineInput>) -> JournalDraft {
        JournalDraft {
            source_type: request.source_type,
            source_id: request.source_id,
            entry_date: request.entry_date,
            description: request.description.clone(),
            lines,
        }
    }

    /// Checks that an approval signal authorizes posting `request`.
    ///
    /// # Errors
    ///
    /// Returns `NotApproved` for a rejection signal or one for another source.
    pub fn check_signal(
        signal: &ApprovalSignal,
        request: &PostingRequest,
    ) -> Result<SourceKey, LedgerError> {
        let (source_type, source_id) = signal.source();
        let key = SourceKey {
            source_type,
            source_id,
        };

        if !signal.is_approved() {
            return Err(LedgerError::NotApproved {
                source_type,
                source_id,
                latest: ApprovalStatus::Rejected.as_str().to_string(),
            });
        }
        if request.source_key() != Some(key) {
            return Err(LedgerError::NotApproved {
                source_type: request.source_type,
                source_id: request.source_id.unwrap_or_default(),
                latest: format!("signal is for {key}"),
            });
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::SourceType;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tally_shared::types::ApprovalRequestId;

    fn request(
        source_type: SourceType,
        source_id: Option<i64>,
        lines: Vec<LineTemplate>,
    ) -> PostingRequest {
        PostingRequest {
            source_type,
            source_id,
            entry_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            description: "Invoice".to_string(),
            lines,
        }
    }

    fn sale_lines() -> Vec<LineTemplate> {
        vec![
            LineTemplate::debit("1120", dec!(1000000)),
            LineTemplate::credit("4100", dec!(1000000)).with_description("Sales"),
        ]
    }

    #[test]
    fn test_validate_request() {
        let req = request(SourceType::Sale, Some(7), sale_lines());
        let key = PostingRules::validate_request(&req, dec!(0.01)).unwrap();
        assert_eq!(
            key,
            Some(SourceKey {
                source_type: SourceType::Sale,
                source_id: 7
            })
        );

        let manual = request(SourceType::Manual, None, sale_lines());
        assert_eq!(PostingRules::validate_request(&manual, dec!(0.01)).unwrap(), None);
    }

    #[test]
    fn test_validate_request_unbalanced() {
        let req = request(
            SourceType::Manual,
            None,
            vec![
                LineTemplate::debit("1110", dec!(500000)),
                LineTemplate::credit("4100", dec!(400000)),
            ],
        );
        assert!(matches!(
            PostingRules::validate_request(&req, dec!(0.01)),
            Err(LedgerError::UnbalancedEntry { .. })
        ));
    }

    #[test]
    fn test_validate_request_oversized_amounts() {
        let huge = vec![
            LineTemplate::debit("1110", Decimal::MAX),
            LineTemplate::debit("1120", Decimal::MAX),
            LineTemplate::credit("4100", Decimal::MAX),
            LineTemplate::credit("4200", Decimal::MAX),
        ];
        assert!(matches!(
            PostingRules::validate_request(&request(SourceType::Manual, None, huge), dec!(0.01)),
            Err(LedgerError::AmountOutOfRange { line: 1, .. })
        ));

        // Each line fits, the sum does not.
        let half = dec!(600000000000000000);
        let summed = vec![
            LineTemplate::debit("1110", half),
            LineTemplate::debit("1120", half),
            LineTemplate::credit("4100", half),
            LineTemplate::credit("4200", half),
        ];
        assert!(matches!(
            PostingRules::validate_request(&request(SourceType::Manual, None, summed), dec!(0.01)),
            Err(LedgerError::TotalOutOfRange)
        ));
    }

    #[test]
    fn test_validate_request_source_rules() {
        let missing = request(SourceType::Purchase, None, sale_lines());
        assert!(matches!(
            PostingRules::validate_request(&missing, dec!(0.01)),
            Err(LedgerError::MissingSourceId(SourceType::Purchase))
        ));
        let unexpected = request(SourceType::Manual, Some(3), sale_lines());
        assert!(matches!(
            PostingRules::validate_request(&unexpected, dec!(0.01)),
            Err(LedgerError::UnexpectedSourceId(3))
        ));
    }

    #[test]
    fn test_ensure_approved() {
        let key = SourceKey {
            source_type: SourceType::Purchase,
            source_id: 42,
        };
        assert!(PostingRules::ensure_approved(key, Some(ApprovalStatus::Approved)).is_ok());
        assert!(matches!(
            PostingRules::ensure_approved(key, Some(ApprovalStatus::Rejected)),
            Err(LedgerError::NotApproved { latest, .. }) if latest == "REJECTED"
        ));
        assert!(matches!(
            PostingRules::ensure_approved(key, None),
            Err(LedgerError::NotApproved { latest, .. }) if latest == "none"
        ));
    }

    #[test]
    fn test_resolve_templates() {
        let ar = Uuid::new_v4();
        let revenue = Uuid::new_v4();
        let resolve = |code: &str| match code {
            "1120" => Some(ar),
            "4100" => Some(revenue),
            _ => None,
        };

        let lines = PostingRules::resolve_templates(&sale_lines(), resolve).unwrap();
        assert_eq!(lines[0].account_id, ar);
        assert_eq!(lines[1].account_id, revenue);
        assert_eq!(lines[1].description.as_deref(), Some("Sales"));

        let unknown = vec![
            LineTemplate::debit("9999", dec!(1)),
            LineTemplate::credit("4100", dec!(1)),
        ];
        assert!(matches!(
            PostingRules::resolve_templates(&unknown, resolve),
            Err(LedgerError::DanglingReference {
                kind: ReferenceKind::AccountCode,
                reference,
            }) if reference == "9999"
        ));
    }

    #[test]
    fn test_check_signal() {
        let req = request(SourceType::Purchase, Some(42), sale_lines());
        let approved = ApprovalSignal::Approved {
            request_id: ApprovalRequestId::new(),
            source_type: SourceType::Purchase,
            source_id: 42,
        };
        assert!(PostingRules::check_signal(&approved, &req).is_ok());

        let other = ApprovalSignal::Approved {
            request_id: ApprovalRequestId::new(),
            source_type: SourceType::Purchase,
            source_id: 43,
        };
        assert!(matches!(
            PostingRules::check_signal(&other, &req),
            Err(LedgerError::NotApproved { .. })
        ));

        let rejected = ApprovalSignal::Rejected {
            request_id: ApprovalRequestId::new(),
            source_type: SourceType::Purchase,
            source_id: 42,
            reason: "no".to_string(),
        };
        assert!(matches!(
            PostingRules::check_signal(&rejected, &req),
            Err(LedgerError::NotApproved { .. })
        ));
    }
}
