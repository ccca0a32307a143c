//! Accounting period locks.
//!
//! A closed period freezes its date range: nothing dated inside it can be
//! posted, including compensating entries. Closed periods never overlap, and
//! only the latest one can be reopened.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// An inclusive date range closed to posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPeriod {
    /// First day of the period.
    pub start_date: NaiveDate,
    /// Last day of the period.
    pub end_date: NaiveDate,
}

impl ClosedPeriod {
    /// True when `date` falls inside the period.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// True when the two ranges share at least one day.
    #[must_use]
    pub fn overlaps(&self, start_date: NaiveDate, end_date: NaiveDate) -> bool {
        self.start_date <= end_date && start_date <= self.end_date
    }
}

/// Stateless period rules.
pub struct PeriodRules;

impl PeriodRules {
    /// Rejects a posting dated inside `closed`.
    ///
    /// # Errors
    ///
    /// Returns `PeriodClosed` when `closed` contains `entry_date`.
    pub fn ensure_open(
        entry_date: NaiveDate,
        closed: Option<ClosedPeriod>,
    ) -> Result<(), LedgerError> {
        match closed {
            Some(period) if period.contains(entry_date) => Err(LedgerError::PeriodClosed {
                entry_date,
                start_date: period.start_date,
                end_date: period.end_date,
            }),
            _ => Ok(()),
        }
    }

    /// Checks a range about to be closed against the periods already closed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriodRange` for an inverted range or
    /// `PeriodOverlap` naming the first overlapping period.
    pub fn check_closable(
        start_date: NaiveDate,
        end_date: NaiveDate,
        closed: &[ClosedPeriod],
    ) -> Result<(), LedgerError> {
        if end_date < start_date {
            return Err(LedgerError::InvalidPeriodRange {
                start_date,
                end_date,
            });
        }
        if let Some(existing) = closed.iter().find(|p| p.overlaps(start_date, end_date)) {
            return Err(LedgerError::PeriodOverlap {
                start_date: existing.start_date,
                end_date: existing.end_date,
            });
        }
        Ok(())
    }

    /// Checks that `period` may be reopened.
    ///
    /// A period closed after it must be reopened first.
    ///
    /// # Errors
    ///
    /// Returns `PeriodReopenReasonRequired` or `LaterPeriodClosed`.
    pub fn check_reopenable(
        period: ClosedPeriod,
        closed: &[ClosedPeriod],
        reason: &str,
    ) -> Result<(), LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::PeriodReopenReasonRequired);
        }
        if let Some(later) = closed.iter().find(|p| p.start_date > period.end_date) {
            return Err(LedgerError::LaterPeriodClosed {
                start_date: later.start_date,
                end_date: later.end_date,
            });
        }
        Ok(())
    }
}
