//! Drift detection between cached balances and the journal.
//!
//! Reconciliation only reports. Nothing in here produces a corrected value
//! to be written back.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, CashBankId};

use super::hierarchy::AccountTree;

/// Which cached value disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriftKind {
    /// A leaf account against its posted lines.
    Account,
    /// A header account against the sum of its children.
    Header,
    /// A cash/bank mirror against its ledger account.
    Mirror,
}

impl DriftKind {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "ACCOUNT",
            Self::Header => "HEADER",
            Self::Mirror => "MIRROR",
        }
    }
}

/// A cached balance that does not match its derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    /// What drifted.
    pub kind: DriftKind,
    /// The account (for mirrors, the linked account).
    pub account_id: AccountId,
    /// The account code.
    pub code: String,
    /// The mirror row, for `Mirror` drift.
    pub mirror_id: Option<CashBankId>,
    /// Value currently stored.
    pub cached: Decimal,
    /// Value derived from the journal.
    pub expected: Decimal,
}

impl BalanceDrift {
    /// cached - expected.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.cached - self.expected
    }
}

/// Returns a drift when `|cached - expected| >= tolerance`.
#[must_use]
pub fn detect(
    kind: DriftKind,
    account_id: AccountId,
    code: &str,
    cached: Decimal,
    expected: Decimal,
    tolerance: Decimal,
) -> Option<BalanceDrift> {
    ((cached - expected).abs() >= tolerance).then(|| BalanceDrift {
        kind,
        account_id,
        code: code.to_string(),
        mirror_id: None,
        cached,
        expected,
    })
}

/// A cash/bank mirror row as read during reconciliation.
#[derive(Debug, Clone)]
pub struct MirrorSnapshot {
    /// The mirror row.
    pub id: CashBankId,
    /// Linked ledger account.
    pub account_id: AccountId,
    /// Mirror's stored balance.
    pub balance: Decimal,
}

/// Everything reconciliation reads, taken from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    /// Cached `accounts.balance` per account.
    pub cached: HashMap<AccountId, Decimal>,
    /// Signed sum of posted lines per leaf account.
    pub derived_leaves: HashMap<AccountId, Decimal>,
    /// Mirror rows.
    pub mirrors: Vec<MirrorSnapshot>,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Accounts compared.
    pub accounts_checked: usize,
    /// Mirrors compared.
    pub mirrors_checked: usize,
    /// Every mismatch found.
    pub drifts: Vec<BalanceDrift>,
}

impl ReconciliationReport {
    /// True when nothing drifted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }

    /// Number of drifts of `kind`.
    #[must_use]
    pub fn count(&self, kind: DriftKind) -> usize {
        self.drifts.iter().filter(|d| d.kind == kind).count()
    }
}

/// Compares cached balances with a full recomputation.
///
/// Leaves are checked against their posted lines and headers against the
/// rollup of derived leaves, so a header is reported even if its children
/// have drifted identically. Mirrors are checked against the derived
/// balance of their account.
#[must_use]
pub fn reconcile(
    tree: &AccountTree,
    snapshot: &LedgerSnapshot,
    tolerance: Decimal,
) -> ReconciliationReport {
    let expected = tree.rollup(&snapshot.derived_leaves);
    let mut report = ReconciliationReport::default();

    for node in tree.nodes_by_code() {
        let Some(expected_balance) = expected.get(&node.id).copied() else {
            continue;
        };
        let cached = snapshot.cached.get(&node.id).copied().unwrap_or(Decimal::ZERO);
        let kind = if node.is_header {
            DriftKind::Header
        } else {
            DriftKind::Account
        };

        report.accounts_checked += 1;
        let drift = detect(kind, node.id, &node.code, cached, expected_balance, tolerance);
        if let Some(drift) = drift {
            report.drifts.push(drift);
        }
    }

    for mirror in &snapshot.mirrors {
        let expected_balance = expected.get(&mirror.account_id).copied().unwrap_or(Decimal::ZERO);
        let code = tree
            .get(mirror.account_id)
            .map(|n| n.code.clone())
            .unwrap_or_default();

        report.mirrors_checked += 1;
        if let Some(mut drift) = detect(
            DriftKind::Mirror,
            mirror.account_id,
            &code,
            mirror.balance,
            expected_balance,
            tolerance,
        ) {
            drift.mirror_id = Some(mirror.id);
            report.drifts.push(drift);
        }
    }

    report
}
