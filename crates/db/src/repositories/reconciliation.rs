//! Balance reconciliation.
//!
//! Reads every cached balance, every posted line sum and every cash/bank
//! mirror from one repeatable-read snapshot, then compares them with a full
//! recomputation. Drift is logged and optionally recorded; it is never
//! repaired here.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};
use tracing::{error, info};

use tally_core::balance::{
    AccountTree, BalanceDrift, LedgerSnapshot, MirrorSnapshot, ReconciliationReport, reconcile,
};
use tally_core::ledger::AccountType;
use tally_shared::config::ReconciliationConfig;
use tally_shared::types::{AccountId, CashBankId};

use super::account::to_node;
use super::balance::posted_sums;
use crate::entities::{accounts, balance_drift_alerts, cash_banks};
use crate::snapshot::SnapshotExt;

/// Compares cached balances with their derivation.
#[derive(Debug, Clone)]
pub struct Reconciler {
    db: DatabaseConnection,
    config: ReconciliationConfig,
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(db: DatabaseConnection, config: ReconciliationConfig) -> Self {
        Self { db, config }
    }

    /// Runs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or alerts cannot be
    /// recorded.
    pub async fn run(&self) -> Result<ReconciliationReport, DbErr> {
        let (tree, snapshot) = self.read_snapshot().await?;
        let report = reconcile(&tree, &snapshot, self.config.tolerance);

        for drift in &report.drifts {
            error!(
                kind = drift.kind.as_str(),
                account_id = %drift.account_id,
                code = %drift.code,
                mirror_id = ?drift.mirror_id,
                cached = %drift.cached,
                expected = %drift.expected,
                difference = %drift.difference(),
                "balance drift detected"
            );
        }

        if self.config.record_alerts && !report.is_clean() {
            self.record(&report.drifts).await?;
        }

        info!(
            accounts_checked = report.accounts_checked,
            mirrors_checked = report.mirrors_checked,
            drifts = report.drifts.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    async fn read_snapshot(&self) -> Result<(AccountTree, LedgerSnapshot), DbErr> {
        let snapshot = self.db.snapshot().await?;
        let conn = snapshot.transaction();

        let rows = accounts::Entity::find().all(conn).await?;
        let sums = posted_sums(conn, None, None).await?;
        let mirrors = cash_banks::Entity::find().all(conn).await?;
        snapshot.finish().await?;

        let tree = AccountTree::new(rows.iter().map(to_node));

        let mut cached = HashMap::with_capacity(rows.len());
        let mut derived_leaves = HashMap::new();
        for row in &rows {
            let id = AccountId::from_uuid(row.id);
            cached.insert(id, row.balance);
            if !row.is_header {
                let (debit, credit) = sums.get(&row.id).copied().unwrap_or_default();
                let balance = AccountType::from(row.account_type)
                    .normal_balance()
                    .signed_balance(debit, credit);
                derived_leaves.insert(id, balance);
            }
        }

        let mirrors = mirrors
            .into_iter()
            .map(|m| MirrorSnapshot {
                id: CashBankId::from_uuid(m.id),
                account_id: AccountId::from_uuid(m.account_id),
                balance: m.balance,
            })
            .collect();

        Ok((
            tree,
            LedgerSnapshot {
                cached,
                derived_leaves,
                mirrors,
            },
        ))
    }

    async fn record(&self, drifts: &[BalanceDrift]) -> Result<(), DbErr> {
        let now = Utc::now().into();
        let rows = drifts.iter().map(|drift| balance_drift_alerts::ActiveModel {
            id: Set(uuid::Uuid::now_v7()),
            kind: Set(drift.kind.into()),
            account_id: Set(drift.account_id.into_inner()),
            cash_bank_id: Set(drift.mirror_id.map(CashBankId::into_inner)),
            code: Set(drift.code.clone()),
            cached_balance: Set(drift.cached),
            expected_balance: Set(drift.expected),
            difference: Set(drift.difference()),
            details: Set(serde_json::to_value(drift).unwrap_or_default()),
            detected_at: Set(now),
        });
        balance_drift_alerts::Entity::insert_many(rows)
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
