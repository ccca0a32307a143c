//! Reconciliation integration tests.
//!
//! Corrupts cached balances behind the synchronizer's back and checks that
//! the reconciler reports every kind of drift without repairing it.

mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    Statement,
};
use uuid::Uuid;

use common::{Chart, balance_of, connect_or_skip, credit, debit, ledger_config, manual_draft};
use tally_core::balance::{BalanceDrift, DriftKind};
use tally_db::entities::balance_drift_alerts;
use tally_db::entities::sea_orm_active_enums::DriftKind as DbDriftKind;
use tally_db::repositories::{
    CashBankRepository, CreateCashBankInput, JournalRepository, Reconciler,
};
use tally_shared::config::ReconciliationConfig;
use tally_shared::types::AccountId;

async fn set_balance(db: &DatabaseConnection, table: &str, id: Uuid, balance: Decimal) {
    db.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        format!("UPDATE {table} SET balance = $1 WHERE id = $2"),
        [balance.into(), id.into()],
    ))
    .await
    .unwrap();
}

fn drifts_of(drifts: &[BalanceDrift], chart: &Chart) -> Vec<BalanceDrift> {
    let ours = [
        chart.assets.id,
        chart.cash_and_bank.id,
        chart.cash.id,
        chart.bank.id,
        chart.receivables.id,
        chart.payables.id,
        chart.revenue.id,
        chart.expense.id,
    ]
    .map(AccountId::from_uuid);
    drifts
        .iter()
        .filter(|d| ours.contains(&d.account_id))
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_reconciler_reports_drift_without_repairing() {
    let Some(db) = connect_or_skip().await else {
        return;
    };
    let chart = Chart::create(&db).await;
    let journal = JournalRepository::new(db.clone(), ledger_config());
    let mirror = CashBankRepository::new(db.clone())
        .link(CreateCashBankInput {
            name: "Till".to_string(),
            account_number: Some("TILL-01".to_string()),
            account_id: chart.cash.id,
        })
        .await
        .unwrap();

    journal
        .create_and_post(&manual_draft(
            "Takings",
            vec![debit(chart.cash.id, dec!(100.00)), credit(chart.revenue.id, dec!(100.00))],
        ))
        .await
        .unwrap();

    let reconciler = Reconciler::new(
        db.clone(),
        ReconciliationConfig {
            tolerance: dec!(0.01),
            record_alerts: true,
            ..ReconciliationConfig::default()
        },
    );

    let report = reconciler.run().await.unwrap();
    assert!(drifts_of(&report.drifts, &chart).is_empty());

    set_balance(&db, "accounts", chart.cash.id, dec!(105.00)).await;
    set_balance(&db, "accounts", chart.assets.id, dec!(999.00)).await;
    set_balance(&db, "cash_banks", mirror.id, dec!(1.00)).await;

    let report = reconciler.run().await.unwrap();
    let mut ours = drifts_of(&report.drifts, &chart);
    ours.sort_by_key(|d| d.kind.as_str());
    assert_eq!(ours.len(), 3, "unexpected drifts: {ours:?}");

    let account = &ours[0];
    assert_eq!(account.kind, DriftKind::Account);
    assert_eq!(account.code, chart.code("1110"));
    assert_eq!(account.cached, dec!(105.00));
    assert_eq!(account.expected, dec!(100.00));
    assert_eq!(account.difference(), dec!(5.00));

    let header = &ours[1];
    assert_eq!(header.kind, DriftKind::Header);
    assert_eq!(header.code, chart.code("1000"));
    assert_eq!(header.expected, dec!(100.00));

    let drifted_mirror = &ours[2];
    assert_eq!(drifted_mirror.kind, DriftKind::Mirror);
    assert_eq!(drifted_mirror.mirror_id.map(|m| m.into_inner()), Some(mirror.id));
    assert_eq!(drifted_mirror.cached, dec!(1.00));
    assert_eq!(drifted_mirror.expected, dec!(100.00));

    // Reported, not healed.
    assert_eq!(balance_of(&db, chart.cash.id).await, dec!(105.00));
    assert_eq!(balance_of(&db, chart.assets.id).await, dec!(999.00));

    let alerts = balance_drift_alerts::Entity::find()
        .filter(balance_drift_alerts::Column::AccountId.is_in([chart.cash.id, chart.assets.id]))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(alerts.len(), 3);
    assert!(
        alerts
            .iter()
            .any(|a| a.kind == DbDriftKind::Mirror && a.cash_bank_id == Some(mirror.id))
    );
    let header_alert = alerts
        .iter()
        .find(|a| a.kind == DbDriftKind::Header)
        .unwrap();
    assert_eq!(header_alert.difference, dec!(899.00));
    assert_eq!(header_alert.details["kind"], "HEADER");

    // Restored balances reconcile cleanly.
    set_balance(&db, "accounts", chart.cash.id, dec!(100.00)).await;
    set_balance(&db, "accounts", chart.assets.id, dec!(100.00)).await;
    set_balance(&db, "cash_banks", mirror.id, dec!(100.00)).await;
    let report = Reconciler::new(
        db.clone(),
        ReconciliationConfig {
            tolerance: dec!(0.01),
            record_alerts: false,
            ..ReconciliationConfig::default()
        },
    )
    .run()
    .await
    .unwrap();
    assert!(drifts_of(&report.drifts, &chart).is_empty());
}
