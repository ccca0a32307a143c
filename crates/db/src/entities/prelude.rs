//! `SeaORM` entity prelude.

pub use super::accounting_periods::Entity as AccountingPeriods;
pub use super::accounts::Entity as Accounts;
pub use super::approval_actions::Entity as ApprovalActions;
pub use super::approval_requests::Entity as ApprovalRequests;
pub use super::approval_signals::Entity as ApprovalSignals;
pub use super::approval_steps::Entity as ApprovalSteps;
pub use super::balance_drift_alerts::Entity as BalanceDriftAlerts;
pub use super::cash_banks::Entity as CashBanks;
pub use super::journal_entries::Entity as JournalEntries;
pub use super::journal_lines::Entity as JournalLines;
pub use super::payments::Entity as Payments;
pub use super::purchases::Entity as Purchases;
pub use super::sales::Entity as Sales;
pub use super::transfers::Entity as Transfers;
