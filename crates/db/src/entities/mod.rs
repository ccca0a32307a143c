//! `SeaORM` entity definitions.

pub mod prelude;

pub mod accounting_periods;
pub mod accounts;
pub mod approval_actions;
pub mod approval_requests;
pub mod approval_signals;
pub mod approval_steps;
pub mod balance_drift_alerts;
pub mod cash_banks;
pub mod journal_entries;
pub mod journal_lines;
pub mod payments;
pub mod purchases;
pub mod sales;
pub mod sea_orm_active_enums;
pub mod transfers;
