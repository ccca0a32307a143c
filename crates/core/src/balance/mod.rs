//! Balance math: normal-sign balances, hierarchy rollup and drift detection.

pub mod calc;
pub mod drift;
pub mod hierarchy;

#[cfg(test)]
mod hierarchy_props;

pub use calc::{AccountBalance, DisplayConvention, RunningBalance};
pub use drift::{
    BalanceDrift, DriftKind, LedgerSnapshot, MirrorSnapshot, ReconciliationReport, reconcile,
};
pub use hierarchy::{AccountNode, AccountTree, HierarchyIssue};
