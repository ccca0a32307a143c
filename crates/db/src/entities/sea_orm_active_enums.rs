//! `SeaORM` active enums mirroring the Postgres enum types, with
//! conversions to the domain enums in `tally-core`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use tally_core::approval::{
    ActionStatus as CoreActionStatus, ApprovalStatus as CoreApprovalStatus,
    ApproverRole as CoreApproverRole,
};
use tally_core::balance::DriftKind as CoreDriftKind;
use tally_core::ledger::{
    AccountType as CoreAccountType, EntryStatus as CoreEntryStatus, SourceType as CoreSourceType,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "account_type")]
pub enum AccountType {
    #[sea_orm(string_value = "ASSET")]
    Asset,
    #[sea_orm(string_value = "LIABILITY")]
    Liability,
    #[sea_orm(string_value = "EQUITY")]
    Equity,
    #[sea_orm(string_value = "REVENUE")]
    Revenue,
    #[sea_orm(string_value = "EXPENSE")]
    Expense,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "source_type")]
pub enum SourceType {
    #[sea_orm(string_value = "SALE")]
    Sale,
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    #[sea_orm(string_value = "PAYMENT")]
    Payment,
    #[sea_orm(string_value = "TRANSFER")]
    Transfer,
    #[sea_orm(string_value = "MANUAL")]
    Manual,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "entry_status")]
pub enum EntryStatus {
    #[sea_orm(string_value = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "POSTED")]
    Posted,
    #[sea_orm(string_value = "VOID")]
    Void,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "approver_role")]
pub enum ApproverRole {
    #[sea_orm(string_value = "employee")]
    Employee,
    #[sea_orm(string_value = "finance")]
    Finance,
    #[sea_orm(string_value = "manager")]
    Manager,
    #[sea_orm(string_value = "director")]
    Director,
    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "approval_status")]
pub enum ApprovalStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "action_status")]
pub enum ActionStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "ESCALATED")]
    Escalated,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "drift_kind")]
pub enum DriftKind {
    #[sea_orm(string_value = "ACCOUNT")]
    Account,
    #[sea_orm(string_value = "HEADER")]
    Header,
    #[sea_orm(string_value = "MIRROR")]
    Mirror,
}

/// Declares lossless `From` conversions both ways between a storage enum
/// and its domain counterpart.
macro_rules! mirror_enum {
    ($db:ident <=> $core:ident { $($variant:ident),+ $(,)? }) => {
        impl From<$core> for $db {
            fn from(value: $core) -> Self {
                match value {
                    $($core::$variant => Self::$variant,)+
                }
            }
        }

        impl From<$db> for $core {
            fn from(value: $db) -> Self {
                match value {
                    $($db::$variant => Self::$variant,)+
                }
            }
        }
    };
}

mirror_enum!(AccountType <=> CoreAccountType { Asset, Liability, Equity, Revenue, Expense });
mirror_enum!(SourceType <=> CoreSourceType { Sale, Purchase, Payment, Transfer, Manual });
mirror_enum!(EntryStatus <=> CoreEntryStatus { Draft, Posted, Void });
mirror_enum!(ApproverRole <=> CoreApproverRole { Employee, Finance, Manager, Director, Admin });
mirror_enum!(ApprovalStatus <=> CoreApprovalStatus { Pending, Approved, Rejected });
mirror_enum!(ActionStatus <=> CoreActionStatus { Pending, Approved, Rejected, Escalated });
mirror_enum!(DriftKind <=> CoreDriftKind { Account, Header, Mirror });

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn test_storage_values_match_domain() {
        for t in CoreAccountType::ALL {
            assert_eq!(AccountType::from(t).to_value(), t.as_str());
        }
        for s in CoreSourceType::ALL {
            assert_eq!(SourceType::from(s).to_value(), s.as_str());
        }
        for s in [CoreEntryStatus::Draft, CoreEntryStatus::Posted, CoreEntryStatus::Void] {
            assert_eq!(EntryStatus::from(s).to_value(), s.as_str());
        }
        for r in [
            CoreApproverRole::Employee,
            CoreApproverRole::Finance,
            CoreApproverRole::Manager,
            CoreApproverRole::Director,
            CoreApproverRole::Admin,
        ] {
            assert_eq!(ApproverRole::from(r).to_value(), r.as_str());
        }
        for k in [CoreDriftKind::Account, CoreDriftKind::Header, CoreDriftKind::Mirror] {
            assert_eq!(DriftKind::from(k).to_value(), k.as_str());
        }
    }

    #[test]
    fn test_round_trip_action_status() {
        for s in ActionStatus::iter() {
            assert_eq!(ActionStatus::from(CoreActionStatus::from(s)), s);
        }
    }
}
