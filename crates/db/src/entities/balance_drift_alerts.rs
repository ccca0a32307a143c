//! `SeaORM` Entity for balance_drift_alerts table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::DriftKind;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "balance_drift_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: DriftKind,
    pub account_id: Uuid,
    pub cash_bank_id: Option<Uuid>,
    pub code: String,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub cached_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub expected_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub difference: Decimal,
    #[sea_orm(column_type = "JsonBinary")]
    pub details: Json,
    pub detected_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
