//! `SeaORM` Entity for approval_actions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{ActionStatus, ApproverRole};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_actions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub step_id: Uuid,
    pub status: ActionStatus,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<ApproverRole>,
    #[sea_orm(column_type = "Text", nullable)]
    pub comment: Option<String>,
    pub acted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_steps::Entity",
        from = "Column::StepId",
        to = "super::approval_steps::Column::Id",
        on_delete = "Cascade"
    )]
    ApprovalSteps,
}

impl Related<super::approval_steps::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalSteps.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
