//! Approval workflow types.
//!
//! A request owns an ordered list of steps. Each step is bound to one role
//! and has exactly one action recording the decision taken on it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{ApprovalActionId, ApprovalRequestId, ApprovalStepId};
use uuid::Uuid;

use crate::ledger::types::SourceType;

/// Approver role, ordered from lowest to highest authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproverRole {
    /// Prepares and submits source documents.
    Employee = 0,
    /// Finance staff.
    Finance = 1,
    /// Department manager.
    Manager = 2,
    /// Director.
    Director = 3,
    /// May act on any step.
    Admin = 4,
}

impl ApproverRole {
    /// Parse a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "employee" => Some(Self::Employee),
            "finance" => Some(Self::Finance),
            "manager" => Some(Self::Manager),
            "director" => Some(Self::Director),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Finance => "finance",
            Self::Manager => "manager",
            Self::Director => "director",
            Self::Admin => "admin",
        }
    }

    /// Whether someone holding `self` may act on a step bound to `required`.
    #[must_use]
    pub fn can_act_for(self, required: Self) -> bool {
        self == required || self == Self::Admin
    }
}

impl std::fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    /// Waiting on at least one step.
    Pending,
    /// Every step approved; terminal.
    Approved,
    /// A step was rejected; terminal.
    Rejected,
}

impl ApprovalStatus {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// True for APPROVED and REJECTED.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision recorded on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    /// Not yet acted upon.
    Pending,
    /// Approved.
    Approved,
    /// Rejected.
    Rejected,
    /// Handed to a higher-authority step inserted right after.
    Escalated,
}

impl ActionStatus {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Escalated => "ESCALATED",
        }
    }

    /// True once a decision has been recorded.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the step no longer blocks completion.
    #[must_use]
    pub const fn clears_step(self) -> bool {
        matches!(self, Self::Approved | Self::Escalated)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single decision record of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalAction {
    /// Action ID.
    pub id: ApprovalActionId,
    /// Decision.
    pub status: ActionStatus,
    /// Who acted.
    pub actor_id: Option<Uuid>,
    /// Role the actor held when acting.
    pub actor_role: Option<ApproverRole>,
    /// Comment, rejection reason or escalation reason.
    pub comment: Option<String>,
    /// When the decision was recorded.
    pub acted_at: Option<DateTime<Utc>>,
}

impl ApprovalAction {
    /// A fresh pending action.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            id: ApprovalActionId::new(),
            status: ActionStatus::Pending,
            actor_id: None,
            actor_role: None,
            comment: None,
            acted_at: None,
        }
    }
}

/// One step of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    /// Step ID.
    pub id: ApprovalStepId,
    /// 1-based position.
    pub step_order: i32,
    /// Role bound to this step; never changes.
    pub role: ApproverRole,
    /// The step this one replaces through escalation.
    pub escalated_from: Option<ApprovalStepId>,
    /// The decision on this step.
    pub action: ApprovalAction,
}

impl ApprovalStep {
    /// A pending step.
    #[must_use]
    pub fn new(
        step_order: i32,
        role: ApproverRole,
        escalated_from: Option<ApprovalStepId>,
    ) -> Self {
        Self {
            id: ApprovalStepId::new(),
            step_order,
            role,
            escalated_from,
            action: ApprovalAction::pending(),
        }
    }

    /// Snapshot used in errors.
    #[must_use]
    pub fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            step_id: self.id,
            step_order: self.step_order,
            role: self.role,
            status: self.action.status,
        }
    }
}

/// Authoritative state of a step, returned with sequencing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Step ID.
    pub step_id: ApprovalStepId,
    /// Position.
    pub step_order: i32,
    /// Bound role.
    pub role: ApproverRole,
    /// Current decision.
    pub status: ActionStatus,
}

impl std::fmt::Display for StepSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {} ({}, {})", self.step_order, self.role, self.status)
    }
}

/// An approval request for one source transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request ID.
    pub id: ApprovalRequestId,
    /// Source type (never MANUAL).
    pub source_type: SourceType,
    /// Source record.
    pub source_id: i64,
    /// Amount used for routing.
    pub amount: Decimal,
    /// Request status.
    pub status: ApprovalStatus,
    /// Steps ordered by `step_order`.
    pub steps: Vec<ApprovalStep>,
    /// Set on rejection.
    pub rejection_reason: Option<String>,
    /// The rejected request this one resubmits.
    pub resubmitted_from: Option<ApprovalRequestId>,
    /// Set when the request becomes terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    /// The lowest-order step whose action is pending.
    #[must_use]
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        self.steps
            .iter()
            .filter(|s| s.action.status == ActionStatus::Pending)
            .min_by_key(|s| s.step_order)
    }

    /// Looks up a step.
    #[must_use]
    pub fn step(&self, id: ApprovalStepId) -> Option<&ApprovalStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// True when every step is approved or escalated.
    #[must_use]
    pub fn all_steps_cleared(&self) -> bool {
        self.steps.iter().all(|s| s.action.status.clears_step())
    }

    /// Roles of the steps that were not created by escalation, in order.
    #[must_use]
    pub fn base_roles(&self) -> Vec<ApproverRole> {
        let mut steps: Vec<&ApprovalStep> =
            self.steps.iter().filter(|s| s.escalated_from.is_none()).collect();
        steps.sort_by_key(|s| s.step_order);
        steps.into_iter().map(|s| s.role).collect()
    }
}

/// The person acting on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// User ID.
    pub user_id: Uuid,
    /// Role held.
    pub role: ApproverRole,
}

/// Terminal outcome forwarded to the posting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalSignal {
    /// Every step approved.
    Approved {
        /// The request.
        request_id: ApprovalRequestId,
        /// Source type.
        source_type: SourceType,
        /// Source record.
        source_id: i64,
    },
    /// A step was rejected.
    Rejected {
        /// The request.
        request_id: ApprovalRequestId,
        /// Source type.
        source_type: SourceType,
        /// Source record.
        source_id: i64,
        /// Why.
        reason: String,
    },
}

impl ApprovalSignal {
    /// The originating source.
    #[must_use]
    pub const fn source(&self) -> (SourceType, i64) {
        match self {
            Self::Approved {
                source_type,
                source_id,
                ..
            }
            | Self::Rejected {
                source_type,
                source_id,
                ..
            } => (*source_type, *source_id),
        }
    }

    /// True for `Approved`.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}
