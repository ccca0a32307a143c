//! Approval state machine.
//!
//! ```text
//! request: PENDING -> APPROVED   (every step approved or escalated)
//!          PENDING -> REJECTED   (any step rejected)
//! action:  PENDING -> APPROVED | REJECTED | ESCALATED
//! ```
//!
//! Functions here never mutate; they return an [`ApprovalTransition`]
//! describing exactly what the storage layer must write.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{ApprovalRequestId, ApprovalStepId};

use super::error::ApprovalError;
use super::types::{
    ActionStatus, Actor, ApprovalAction, ApprovalRequest, ApprovalSignal, ApprovalStatus,
    ApprovalStep, ApproverRole,
};
use crate::ledger::types::SourceType;

/// Result of a successful action on a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalTransition {
    /// The step acted upon.
    pub step_id: ApprovalStepId,
    /// Its resolved action.
    pub action: ApprovalAction,
    /// Replacement step created by escalation.
    pub inserted_step: Option<ApprovalStep>,
    /// Request status afterwards.
    pub request_status: ApprovalStatus,
    /// Rejection reason, when rejected.
    pub rejection_reason: Option<String>,
    /// Set when the request became terminal.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal signal to forward after commit.
    pub signal: Option<ApprovalSignal>,
}

impl ApprovalTransition {
    /// Applies the transition to an in-memory request.
    pub fn apply(&self, request: &mut ApprovalRequest) {
        if let Some(step) = request.steps.iter_mut().find(|s| s.id == self.step_id) {
            step.action = self.action.clone();
        }
        if let Some(inserted) = &self.inserted_step {
            for step in &mut request.steps {
                if step.step_order >= inserted.step_order {
                    step.step_order += 1;
                }
            }
            request.steps.push(inserted.clone());
            request.steps.sort_by_key(|s| s.step_order);
        }
        request.status = self.request_status;
        if self.rejection_reason.is_some() {
            request.rejection_reason.clone_from(&self.rejection_reason);
        }
        if self.completed_at.is_some() {
            request.completed_at = self.completed_at;
        }
    }
}

/// Stateless approval gate.
pub struct ApprovalGate;

impl ApprovalGate {
    /// Opens a PENDING request with one pending step per role.
    ///
    /// # Errors
    ///
    /// - `ApprovalNotRequired` for manual sources
    /// - `NoSteps` for an empty role list
    pub fn open(
        source_type: SourceType,
        source_id: i64,
        amount: Decimal,
        roles: &[ApproverRole],
    ) -> Result<ApprovalRequest, ApprovalError> {
        if !source_type.requires_approval() {
            return Err(ApprovalError::ApprovalNotRequired(source_type));
        }
        if roles.is_empty() {
            return Err(ApprovalError::NoSteps);
        }

        let steps = (1..)
            .zip(roles)
            .map(|(order, role)| ApprovalStep::new(order, *role, None))
            .collect();

        Ok(ApprovalRequest {
            id: ApprovalRequestId::new(),
            source_type,
            source_id,
            amount,
            status: ApprovalStatus::Pending,
            steps,
            rejection_reason: None,
            resubmitted_from: None,
            completed_at: None,
        })
    }

    /// Checks that `actor` may act on `step_id` now.
    ///
    /// Errors come in this order: `RequestClosed`, `StepNotFound`,
    /// `StepAlreadyResolved`, `StepNotActive`, `RoleMismatch`.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check_actionable<'a>(
        request: &'a ApprovalRequest,
        step_id: ApprovalStepId,
        actor: &Actor,
    ) -> Result<&'a ApprovalStep, ApprovalError> {
        if request.status.is_terminal() {
            return Err(ApprovalError::RequestClosed {
                request_id: request.id,
                status: request.status,
            });
        }

        let step = request.step(step_id).ok_or(ApprovalError::StepNotFound {
            request_id: request.id,
            step_id,
        })?;

        if step.action.status.is_resolved() {
            return Err(ApprovalError::StepAlreadyResolved {
                step: step.snapshot(),
            });
        }

        let active = request.active_step();
        if active.map(|s| s.id) != Some(step.id) {
            return Err(ApprovalError::StepNotActive {
                requested: step.snapshot(),
                active: active.map(ApprovalStep::snapshot),
            });
        }

        if !actor.role.can_act_for(step.role) {
            return Err(ApprovalError::RoleMismatch {
                required: step.role,
                actual: actor.role,
            });
        }

        Ok(step)
    }

    /// Approves the active step. The last approval closes the request.
    ///
    /// # Errors
    ///
    /// Returns the `check_actionable` errors.
    pub fn approve(
        request: &ApprovalRequest,
        step_id: ApprovalStepId,
        actor: &Actor,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, ApprovalError> {
        let step = Self::check_actionable(request, step_id, actor)?;

        let others_pending = request
            .steps
            .iter()
            .any(|s| s.id != step.id && s.action.status == ActionStatus::Pending);

        let (request_status, completed_at, signal) = if others_pending {
            (ApprovalStatus::Pending, None, None)
        } else {
            (
                ApprovalStatus::Approved,
                Some(now),
                Some(ApprovalSignal::Approved {
                    request_id: request.id,
                    source_type: request.source_type,
                    source_id: request.source_id,
                }),
            )
        };

        Ok(ApprovalTransition {
            step_id: step.id,
            action: Self::resolve(step, ActionStatus::Approved, actor, comment, now),
            inserted_step: None,
            request_status,
            rejection_reason: None,
            completed_at,
            signal,
        })
    }

    /// Rejects the active step, closing the request.
    ///
    /// # Errors
    ///
    /// Returns the `check_actionable` errors, then `RejectionReasonRequired`.
    pub fn reject(
        request: &ApprovalRequest,
        step_id: ApprovalStepId,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, ApprovalError> {
        let step = Self::check_actionable(request, step_id, actor)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApprovalError::RejectionReasonRequired);
        }

        Ok(ApprovalTransition {
            step_id: step.id,
            action: Self::resolve(
                step,
                ActionStatus::Rejected,
                actor,
                Some(reason.to_string()),
                now,
            ),
            inserted_step: None,
            request_status: ApprovalStatus::Rejected,
            rejection_reason: Some(reason.to_string()),
            completed_at: Some(now),
            signal: Some(ApprovalSignal::Rejected {
                request_id: request.id,
                source_type: request.source_type,
                source_id: request.source_id,
                reason: reason.to_string(),
            }),
        })
    }

    /// Hands the active step to a higher role.
    ///
    /// The original step keeps its role and is marked ESCALATED; a new
    /// pending step bound to `to_role` is inserted right after it.
    ///
    /// # Errors
    ///
    /// Returns the `check_actionable` errors, then `EscalationNotHigher`
    /// and `EscalationReasonRequired`.
    pub fn escalate(
        request: &ApprovalRequest,
        step_id: ApprovalStepId,
        actor: &Actor,
        to_role: ApproverRole,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, ApprovalError> {
        let step = Self::check_actionable(request, step_id, actor)?;

        if to_role <= step.role {
            return Err(ApprovalError::EscalationNotHigher {
                from: step.role,
                to: to_role,
            });
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApprovalError::EscalationReasonRequired);
        }

        Ok(ApprovalTransition {
            step_id: step.id,
            action: Self::resolve(
                step,
                ActionStatus::Escalated,
                actor,
                Some(reason.to_string()),
                now,
            ),
            inserted_step: Some(ApprovalStep::new(step.step_order + 1, to_role, Some(step.id))),
            request_status: ApprovalStatus::Pending,
            rejection_reason: None,
            completed_at: None,
            signal: None,
        })
    }

    /// Starts a new request for a rejected source, with its original roles.
    ///
    /// # Errors
    ///
    /// Returns `ResubmitRequiresRejected` unless `previous` is REJECTED.
    pub fn resubmit(
        previous: &ApprovalRequest,
        amount: Decimal,
    ) -> Result<ApprovalRequest, ApprovalError> {
        if previous.status != ApprovalStatus::Rejected {
            return Err(ApprovalError::ResubmitRequiresRejected(previous.status));
        }

        let mut request = Self::open(
            previous.source_type,
            previous.source_id,
            amount,
            &previous.base_roles(),
        )?;
        request.resubmitted_from = Some(previous.id);
        Ok(request)
    }

    fn resolve(
        step: &ApprovalStep,
        status: ActionStatus,
        actor: &Actor,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> ApprovalAction {
        ApprovalAction {
            id: step.action.id,
            status,
            actor_id: Some(actor.user_id),
            actor_role: Some(actor.role),
            comment,
            acted_at: Some(now),
        }
    }
}
