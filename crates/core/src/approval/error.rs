//! Approval gate errors.

use rust_decimal::Decimal;
use tally_shared::AppError;
use tally_shared::types::{ApprovalRequestId, ApprovalStepId};
use thiserror::Error;

use super::types::{ApprovalStatus, ApproverRole, StepSnapshot};
use crate::ledger::types::SourceType;

/// Errors that can occur during approval operations.
#[derive(Debug, Error)]
pub enum ApprovalError {
    // ========== Request Errors ==========
    /// Approval request not found.
    #[error("Approval request {0} not found")]
    RequestNotFound(ApprovalRequestId),

    /// The request is already terminal.
    #[error("Approval request {request_id} is {status}")]
    RequestClosed {
        /// The request.
        request_id: ApprovalRequestId,
        /// Its terminal status.
        status: ApprovalStatus,
    },

    /// Manual entries bypass approval.
    #[error("{0} entries do not require approval")]
    ApprovalNotRequired(SourceType),

    /// A request needs at least one step.
    #[error("Approval request needs at least one step")]
    NoSteps,

    /// No route matched the source type and amount.
    #[error("No approval route for {source_type} with amount {amount}")]
    NoRouteFound {
        /// Source type.
        source_type: SourceType,
        /// Amount.
        amount: Decimal,
    },

    /// A PENDING or APPROVED request already exists for the source.
    #[error("{source_type} {source_id} already has an open approval request")]
    OpenRequestExists {
        /// Source type.
        source_type: SourceType,
        /// Source record.
        source_id: i64,
    },

    /// Only rejected requests can be resubmitted.
    #[error("Only rejected requests can be resubmitted, request is {0}")]
    ResubmitRequiresRejected(ApprovalStatus),

    // ========== Step Sequencing ==========
    /// The step does not belong to the request.
    #[error("Step {step_id} not found on approval request {request_id}")]
    StepNotFound {
        /// The request.
        request_id: ApprovalRequestId,
        /// The step.
        step_id: ApprovalStepId,
    },

    /// The step already has a decision.
    #[error("Step already resolved: {step}")]
    StepAlreadyResolved {
        /// Current state of the step.
        step: StepSnapshot,
    },

    /// The step is not the one currently awaiting action.
    #[error(
        "{requested} is not active; active step is {}",
        .active.as_ref().map_or_else(|| "none".to_string(), ToString::to_string)
    )]
    StepNotActive {
        /// The requested step.
        requested: StepSnapshot,
        /// The step currently awaiting action.
        active: Option<StepSnapshot>,
    },

    /// The actor's role cannot act on this step.
    #[error("Role {actual} cannot act on a step bound to {required}")]
    RoleMismatch {
        /// Role bound to the step.
        required: ApproverRole,
        /// Role the actor holds.
        actual: ApproverRole,
    },

    /// Escalation must move to a strictly higher role.
    #[error("Cannot escalate from {from} to {to}")]
    EscalationNotHigher {
        /// Current role.
        from: ApproverRole,
        /// Requested role.
        to: ApproverRole,
    },

    /// Rejection requires a reason.
    #[error("Rejection reason is required")]
    RejectionReasonRequired,

    /// Escalation requires a reason.
    #[error("Escalation reason is required")]
    EscalationReasonRequired,

    // ========== Concurrency Errors ==========
    /// Serialization failure or deadlock.
    #[error("Concurrent modification detected, please retry: {0}")]
    ConcurrentModification(String),

    // ========== Database Errors ==========
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl ApprovalError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RequestNotFound(_) => "APPROVAL_REQUEST_NOT_FOUND",
            Self::RequestClosed { .. } => "REQUEST_CLOSED",
            Self::ApprovalNotRequired(_) => "APPROVAL_NOT_REQUIRED",
            Self::NoSteps => "NO_STEPS",
            Self::NoRouteFound { .. } => "NO_ROUTE_FOUND",
            Self::OpenRequestExists { .. } => "OPEN_REQUEST_EXISTS",
            Self::ResubmitRequiresRejected(_) => "RESUBMIT_REQUIRES_REJECTED",
            Self::StepNotFound { .. } => "STEP_NOT_FOUND",
            Self::StepAlreadyResolved { .. } => "STEP_ALREADY_RESOLVED",
            Self::StepNotActive { .. } => "STEP_NOT_ACTIVE",
            Self::RoleMismatch { .. } => "ROLE_MISMATCH",
            Self::EscalationNotHigher { .. } => "ESCALATION_NOT_HIGHER",
            Self::RejectionReasonRequired => "REJECTION_REASON_REQUIRED",
            Self::EscalationReasonRequired => "ESCALATION_REASON_REQUIRED",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NoSteps
            | Self::EscalationNotHigher { .. }
            | Self::RejectionReasonRequired
            | Self::EscalationReasonRequired => 400,

            Self::RoleMismatch { .. } => 403,

            Self::RequestNotFound(_) | Self::StepNotFound { .. } => 404,

            Self::RequestClosed { .. }
            | Self::OpenRequestExists { .. }
            | Self::ResubmitRequiresRejected(_)
            | Self::StepAlreadyResolved { .. }
            | Self::StepNotActive { .. }
            | Self::ConcurrentModification(_) => 409,

            Self::ApprovalNotRequired(_) | Self::NoRouteFound { .. } => 422,

            Self::Database(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        let message = err.to_string();
        match err.http_status_code() {
            400 | 403 => Self::Validation(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            422 => Self::BusinessRule(message),
            _ => Self::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::ActionStatus;

    fn snapshot(order: i32, status: ActionStatus) -> StepSnapshot {
        StepSnapshot {
            step_id: ApprovalStepId::new(),
            step_order: order,
            role: ApproverRole::Finance,
            status,
        }
    }

    #[test]
    fn test_step_not_active_display() {
        let err = ApprovalError::StepNotActive {
            requested: snapshot(2, ActionStatus::Pending),
            active: Some(snapshot(1, ActionStatus::Pending)),
        };
        assert_eq!(
            err.to_string(),
            "step 2 (finance, PENDING) is not active; active step is step 1 (finance, PENDING)"
        );

        let err = ApprovalError::StepNotActive {
            requested: snapshot(2, ActionStatus::Pending),
            active: None,
        };
        assert!(err.to_string().ends_with("active step is none"));
    }

    #[test]
    fn test_codes_and_status() {
        let err = ApprovalError::StepAlreadyResolved {
            step: snapshot(1, ActionStatus::Approved),
        };
        assert_eq!(err.error_code(), "STEP_ALREADY_RESOLVED");
        assert_eq!(err.http_status_code(), 409);

        let err = ApprovalError::RoleMismatch {
            required: ApproverRole::Director,
            actual: ApproverRole::Finance,
        };
        assert_eq!(err.http_status_code(), 403);
        assert!(!err.is_retryable());
        assert!(ApprovalError::ConcurrentModification(String::new()).is_retryable());
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = ApprovalError::ApprovalNotRequired(SourceType::Manual).into();
        assert_eq!(app.status_code(), 422);

        let app: AppError = ApprovalError::RequestNotFound(ApprovalRequestId::new()).into();
        assert_eq!(app.status_code(), 404);

        let app: AppError = ApprovalError::RejectionReasonRequired.into();
        assert_eq!(app.status_code(), 400);
    }
}
