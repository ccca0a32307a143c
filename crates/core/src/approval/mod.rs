//! Approval gate for source transactions.
//!
//! This module implements:
//! - Approver roles and request/step/action types
//! - Routing rules that pick the approval steps
//! - The step-ordered approval state machine, including escalation
//! - Approval error types

pub mod error;
pub mod gate;
pub mod router;
pub mod types;

#[cfg(test)]
mod gate_props;

pub use error::ApprovalError;
pub use gate::{ApprovalGate, ApprovalTransition};
pub use router::{ApprovalRoute, ApprovalRouter};
pub use types::{
    ActionStatus, Actor, ApprovalAction, ApprovalRequest, ApprovalSignal, ApprovalStatus,
    ApprovalStep, ApproverRole, StepSnapshot,
};
