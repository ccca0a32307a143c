//! Approval request repository.
//!
//! Every action locks the request row first, then replays the step and
//! action rows into the domain request and lets the approval gate decide.
//! Two approvers racing on the same step serialize on that lock; the loser
//! sees the resolved action and gets `StepAlreadyResolved`.
//!
//! Terminal outcomes are written to the `approval_signals` outbox in the
//! deciding transaction. Listeners are called after commit and the row is
//! then marked delivered; rows left undelivered by a crash are replayed by
//! [`ApprovalRepository::deliver_pending_signals`]. Delivery is
//! at-least-once, so listeners must be idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, Unchanged,
};
use tracing::{info, warn};
use uuid::Uuid;

use tally_core::approval::{
    Actor, ApprovalAction, ApprovalError, ApprovalGate, ApprovalRequest, ApprovalRoute,
    ApprovalRouter, ApprovalSignal, ApprovalStatus, ApprovalStep, ApprovalTransition,
    ApproverRole,
};
use tally_core::ledger::SourceType;
use tally_shared::types::{ApprovalActionId, ApprovalRequestId, ApprovalStepId};

use crate::entities::sea_orm_active_enums::SourceType as DbSourceType;
use crate::entities::{approval_actions, approval_requests, approval_signals, approval_steps};
use crate::error::{approval_error, is_unique_violation};

const LIVE_INDEX: &str = "uq_approval_requests_live";

/// Receives terminal approval outcomes after they are committed.
#[async_trait]
pub trait ApprovalListener: Send + Sync {
    /// Called for a request reaching APPROVED or REJECTED. A signal may be
    /// delivered more than once.
    async fn on_terminal(&self, signal: &ApprovalSignal);
}

/// Approval request repository.
#[derive(Clone)]
pub struct ApprovalRepository {
    db: DatabaseConnection,
    routes: Vec<ApprovalRoute>,
    listeners: Vec<Arc<dyn ApprovalListener>>,
}

impl std::fmt::Debug for ApprovalRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRepository")
            .field("routes", &self.routes)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ApprovalRepository {
    /// Creates a repository using the default routes.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            routes: ApprovalRouter::default_routes(),
            listeners: Vec::new(),
        }
    }

    /// Replaces the routing table.
    #[must_use]
    pub fn with_routes(mut self, routes: Vec<ApprovalRoute>) -> Self {
        self.routes = routes;
        self
    }

    /// Registers a listener for terminal outcomes.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ApprovalListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Opens a request with steps chosen by the routing table.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalNotRequired`, `NoRouteFound` or `OpenRequestExists`.
    pub async fn open_request(
        &self,
        source_type: SourceType,
        source_id: i64,
        amount: Decimal,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let roles = ApprovalRouter::steps_for(&self.routes, source_type, amount)?;
        self.open_request_with_roles(source_type, source_id, amount, &roles)
            .await
    }

    /// Opens a request with an explicit step list.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalNotRequired`, `NoSteps` or `OpenRequestExists`.
    pub async fn open_request_with_roles(
        &self,
        source_type: SourceType,
        source_id: i64,
        amount: Decimal,
        roles: &[ApproverRole],
    ) -> Result<ApprovalRequest, ApprovalError> {
        let request = ApprovalGate::open(source_type, source_id, amount, roles)?;
        self.insert_request(&request).await?;

        info!(
            request_id = %request.id,
            source_type = %source_type,
            source_id,
            amount = %amount,
            steps = request.steps.len(),
            "approval request opened"
        );
        Ok(request)
    }

    /// Opens a new request for the source of a rejected one.
    ///
    /// # Errors
    ///
    /// Returns `RequestNotFound`, `ResubmitRequiresRejected` or
    /// `OpenRequestExists`.
    pub async fn resubmit(
        &self,
        previous_id: ApprovalRequestId,
        amount: Decimal,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let previous = self.find_request(previous_id).await?;
        let request = ApprovalGate::resubmit(&previous, amount)?;
        self.insert_request(&request).await?;

        info!(
            request_id = %request.id,
            resubmitted_from = %previous_id,
            amount = %amount,
            "approval request resubmitted"
        );
        Ok(request)
    }

    /// Approves the active step.
    ///
    /// # Errors
    ///
    /// Returns the sequencing error raised by the gate.
    pub async fn approve(
        &self,
        request_id: ApprovalRequestId,
        step_id: ApprovalStepId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.act(request_id, "approved", |request, now| {
            ApprovalGate::approve(request, step_id, &actor, comment.clone(), now)
        })
        .await
    }

    /// Rejects the active step and the request with it.
    ///
    /// # Errors
    ///
    /// Returns `RejectionReasonRequired` or a sequencing error.
    pub async fn reject(
        &self,
        request_id: ApprovalRequestId,
        step_id: ApprovalStepId,
        actor: Actor,
        reason: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.act(request_id, "rejected", |request, now| {
            ApprovalGate::reject(request, step_id, &actor, reason, now)
        })
        .await
    }

    /// Hands the active step to a higher role.
    ///
    /// # Errors
    ///
    /// Returns `EscalationReasonRequired`, `EscalationNotHigher` or a
    /// sequencing error.
    pub async fn escalate(
        &self,
        request_id: ApprovalRequestId,
        step_id: ApprovalStepId,
        actor: Actor,
        to_role: ApproverRole,
        reason: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.act(request_id, "escalated", |request, now| {
            ApprovalGate::escalate(request, step_id, &actor, to_role, reason, now)
        })
        .await
    }

    /// Loads a request with its steps.
    ///
    /// # Errors
    ///
    /// Returns `RequestNotFound` if the request does not exist.
    pub async fn find_request(
        &self,
        request_id: ApprovalRequestId,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let row = approval_requests::Entity::find_by_id(request_id.into_inner())
            .one(&self.db)
            .await
            .map_err(approval_error)?
            .ok_or(ApprovalError::RequestNotFound(request_id))?;
        load_request(&self.db, row).await.map_err(approval_error)
    }

    /// The most recent request of a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn latest_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
    ) -> Result<Option<ApprovalRequest>, ApprovalError> {
        let Some(row) = latest_row(&self.db, source_type, source_id)
            .await
            .map_err(approval_error)?
        else {
            return Ok(None);
        };
        load_request(&self.db, row)
            .await
            .map(Some)
            .map_err(approval_error)
    }

    /// Delivers up to `limit` outbox signals no listener has confirmed yet,
    /// oldest first.
    ///
    /// Meant to run at startup and on a timer in the process that registers
    /// the listeners. Concurrent callers skip each other's rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn deliver_pending_signals(&self, limit: u64) -> Result<u64, ApprovalError> {
        let mut delivered = 0;
        while delivered < limit {
            let txn = self.db.begin().await.map_err(approval_error)?;
            let Some(row) = approval_signals::Entity::find()
                .filter(approval_signals::Column::DeliveredAt.is_null())
                .order_by_asc(approval_signals::Column::CreatedAt)
                .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
                .one(&txn)
                .await
                .map_err(approval_error)?
            else {
                break;
            };

            let signal = signal_from_row(&row);
            self.notify(&signal).await;
            mark_delivered(&txn, row.id).await.map_err(approval_error)?;
            txn.commit().await.map_err(approval_error)?;

            info!(request_id = %row.request_id, "pending approval signal delivered");
            delivered += 1;
        }
        Ok(delivered)
    }

    async fn notify(&self, signal: &ApprovalSignal) {
        for listener in &self.listeners {
            listener.on_terminal(signal).await;
        }
    }

    async fn act<F>(
        &self,
        request_id: ApprovalRequestId,
        verb: &str,
        decide: F,
    ) -> Result<ApprovalRequest, ApprovalError>
    where
        F: FnOnce(&ApprovalRequest, DateTime<Utc>) -> Result<ApprovalTransition, ApprovalError>,
    {
        let txn = self.db.begin().await.map_err(approval_error)?;

        let row = approval_requests::Entity::find_by_id(request_id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(approval_error)?
            .ok_or(ApprovalError::RequestNotFound(request_id))?;
        let mut request = load_request(&txn, row).await.map_err(approval_error)?;

        let transition = decide(&request, Utc::now())?;
        persist_transition(&txn, request_id, &transition)
            .await
            .map_err(approval_error)?;
        let outbox_id = match &transition.signal {
            Some(signal) => Some(insert_signal(&txn, signal).await.map_err(approval_error)?),
            None => None,
        };

        txn.commit().await.map_err(approval_error)?;
        transition.apply(&mut request);

        info!(
            request_id = %request_id,
            step_id = %transition.step_id,
            status = %request.status,
            "approval step {verb}"
        );

        if let (Some(signal), Some(outbox_id)) = (&transition.signal, outbox_id) {
            self.notify(signal).await;
            // Left for deliver_pending_signals if this fails.
            if let Err(e) = mark_delivered(&self.db, outbox_id).await {
                warn!(%request_id, error = %e, "approval signal not marked delivered");
            }
        }
        Ok(request)
    }

    async fn insert_request(&self, request: &ApprovalRequest) -> Result<(), ApprovalError> {
        let txn = self.db.begin().await.map_err(approval_error)?;

        let inserted = approval_requests::ActiveModel {
            id: Set(request.id.into_inner()),
            source_type: Set(request.source_type.into()),
            source_id: Set(request.source_id),
            amount: Set(request.amount),
            status: Set(request.status.into()),
            rejection_reason: Set(None),
            resubmitted_from: Set(request.resubmitted_from.map(ApprovalRequestId::into_inner)),
            created_at: Set(Utc::now().into()),
            completed_at: Set(None),
        }
        .insert(&txn)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e, LIVE_INDEX) {
                warn!(
                    source_type = %request.source_type,
                    source_id = request.source_id,
                    "approval request already open for source"
                );
                return Err(ApprovalError::OpenRequestExists {
                    source_type: request.source_type,
                    source_id: request.source_id,
                });
            }
            return Err(approval_error(e));
        }

        for step in &request.steps {
            insert_step(&txn, request.id, step)
                .await
                .map_err(approval_error)?;
        }

        txn.commit().await.map_err(approval_error)
    }
}

async fn insert_signal<C: ConnectionTrait>(
    conn: &C,
    signal: &ApprovalSignal,
) -> Result<Uuid, DbErr> {
    let (request_id, approved, reason) = match signal {
        ApprovalSignal::Approved { request_id, .. } => (*request_id, true, None),
        ApprovalSignal::Rejected {
            request_id, reason, ..
        } => (*request_id, false, Some(reason.clone())),
    };
    let (source_type, source_id) = signal.source();

    let row = approval_signals::ActiveModel {
        id: Set(Uuid::now_v7()),
        request_id: Set(request_id.into_inner()),
        source_type: Set(source_type.into()),
        source_id: Set(source_id),
        approved: Set(approved),
        reason: Set(reason),
        created_at: Set(Utc::now().into()),
        delivered_at: Set(None),
    }
    .insert(conn)
    .await?;
    Ok(row.id)
}

async fn mark_delivered<C: ConnectionTrait>(conn: &C, signal_id: Uuid) -> Result<(), DbErr> {
    approval_signals::Entity::update_many()
        .col_expr(approval_signals::Column::DeliveredAt, Expr::value(Utc::now()))
        .filter(approval_signals::Column::Id.eq(signal_id))
        .filter(approval_signals::Column::DeliveredAt.is_null())
        .exec(conn)
        .await?;
    Ok(())
}

fn signal_from_row(row: &approval_signals::Model) -> ApprovalSignal {
    let request_id = ApprovalRequestId::from(row.request_id);
    let source_type = row.source_type.into();
    if row.approved {
        ApprovalSignal::Approved {
            request_id,
            source_type,
            source_id: row.source_id,
        }
    } else {
        ApprovalSignal::Rejected {
            request_id,
            source_type,
            source_id: row.source_id,
            reason: row.reason.clone().unwrap_or_default(),
        }
    }
}

/// Status of the most recent approval request of a source.
pub(crate) async fn latest_status<C: ConnectionTrait>(
    conn: &C,
    source_type: SourceType,
    source_id: i64,
) -> Result<Option<ApprovalStatus>, DbErr> {
    Ok(latest_row(conn, source_type, source_id)
        .await?
        .map(|r| r.status.into()))
}

async fn latest_row<C: ConnectionTrait>(
    conn: &C,
    source_type: SourceType,
    source_id: i64,
) -> Result<Option<approval_requests::Model>, DbErr> {
    approval_requests::Entity::find()
        .filter(approval_requests::Column::SourceType.eq(DbSourceType::from(source_type)))
        .filter(approval_requests::Column::SourceId.eq(source_id))
        .order_by_desc(approval_requests::Column::CreatedAt)
        .order_by_desc(approval_requests::Column::Id)
        .one(conn)
        .await
}

async fn load_request<C: ConnectionTrait>(
    conn: &C,
    row: approval_requests::Model,
) -> Result<ApprovalRequest, DbErr> {
    let steps = approval_steps::Entity::find()
        .filter(approval_steps::Column::RequestId.eq(row.id))
        .order_by_asc(approval_steps::Column::StepOrder)
        .find_also_related(approval_actions::Entity)
        .all(conn)
        .await?;

    let steps = steps
        .into_iter()
        .map(|(step, action)| {
            let action = action.ok_or_else(|| {
                DbErr::RecordNotFound(format!("approval action for step {}", step.id))
            })?;
            Ok(to_step(step, action))
        })
        .collect::<Result<Vec<_>, DbErr>>()?;

    Ok(ApprovalRequest {
        id: ApprovalRequestId::from_uuid(row.id),
        source_type: row.source_type.into(),
        source_id: row.source_id,
        amount: row.amount,
        status: row.status.into(),
        steps,
        rejection_reason: row.rejection_reason,
        resubmitted_from: row.resubmitted_from.map(ApprovalRequestId::from_uuid),
        completed_at: row.completed_at.map(|t| t.with_timezone(&Utc)),
    })
}

fn to_step(step: approval_steps::Model, action: approval_actions::Model) -> ApprovalStep {
    ApprovalStep {
        id: ApprovalStepId::from_uuid(step.id),
        step_order: step.step_order,
        role: step.role.into(),
        escalated_from: step.escalated_from.map(ApprovalStepId::from_uuid),
        action: ApprovalAction {
            id: ApprovalActionId::from_uuid(action.id),
            status: action.status.into(),
            actor_id: action.actor_id,
            actor_role: action.actor_role.map(Into::into),
            comment: action.comment,
            acted_at: action.acted_at.map(|t| t.with_timezone(&Utc)),
        },
    }
}

async fn insert_step<C: ConnectionTrait>(
    conn: &C,
    request_id: ApprovalRequestId,
    step: &ApprovalStep,
) -> Result<(), DbErr> {
    approval_steps::ActiveModel {
        id: Set(step.id.into_inner()),
        request_id: Set(request_id.into_inner()),
        step_order: Set(step.step_order),
        role: Set(step.role.into()),
        escalated_from: Set(step.escalated_from.map(ApprovalStepId::into_inner)),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await?;

    approval_actions::ActiveModel {
        id: Set(step.action.id.into_inner()),
        step_id: Set(step.id.into_inner()),
        status: Set(step.action.status.into()),
        actor_id: Set(step.action.actor_id),
        actor_role: Set(step.action.actor_role.map(Into::into)),
        comment: Set(step.action.comment.clone()),
        acted_at: Set(step.action.acted_at.map(Into::into)),
    }
    .insert(conn)
    .await?;

    Ok(())
}

async fn persist_transition<C: ConnectionTrait>(
    conn: &C,
    request_id: ApprovalRequestId,
    transition: &ApprovalTransition,
) -> Result<(), DbErr> {
    let action = &transition.action;
    approval_actions::ActiveModel {
        id: Unchanged(action.id.into_inner()),
        status: Set(action.status.into()),
        actor_id: Set(action.actor_id),
        actor_role: Set(action.actor_role.map(Into::into)),
        comment: Set(action.comment.clone()),
        acted_at: Set(action.acted_at.map(Into::into)),
        ..Default::default()
    }
    .update(conn)
    .await?;

    if let Some(inserted) = &transition.inserted_step {
        // uq_approval_steps_order is deferrable, so the shift is checked per statement.
        approval_steps::Entity::update_many()
            .col_expr(
                approval_steps::Column::StepOrder,
                Expr::col(approval_steps::Column::StepOrder).add(1),
            )
            .filter(approval_steps::Column::RequestId.eq(request_id.into_inner()))
            .filter(approval_steps::Column::StepOrder.gte(inserted.step_order))
            .exec(conn)
            .await?;
        insert_step(conn, request_id, inserted).await?;
    }

    let mut request = approval_requests::ActiveModel {
        id: Unchanged(request_id.into_inner()),
        status: Set(transition.request_status.into()),
        ..Default::default()
    };
    if let Some(reason) = &transition.rejection_reason {
        request.rejection_reason = Set(Some(reason.clone()));
    }
    if let Some(completed_at) = transition.completed_at {
        request.completed_at = Set(Some(completed_at.into()));
    }
    request.update(conn).await?;

    Ok(())
}
