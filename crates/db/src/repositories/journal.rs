//! Journal ledger repository.
//!
//! Drafts are saved without a number. Posting happens in one transaction:
//! a sourced entry is authorized against its source record and approval,
//! the entry date is checked against closed periods, the touched accounts
//! are locked, the entry gets the next number from the per-year counter,
//! its status flips to POSTED and the balance synchronizer recomputes every
//! affected balance. Voiding inserts and posts a compensating entry in the
//! same way and stamps the original.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use tally_core::ledger::{
    EntryNumber, EntryTotals, JournalDraft, LedgerError, LedgerService, ReferenceKind,
    ResolvedLine, ReversalService, SourceType, VoidTarget,
};
use tally_core::posting::{PostingRules, SourceKey};
use tally_shared::config::LedgerConfig;
use tally_shared::types::{JournalEntryId, JournalLineId};

use super::approval::latest_status;
use super::balance::{BalanceSynchronizer, LockedAccounts};
use super::period::ensure_period_open;
use super::source::{PgSourceRegistry, SourceRegistry};
use crate::entities::sea_orm_active_enums::{EntryStatus, SourceType as DbSourceType};
use crate::entities::{journal_entries, journal_lines};
use crate::error::{is_unique_violation, ledger_error};

const SOURCE_INDEX: &str = "uq_journal_entries_source";

const NEXT_NUMBER_SQL: &str = r"
INSERT INTO journal_entry_counters (prefix, year, last_value)
VALUES ($1, $2, 1)
ON CONFLICT (prefix, year)
DO UPDATE SET last_value = journal_entry_counters.last_value + 1, updated_at = now()
RETURNING last_value
";

/// A journal entry with its lines in line order.
#[derive(Debug, Clone)]
pub struct JournalEntryWithLines {
    /// The entry header.
    pub entry: journal_entries::Model,
    /// The lines.
    pub lines: Vec<journal_lines::Model>,
}

impl JournalEntryWithLines {
    /// Lines in the form the ledger rules work on.
    #[must_use]
    pub fn resolved_lines(&self) -> Vec<ResolvedLine> {
        self.lines
            .iter()
            .map(|l| ResolvedLine {
                account_id: l.account_id,
                line_number: l.line_number,
                debit: l.debit,
                credit: l.credit,
                description: l.description.clone(),
            })
            .collect()
    }

    /// Distinct accounts touched by the lines.
    #[must_use]
    pub fn account_ids(&self) -> Vec<Uuid> {
        account_ids(&self.resolved_lines())
    }
}

/// Result of an idempotent write keyed by source transaction.
#[derive(Debug, Clone)]
pub enum PostingOutcome {
    /// A new entry was written.
    Created(JournalEntryWithLines),
    /// The source already had a live entry; it is returned unchanged.
    Existing(JournalEntryWithLines),
}

impl PostingOutcome {
    /// The entry, new or existing.
    #[must_use]
    pub const fn entry(&self) -> &JournalEntryWithLines {
        match self {
            Self::Created(e) | Self::Existing(e) => e,
        }
    }

    /// Consumes the outcome and returns the entry.
    #[must_use]
    pub fn into_entry(self) -> JournalEntryWithLines {
        match self {
            Self::Created(e) | Self::Existing(e) => e,
        }
    }

    /// True when nothing was written.
    #[must_use]
    pub const fn is_existing(&self) -> bool {
        matches!(self, Self::Existing(_))
    }
}

/// A voided entry and the entry that compensates it.
#[derive(Debug, Clone)]
pub struct VoidResult {
    /// The original, now stamped with the void audit columns.
    pub original: journal_entries::Model,
    /// The posted compensating entry.
    pub compensating: JournalEntryWithLines,
}

/// Journal ledger repository.
#[derive(Clone)]
pub struct JournalRepository {
    db: DatabaseConnection,
    config: LedgerConfig,
    registry: Arc<dyn SourceRegistry>,
}

impl std::fmt::Debug for JournalRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalRepository")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JournalRepository {
    /// Creates a journal repository checking sources against the source tables.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: LedgerConfig) -> Self {
        let registry = Arc::new(PgSourceRegistry::new(db.clone()));
        Self {
            db,
            config,
            registry,
        }
    }

    /// Replaces the source registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn SourceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The posting configuration in use.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Saves an unnumbered draft.
    ///
    /// A draft may be unbalanced. A source transaction with a live entry
    /// gets that entry back instead of a second one.
    ///
    /// # Errors
    ///
    /// Returns the structural violation for a malformed draft, or a
    /// storage error.
    pub async fn save_draft(
        &self,
        draft: &JournalDraft,
    ) -> Result<PostingOutcome, LedgerError> {
        let lines = LedgerService::validate_draft(draft)?;
        let totals = EntryTotals::from_lines(&lines)?;
        if let Some(existing) = self.existing_for(draft).await? {
            return Ok(PostingOutcome::Existing(existing));
        }

        let txn = self.db.begin().await.map_err(ledger_error)?;
        let header = DraftHeader::from(draft);
        let saved = match insert_entry(&txn, &header, &lines, totals).await {
            Ok(saved) => saved,
            Err(e) if is_unique_violation(&e, SOURCE_INDEX) => {
                drop(txn);
                return self.existing_after_conflict(draft, e).await;
            }
            Err(e) => return Err(ledger_error(e)),
        };
        txn.commit().await.map_err(ledger_error)?;

        info!(
            entry_id = %saved.entry.id,
            source_type = %draft.source_type,
            lines = saved.lines.len(),
            "journal draft saved"
        );
        Ok(PostingOutcome::Created(saved))
    }

    /// Posts a stored draft.
    ///
    /// A sourced draft needs an existing source record whose latest
    /// approval request is APPROVED.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `InvalidStatusTransition` for a non-draft,
    /// `DanglingReference` or `NotApproved` for its source, `PeriodClosed`,
    /// or the posting rule violated by the stored lines.
    pub async fn post_draft(
        &self,
        entry_id: Uuid,
    ) -> Result<JournalEntryWithLines, LedgerError> {
        let posted = self
            .with_retries("post_draft", || self.try_post_draft(entry_id))
            .await?;

        info!(
            entry_id = %posted.entry.id,
            entry_number = posted.entry.entry_number.as_deref().unwrap_or_default(),
            total = %posted.entry.total_debit,
            "journal entry posted"
        );
        Ok(posted)
    }

    async fn try_post_draft(
        &self,
        entry_id: Uuid,
    ) -> Result<JournalEntryWithLines, LedgerError> {
        let txn = self.db.begin().await.map_err(ledger_error)?;

        let entry = lock_entry(&txn, entry_id).await?;
        LedgerService::validate_transition(entry.status.into(), EntryStatus::Posted.into())?;
        if let Some(key) = originating_source(
            entry.source_type.into(),
            entry.source_id,
            entry.reverses_entry_id,
        ) {
            self.authorize_source(&txn, key).await?;
        }
        ensure_period_open(&txn, entry.entry_date).await?;

        let lines = load_lines(&txn, entry_id).await.map_err(ledger_error)?;
        let draft = JournalEntryWithLines { entry, lines };

        let resolved = draft.resolved_lines();
        let locked = BalanceSynchronizer::lock(&txn, &account_ids(&resolved)).await?;
        let totals = LedgerService::check_postable(
            &resolved,
            self.config.balance_tolerance,
            |id| locked.info(id),
        )?;

        let posted = self.post_locked(&txn, draft, totals, &locked).await?;
        txn.commit().await.map_err(ledger_error)?;
        Ok(posted)
    }

    /// Discards a draft. The row stays as VOID for audit.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` or `InvalidStatusTransition` for a non-draft.
    pub async fn discard_draft(
        &self,
        entry_id: Uuid,
    ) -> Result<journal_entries::Model, LedgerError> {
        let txn = self.db.begin().await.map_err(ledger_error)?;

        let entry = lock_entry(&txn, entry_id).await?;
        LedgerService::validate_transition(entry.status.into(), EntryStatus::Void.into())?;

        let mut active: journal_entries::ActiveModel = entry.into();
        active.status = Set(EntryStatus::Void);
        active.updated_at = Set(Utc::now().into());
        let discarded = active.update(&txn).await.map_err(ledger_error)?;

        txn.commit().await.map_err(ledger_error)?;

        info!(entry_id = %discarded.id, "journal draft discarded");
        Ok(discarded)
    }

    /// Validates, inserts and posts an entry in one transaction.
    ///
    /// Idempotent per source transaction: a posted live entry of the source
    /// is returned and nothing is written, a live draft is posted with its
    /// stored lines. A sourced entry needs an existing source record whose
    /// latest approval request is APPROVED.
    ///
    /// # Errors
    ///
    /// Returns the first posting rule violated; nothing is persisted.
    pub async fn create_and_post(
        &self,
        draft: &JournalDraft,
    ) -> Result<PostingOutcome, LedgerError> {
        let outcome = self
            .with_retries("create_and_post", || self.try_create_and_post(draft))
            .await?;
        let outcome = match outcome {
            PostingOutcome::Existing(existing) => self.settle_existing(existing).await?,
            created => created,
        };

        if let PostingOutcome::Created(posted) = &outcome {
            info!(
                entry_id = %posted.entry.id,
                entry_number = posted.entry.entry_number.as_deref().unwrap_or_default(),
                source_type = %draft.source_type,
                source_id = ?draft.source_id,
                total = %posted.entry.total_debit,
                "journal entry posted"
            );
        }
        Ok(outcome)
    }

    async fn try_create_and_post(
        &self,
        draft: &JournalDraft,
    ) -> Result<PostingOutcome, LedgerError> {
        let lines = LedgerService::validate_draft(draft)?;
        if let Some(existing) = self.existing_for(draft).await? {
            return Ok(PostingOutcome::Existing(existing));
        }

        let txn = self.db.begin().await.map_err(ledger_error)?;

        if let Some(key) = originating_source(draft.source_type, draft.source_id, None) {
            self.authorize_source(&txn, key).await?;
        }
        ensure_period_open(&txn, draft.entry_date).await?;

        let locked = BalanceSynchronizer::lock(&txn, &account_ids(&lines)).await?;
        let totals = LedgerService::check_postable(
            &lines,
            self.config.balance_tolerance,
            |id| locked.info(id),
        )?;

        let header = DraftHeader::from(draft);
        let saved = match insert_entry(&txn, &header, &lines, totals).await {
            Ok(saved) => saved,
            Err(e) if is_unique_violation(&e, SOURCE_INDEX) => {
                drop(txn);
                return self.existing_after_conflict(draft, e).await;
            }
            Err(e) => return Err(ledger_error(e)),
        };

        let posted = self.post_locked(&txn, saved, totals, &locked).await?;
        txn.commit().await.map_err(ledger_error)?;
        Ok(PostingOutcome::Created(posted))
    }

    /// Voids a posted entry with a compensating entry.
    ///
    /// The original keeps its lines and POSTED status; it is stamped with
    /// the compensating entry, the reason and the time. Lines posted to an
    /// account deactivated since are not reversible until it is reactivated.
    /// The compensating entry is dated today, so today must not fall in a
    /// closed period.
    ///
    /// # Errors
    ///
    /// Returns `VoidReasonRequired`, `EntryNotFound`, `NotPosted`,
    /// `CannotVoidCompensating`, `AlreadyVoided`, `PeriodClosed` or an
    /// account error.
    pub async fn void_entry(
        &self,
        entry_id: Uuid,
        reason: &str,
    ) -> Result<VoidResult, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::VoidReasonRequired);
        }

        let result = self
            .with_retries("void_entry", || self.try_void_entry(entry_id, reason))
            .await?;

        info!(
            entry_id = %result.original.id,
            entry_number = result.original.entry_number.as_deref().unwrap_or_default(),
            compensating_number = result
                .compensating
                .entry
                .entry_number
                .as_deref()
                .unwrap_or_default(),
            reason = reason.trim(),
            "journal entry voided"
        );
        Ok(result)
    }

    async fn try_void_entry(
        &self,
        entry_id: Uuid,
        reason: &str,
    ) -> Result<VoidResult, LedgerError> {
        let txn = self.db.begin().await.map_err(ledger_error)?;

        let original = lock_entry(&txn, entry_id).await?;
        let original_lines = load_lines(&txn, entry_id).await.map_err(ledger_error)?;
        let target = VoidTarget {
            entry_id,
            entry_number: original.entry_number.clone().unwrap_or_default(),
            status: original.status.into(),
            reverses_entry_id: original.reverses_entry_id,
            reversed_by_entry_id: original.reversed_by_entry_id,
            lines: JournalEntryWithLines {
                entry: original.clone(),
                lines: original_lines,
            }
            .resolved_lines(),
        };
        let compensation = ReversalService::compensate(&target, reason)?;
        let entry_date = Utc::now().date_naive();
        ensure_period_open(&txn, entry_date).await?;

        let locked = BalanceSynchronizer::lock(&txn, &account_ids(&compensation.lines)).await?;
        let totals = LedgerService::check_postable(
            &compensation.lines,
            self.config.balance_tolerance,
            |id| locked.info(id),
        )?;

        let header = DraftHeader {
            source_type: original.source_type.into(),
            source_id: original.source_id,
            entry_date,
            description: compensation.description,
            reverses_entry_id: Some(entry_id),
        };
        let saved = insert_entry(&txn, &header, &compensation.lines, totals)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, "uq_journal_entries_reverses") {
                    LedgerError::ConcurrentModification(e.to_string())
                } else {
                    ledger_error(e)
                }
            })?;
        let compensating = self.post_locked(&txn, saved, totals, &locked).await?;

        let now = Utc::now().into();
        let mut stamp: journal_entries::ActiveModel = original.into();
        stamp.reversed_by_entry_id = Set(Some(compensating.entry.id));
        stamp.void_reason = Set(Some(reason.trim().to_string()));
        stamp.voided_at = Set(Some(now));
        stamp.updated_at = Set(now);
        let original = stamp.update(&txn).await.map_err(ledger_error)?;

        txn.commit().await.map_err(ledger_error)?;
        Ok(VoidResult {
            original,
            compensating,
        })
    }

    /// Finds an entry with its lines.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if the entry does not exist.
    pub async fn find_entry(
        &self,
        entry_id: Uuid,
    ) -> Result<JournalEntryWithLines, LedgerError> {
        let entry = journal_entries::Entity::find_by_id(entry_id)
            .one(&self.db)
            .await
            .map_err(ledger_error)?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        let lines = load_lines(&self.db, entry_id).await.map_err(ledger_error)?;
        Ok(JournalEntryWithLines { entry, lines })
    }

    /// Finds a posted entry by its number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_number(
        &self,
        entry_number: &str,
    ) -> Result<Option<JournalEntryWithLines>, LedgerError> {
        let Some(entry) = journal_entries::Entity::find()
            .filter(journal_entries::Column::EntryNumber.eq(entry_number))
            .one(&self.db)
            .await
            .map_err(ledger_error)?
        else {
            return Ok(None);
        };
        let lines = load_lines(&self.db, entry.id).await.map_err(ledger_error)?;
        Ok(Some(JournalEntryWithLines { entry, lines }))
    }

    /// The live (draft or posted, non-compensating) entry of a source.
    ///
    /// Voiding leaves the original POSTED with `reversed_by_entry_id` set,
    /// so a voided original is still the live entry and is returned here.
    /// A source whose entry was voided cannot be posted again.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_live_by_source(
        &self,
        source_type: SourceType,
        source_id: i64,
    ) -> Result<Option<JournalEntryWithLines>, LedgerError> {
        let Some(entry) = journal_entries::Entity::find()
            .filter(journal_entries::Column::SourceType.eq(DbSourceType::from(source_type)))
            .filter(journal_entries::Column::SourceId.eq(source_id))
            .filter(journal_entries::Column::Status.ne(EntryStatus::Void))
            .filter(journal_entries::Column::ReversesEntryId.is_null())
            .one(&self.db)
            .await
            .map_err(ledger_error)?
        else {
            return Ok(None);
        };
        let lines = load_lines(&self.db, entry.id).await.map_err(ledger_error)?;
        Ok(Some(JournalEntryWithLines { entry, lines }))
    }

    /// Every entry of a source, oldest first, compensating entries included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_by_source(
        &self,
        source_type: SourceType,
        source_id: i64,
    ) -> Result<Vec<journal_entries::Model>, LedgerError> {
        journal_entries::Entity::find()
            .filter(journal_entries::Column::SourceType.eq(DbSourceType::from(source_type)))
            .filter(journal_entries::Column::SourceId.eq(source_id))
            .order_by_asc(journal_entries::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(ledger_error)
    }

    /// Numbers, flips to POSTED and synchronizes balances.
    ///
    /// `locked` must cover every account of `draft`.
    async fn post_locked<C: ConnectionTrait>(
        &self,
        conn: &C,
        draft: JournalEntryWithLines,
        totals: EntryTotals,
        locked: &LockedAccounts,
    ) -> Result<JournalEntryWithLines, LedgerError> {
        let number = next_entry_number(
            conn,
            &self.config.entry_number_prefix,
            draft.entry.entry_date.year(),
        )
        .await
        .map_err(ledger_error)?;

        let now = Utc::now().into();
        let mut active: journal_entries::ActiveModel = draft.entry.into();
        active.entry_number = Set(Some(number.to_string()));
        active.status = Set(EntryStatus::Posted);
        active.total_debit = Set(totals.total_debit);
        active.total_credit = Set(totals.total_credit);
        active.posted_at = Set(Some(now));
        active.updated_at = Set(now);
        let entry = active.update(conn).await.map_err(ledger_error)?;

        BalanceSynchronizer::synchronize(conn, locked).await?;

        Ok(JournalEntryWithLines {
            entry,
            lines: draft.lines,
        })
    }

    /// Checks that a sourced posting may go through: the source record
    /// exists and its latest approval request is APPROVED.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` for a missing source, `NotApproved`
    /// otherwise.
    pub(crate) async fn authorize_source<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: SourceKey,
    ) -> Result<(), LedgerError> {
        let exists = self
            .registry
            .exists(key.source_type, key.source_id)
            .await
            .map_err(ledger_error)?;
        if !exists {
            error!(source = %key, "posting references a missing source record");
            return Err(LedgerError::DanglingReference {
                kind: ReferenceKind::Source(key.source_type),
                reference: key.source_id.to_string(),
            });
        }

        let latest = latest_status(conn, key.source_type, key.source_id)
            .await
            .map_err(ledger_error)?;
        PostingRules::ensure_approved(key, latest)
    }

    /// Turns the live entry of a source into a posting outcome.
    ///
    /// A posted entry is returned as is. A draft is posted; if another
    /// caller posts it first, the posted entry is returned.
    pub(crate) async fn settle_existing(
        &self,
        existing: JournalEntryWithLines,
    ) -> Result<PostingOutcome, LedgerError> {
        if existing.entry.status != EntryStatus::Draft {
            return Ok(PostingOutcome::Existing(existing));
        }

        info!(entry_id = %existing.entry.id, "posting the live draft of the source");
        match self.post_draft(existing.entry.id).await {
            Ok(posted) => Ok(PostingOutcome::Created(posted)),
            Err(LedgerError::InvalidStatusTransition { .. }) => {
                let current = self.find_entry(existing.entry.id).await?;
                if current.entry.status == EntryStatus::Posted {
                    Ok(PostingOutcome::Existing(current))
                } else {
                    Err(LedgerError::ConcurrentModification(format!(
                        "draft {} was discarded while posting",
                        current.entry.id
                    )))
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn existing_for(
        &self,
        draft: &JournalDraft,
    ) -> Result<Option<JournalEntryWithLines>, LedgerError> {
        let Some(source_id) = draft
            .source_id
            .filter(|_| draft.source_type.requires_source_id())
        else {
            return Ok(None);
        };

        let existing = self.find_live_by_source(draft.source_type, source_id).await?;
        if let Some(entry) = &existing {
            warn!(
                source_type = %draft.source_type,
                source_id,
                entry_id = %entry.entry.id,
                "source already has a journal entry, returning it"
            );
        }
        Ok(existing)
    }

    /// Resolves a lost race on the source index to the winner's entry.
    async fn existing_after_conflict(
        &self,
        draft: &JournalDraft,
        err: DbErr,
    ) -> Result<PostingOutcome, LedgerError> {
        match self.existing_for(draft).await? {
            Some(existing) => Ok(PostingOutcome::Existing(existing)),
            None => Err(LedgerError::ConcurrentModification(err.to_string())),
        }
    }

    /// Runs `op`, retrying serialization failures and deadlocks with linear
    /// backoff.
    async fn with_retries<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.config.max_posting_retries => {
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        error = %e,
                        "retrying after concurrent modification"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * u64::from(attempt),
                    ))
                    .await;
                }
                result => return result,
            }
        }
    }
}

/// Entry header fields for an insert.
struct DraftHeader {
    source_type: SourceType,
    source_id: Option<i64>,
    entry_date: NaiveDate,
    description: String,
    reverses_entry_id: Option<Uuid>,
}

impl From<&JournalDraft> for DraftHeader {
    fn from(draft: &JournalDraft) -> Self {
        Self {
            source_type: draft.source_type,
            source_id: draft.source_id,
            entry_date: draft.entry_date,
            description: draft.description.clone(),
            reverses_entry_id: None,
        }
    }
}

/// The source an originating entry must be authorized against.
///
/// Manual and compensating entries need no authorization.
fn originating_source(
    source_type: SourceType,
    source_id: Option<i64>,
    reverses_entry_id: Option<Uuid>,
) -> Option<SourceKey> {
    if !source_type.requires_source_id() || reverses_entry_id.is_some() {
        return None;
    }
    source_id.map(|source_id| SourceKey {
        source_type,
        source_id,
    })
}

fn account_ids(lines: &[ResolvedLine]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = lines.iter().map(|l| l.account_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Inserts a DRAFT entry and its lines.
async fn insert_entry<C: ConnectionTrait>(
    conn: &C,
    header: &DraftHeader,
    lines: &[ResolvedLine],
    totals: EntryTotals,
) -> Result<JournalEntryWithLines, DbErr> {
    let now = Utc::now().into();

    let entry = journal_entries::ActiveModel {
        id: Set(JournalEntryId::new().into_inner()),
        entry_number: Set(None),
        source_type: Set(header.source_type.into()),
        source_id: Set(header.source_id),
        entry_date: Set(header.entry_date),
        description: Set(header.description.clone()),
        status: Set(EntryStatus::Draft),
        total_debit: Set(totals.total_debit),
        total_credit: Set(totals.total_credit),
        reverses_entry_id: Set(header.reverses_entry_id),
        reversed_by_entry_id: Set(None),
        void_reason: Set(None),
        voided_at: Set(None),
        posted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    let rows = lines.iter().map(|line| journal_lines::ActiveModel {
        id: Set(JournalLineId::new().into_inner()),
        entry_id: Set(entry.id),
        account_id: Set(line.account_id),
        line_number: Set(line.line_number),
        debit: Set(line.debit),
        credit: Set(line.credit),
        description: Set(line.description.clone()),
        created_at: Set(now),
    });
    journal_lines::Entity::insert_many(rows).exec(conn).await?;

    let lines = load_lines(conn, entry.id).await?;
    Ok(JournalEntryWithLines { entry, lines })
}

async fn lock_entry<C: ConnectionTrait>(
    conn: &C,
    entry_id: Uuid,
) -> Result<journal_entries::Model, LedgerError> {
    journal_entries::Entity::find_by_id(entry_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ledger_error)?
        .ok_or(LedgerError::EntryNotFound(entry_id))
}

pub(crate) async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    entry_id: Uuid,
) -> Result<Vec<journal_lines::Model>, DbErr> {
    journal_lines::Entity::find()
        .filter(journal_lines::Column::EntryId.eq(entry_id))
        .order_by_asc(journal_lines::Column::LineNumber)
        .all(conn)
        .await
}

/// Advances the `(prefix, year)` counter and formats the next number.
///
/// The counter row stays locked until the posting transaction ends, so a
/// rolled-back posting does not consume a number.
async fn next_entry_number<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    year: i32,
) -> Result<EntryNumber, DbErr> {
    let row = conn
        .query_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            NEXT_NUMBER_SQL,
            [prefix.into(), year.into()],
        ))
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("journal_entry_counters".to_string()))?;
    let sequence: i64 = row.try_get("", "last_value")?;
    Ok(EntryNumber::new(prefix, year, sequence))
}
