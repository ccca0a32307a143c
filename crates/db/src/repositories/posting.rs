//! Posting gateway.
//!
//! The path by which source modules turn a business event into a posted
//! journal entry. A request is accepted only when the source record
//! exists, its approval request is APPROVED and every account code
//! resolves; repeated requests for the same source return the entry
//! already posted. The journal repository enforces the same source and
//! approval checks on its own posting paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{error, warn};
use uuid::Uuid;

use tally_core::approval::ApprovalSignal;
use tally_core::ledger::{LedgerError, LineInput};
use tally_core::posting::{LineTemplate, PostingRequest, PostingRules};
use tally_shared::config::LedgerConfig;

use super::journal::{JournalRepository, PostingOutcome};
use super::source::SourceRegistry;
use crate::entities::accounts;
use crate::error::ledger_error;

const CODE_CACHE_CAPACITY: u64 = 10_000;
const CODE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Idempotent entry point for automated postings.
#[derive(Clone)]
pub struct PostingGateway {
    db: DatabaseConnection,
    journal: JournalRepository,
    codes: Cache<String, Uuid>,
}

impl std::fmt::Debug for PostingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostingGateway")
            .field("journal", &self.journal)
            .field("cached_codes", &self.codes.entry_count())
            .finish_non_exhaustive()
    }
}

impl PostingGateway {
    /// Creates a gateway checking sources against the source tables.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: LedgerConfig) -> Self {
        Self {
            journal: JournalRepository::new(db.clone(), config),
            db,
            codes: Cache::builder()
                .max_capacity(CODE_CACHE_CAPACITY)
                .time_to_live(CODE_CACHE_TTL)
                .build(),
        }
    }

    /// Replaces the source registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn SourceRegistry>) -> Self {
        self.journal = self.journal.with_registry(registry);
        self
    }

    /// The journal repository postings go through.
    #[must_use]
    pub const fn journal(&self) -> &JournalRepository {
        &self.journal
    }

    /// Posts the entry for a source transaction.
    ///
    /// Steps, in order:
    /// 1. Shape checks (source pairing, lines, amounts, balance)
    /// 2. An existing posted entry for the source is returned as is; a
    ///    live draft is posted with its stored lines
    /// 3. The source record must exist
    /// 4. The latest approval request must be APPROVED
    /// 5. Account codes are resolved
    /// 6. The entry is created and posted with its balances synchronized
    ///
    /// Manual requests skip steps 2 to 4. Steps 3 and 4 run again inside
    /// the posting transaction.
    ///
    /// # Errors
    ///
    /// Returns the first rule violated; nothing is persisted.
    pub async fn request_posting(
        &self,
        request: &PostingRequest,
    ) -> Result<PostingOutcome, LedgerError> {
        let tolerance = self.journal.config().balance_tolerance;

        if let Some(key) = PostingRules::validate_request(request, tolerance)? {
            if let Some(existing) = self
                .journal
                .find_live_by_source(key.source_type, key.source_id)
                .await?
            {
                warn!(
                    source = %key,
                    entry_id = %existing.entry.id,
                    status = ?existing.entry.status,
                    "duplicate posting request, settling existing entry"
                );
                return self.journal.settle_existing(existing).await;
            }

            self.journal.authorize_source(&self.db, key).await?;
        }

        let lines = self.resolve_lines(&request.lines).await?;
        let draft = PostingRules::to_draft(request, lines);
        self.journal.create_and_post(&draft).await
    }

    /// Posts in response to an approval signal.
    ///
    /// # Errors
    ///
    /// Returns `NotApproved` for a rejection or a signal about another
    /// source, otherwise the `request_posting` errors.
    pub async fn post_on_approval(
        &self,
        signal: &ApprovalSignal,
        request: &PostingRequest,
    ) -> Result<PostingOutcome, LedgerError> {
        PostingRules::check_signal(signal, request)?;
        self.request_posting(request).await
    }

    async fn resolve_lines(
        &self,
        templates: &[LineTemplate],
    ) -> Result<Vec<LineInput>, LedgerError> {
        let mut ids: HashMap<&str, Uuid> = HashMap::with_capacity(templates.len());
        for template in templates {
            let code = template.account_code.as_str();
            if ids.contains_key(code) {
                continue;
            }
            if let Some(id) = self.account_id_for(code).await? {
                ids.insert(code, id);
            }
        }

        PostingRules::resolve_templates(templates, |code| ids.get(code).copied()).inspect_err(
            |e| error!(error = %e, "posting request references an unknown account code"),
        )
    }

    async fn account_id_for(&self, code: &str) -> Result<Option<Uuid>, LedgerError> {
        if let Some(id) = self.codes.get(code).await {
            return Ok(Some(id));
        }

        let found = accounts::Entity::find()
            .filter(accounts::Column::Code.eq(code))
            .one(&self.db)
            .await
            .map_err(ledger_error)?;

        if let Some(account) = &found {
            self.codes.insert(code.to_string(), account.id).await;
        }
        Ok(found.map(|a| a.id))
    }
}
