//! Journal service
//!
//! Entry point for posting, re-posting and removing the journal of a source
//! document. Each call runs in one unit of work: build, post, propagate, then
//! commit, or roll back on the first hard error.
//!
//! # Example
//!
//! ```rust,ignore
//! let service = JournalService::new(store, costs, LedgerSettings::default());
//! let meta = OperationMetadata::initiated_by("sales-module");
//!
//! // Invoice issued
//! service.create_journal(&SourceDocument::Sale(sale.clone()), &meta).await?;
//!
//! // Invoice cancelled
//! sale.status = DocumentStatus::Cancelled;
//! service.update_journal(&SourceDocument::Sale(sale), &DocumentStatus::Invoiced, &meta).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use core_kernel::{JournalEntryId, OperationMetadata, SourceId};

use crate::builder::JournalBuilder;
use crate::document::{DocumentStatus, SourceDocument};
use crate::error::LedgerError;
use crate::events::{EventLog, LedgerEvent};
use crate::journal::{JournalEntry, JournalLine, SourceType};
use crate::poster::{LedgerPoster, PostMode, PostResult};
use crate::ports::{LedgerStore, LedgerUnitOfWork, ProductCostLookup};
use crate::propagator::{BalanceChange, BalancePropagator};
use crate::settings::LedgerSettings;
use crate::transition::{TransitionAction, TransitionController};

/// A successfully posted entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingReceipt {
    pub entry: JournalEntry,
    pub lines: Vec<JournalLine>,
    pub balances: Vec<BalanceChange>,
    pub events: Vec<LedgerEvent>,
}

/// Result of a create request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostOutcome {
    Posted(PostingReceipt),
    /// A posted entry already existed; nothing was written
    AlreadyPosted { entry_id: JournalEntryId },
    /// The document's status does not call for a journal
    NotRequired { status: DocumentStatus },
}

impl PostOutcome {
    pub fn receipt(&self) -> Option<&PostingReceipt> {
        match self {
            PostOutcome::Posted(receipt) => Some(receipt),
            _ => None,
        }
    }

    pub fn entry_id(&self) -> Option<JournalEntryId> {
        match self {
            PostOutcome::Posted(receipt) => Some(receipt.entry.id),
            PostOutcome::AlreadyPosted { entry_id } => Some(*entry_id),
            PostOutcome::NotRequired { .. } => None,
        }
    }
}

/// A removed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedEntry {
    pub entry_id: JournalEntryId,
    pub entry_number: String,
    pub line_count: usize,
    pub balances: Vec<BalanceChange>,
    pub events: Vec<LedgerEvent>,
}

/// Result of a status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub action: TransitionAction,
    pub removed: Option<RemovedEntry>,
    pub posted: Option<PostOutcome>,
}

/// Posts and removes document journals
pub struct JournalService {
    store: Arc<dyn LedgerStore>,
    costs: Arc<dyn ProductCostLookup>,
    builder: JournalBuilder,
    poster: LedgerPoster,
    propagator: BalancePropagator,
    controller: TransitionController,
}

impl JournalService {
    /// Creates a service
    ///
    /// # Arguments
    ///
    /// * `store` - Ledger storage
    /// * `costs` - Product cost source for COGS lines
    /// * `settings` - Posting behaviour and account mapping
    pub fn new(store: Arc<dyn LedgerStore>, costs: Arc<dyn ProductCostLookup>, settings: LedgerSettings) -> Self {
        Self {
            store,
            costs,
            propagator: BalancePropagator::new(settings.currency, settings.max_hierarchy_depth),
            builder: JournalBuilder::new(settings),
            poster: LedgerPoster::new(),
            controller: TransitionController::default(),
        }
    }

    /// Replaces the status whitelist
    pub fn with_controller(mut self, controller: TransitionController) -> Self {
        self.controller = controller;
        self
    }

    pub fn controller(&self) -> &TransitionController {
        &self.controller
    }

    /// Posts the journal for a document whose status requires one
    ///
    /// An existing posted entry is success with no side effect.
    ///
    /// # Errors
    ///
    /// * `LedgerError::Validation` / `LedgerError::Unbalanced` if the entry cannot be built
    /// * `LedgerError::NotFound` for a missing mandatory account
    /// * `LedgerError::Port` for storage failures
    #[instrument(skip(self, document, meta), fields(
        source_type = %document.source_type(),
        source_id = %document.source_id(),
        actor = meta.actor(),
        correlation_id = meta.correlation_id.as_deref(),
    ))]
    pub async fn create_journal(&self, document: &SourceDocument, meta: &OperationMetadata) -> Result<PostOutcome, LedgerError> {
        self.create(document, PostMode::Idempotent, meta).await
    }

    /// Posts the journal, failing if a posted entry already exists
    ///
    /// # Errors
    ///
    /// `LedgerError::Conflict` when the document already has a posted entry,
    /// plus everything [`JournalService::create_journal`] returns
    #[instrument(skip(self, document, meta), fields(
        source_type = %document.source_type(),
        source_id = %document.source_id(),
        actor = meta.actor(),
        correlation_id = meta.correlation_id.as_deref(),
    ))]
    pub async fn create_journal_strict(&self, document: &SourceDocument, meta: &OperationMetadata) -> Result<PostOutcome, LedgerError> {
        self.create(document, PostMode::Strict, meta).await
    }

    /// Reacts to a document status change
    ///
    /// Creates, deletes or replaces the journal so that exactly one posted
    /// entry exists while the document's status requires it.
    #[instrument(skip(self, document, meta), fields(
        source_type = %document.source_type(),
        source_id = %document.source_id(),
        previous = %previous,
        current = %document.status(),
    ))]
    pub async fn update_journal(
        &self,
        document: &SourceDocument,
        previous: &DocumentStatus,
        meta: &OperationMetadata,
    ) -> Result<TransitionOutcome, LedgerError> {
        let action = self.controller.plan(document.source_type(), previous, document.status());
        debug!(?action, "status transition planned");
        if action == TransitionAction::None {
            return Ok(TransitionOutcome {
                action,
                removed: None,
                posted: None,
            });
        }

        let mut uow = self.store.begin().await?;
        let result = self.transition_in(uow.as_mut(), document, action, meta).await;
        let outcome = finish(uow, result).await?;
        info!(?action, "journal transition applied");
        Ok(outcome)
    }

    /// Removes the journal of a source document and reverses its balances
    ///
    /// Returns `None` when the document has no entry.
    #[instrument(skip(self, meta), fields(actor = meta.actor()))]
    pub async fn delete_journal(
        &self,
        source_type: SourceType,
        source_id: SourceId,
        meta: &OperationMetadata,
    ) -> Result<Option<RemovedEntry>, LedgerError> {
        let mut uow = self.store.begin().await?;
        let result = self.delete_in(uow.as_mut(), source_type, source_id).await;
        finish(uow, result).await
    }

    async fn create(&self, document: &SourceDocument, mode: PostMode, meta: &OperationMetadata) -> Result<PostOutcome, LedgerError> {
        let status = document.status();
        if !self.controller.requires_journal(document.source_type(), status) {
            debug!(%status, "status does not require a journal");
            return Ok(PostOutcome::NotRequired { status: status.clone() });
        }

        let mut uow = self.store.begin().await?;
        let result = self.post_in(uow.as_mut(), document, mode, meta).await;
        finish(uow, result).await
    }

    async fn transition_in(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        document: &SourceDocument,
        action: TransitionAction,
        meta: &OperationMetadata,
    ) -> Result<TransitionOutcome, LedgerError> {
        let source_type = document.source_type();
        let source_id = document.source_id();
        let (removed, posted) = match action {
            TransitionAction::Create => (None, Some(self.post_in(uow, document, PostMode::Idempotent, meta).await?)),
            TransitionAction::Delete => (self.delete_in(uow, source_type, source_id).await?, None),
            TransitionAction::Replace => {
                let removed = self.delete_in(uow, source_type, source_id).await?;
                let posted = self.post_in(uow, document, PostMode::Strict, meta).await?;
                (removed, Some(posted))
            }
            TransitionAction::None => (None, None),
        };
        Ok(TransitionOutcome { action, removed, posted })
    }

    async fn post_in(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        document: &SourceDocument,
        mode: PostMode,
        meta: &OperationMetadata,
    ) -> Result<PostOutcome, LedgerError> {
        if mode == PostMode::Idempotent {
            if let Some(existing) = uow.find_entry_by_source(document.source_type(), document.source_id()).await? {
                if existing.is_posted() {
                    debug!(entry_id = %existing.id, "journal already posted");
                    return Ok(PostOutcome::AlreadyPosted { entry_id: existing.id });
                }
            }
        }

        let mut events = EventLog::new();
        let draft = self
            .builder
            .build(document, &mut *uow, self.costs.as_ref(), &mut events)
            .await?;

        match self.poster.post(&mut *uow, &draft, mode, meta.actor()).await? {
            PostResult::Posted { entry, lines } => {
                let balances = self.propagator.apply(uow, &lines, &mut events).await?;
                if !events.is_empty() {
                    warn!(entry_id = %entry.id, events = events.len(), "journal posted with warnings");
                }
                Ok(PostOutcome::Posted(PostingReceipt {
                    entry,
                    lines,
                    balances,
                    events: events.into_events(),
                }))
            }
            PostResult::AlreadyPosted { entry_id } => Ok(PostOutcome::AlreadyPosted { entry_id }),
        }
    }

    async fn delete_in(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        source_type: SourceType,
        source_id: SourceId,
    ) -> Result<Option<RemovedEntry>, LedgerError> {
        let Some(removed) = self.poster.delete(&mut *uow, source_type, source_id).await? else {
            return Ok(None);
        };

        let mut events = EventLog::new();
        let balances = if removed.entry.is_posted() {
            self.propagator.reverse(uow, &removed.lines, &mut events).await?
        } else {
            Vec::new()
        };
        Ok(Some(RemovedEntry {
            entry_id: removed.entry.id,
            entry_number: removed.entry.entry_number,
            line_count: removed.lines.len(),
            balances,
            events: events.into_events(),
        }))
    }
}

/// Commits on success, rolls back on failure
async fn finish<T>(uow: Box<dyn LedgerUnitOfWork>, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = uow.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
