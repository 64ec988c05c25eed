//! Ledger posting
//!
//! Persists a balanced draft as a journal entry in two phases: the header is
//! inserted as `DRAFT`, every line is inserted, and the header is flipped to
//! `POSTED`. A failure between the first insert and the flip removes what was
//! written before the error is returned.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{JournalEntryId, PortError, SourceId};

use crate::error::LedgerError;
use crate::journal::{entry_number, JournalDraft, JournalEntry, JournalLine, SourceType};
use crate::ports::{LedgerUnitOfWork, ENTRY_NUMBER_CONSTRAINT, POSTED_SOURCE_CONSTRAINT};

/// Default cap on entry-number attempts
pub const MAX_ENTRY_NUMBER_ATTEMPTS: u32 = 5;

/// How an existing posted entry is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMode {
    /// An existing posted entry is success with no side effect
    Idempotent,
    /// An existing posted entry is a conflict
    Strict,
}

/// Result of a posting attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PostResult {
    Posted {
        entry: JournalEntry,
        lines: Vec<JournalLine>,
    },
    AlreadyPosted {
        entry_id: JournalEntryId,
    },
}

/// An entry removed together with its lines
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedJournal {
    pub entry: JournalEntry,
    pub lines: Vec<JournalLine>,
}

/// Writes and removes journal entries within a unit of work
#[derive(Debug, Clone)]
pub struct LedgerPoster {
    max_number_attempts: u32,
}

impl Default for LedgerPoster {
    fn default() -> Self {
        Self {
            max_number_attempts: MAX_ENTRY_NUMBER_ATTEMPTS,
        }
    }
}

impl LedgerPoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts `draft`
    ///
    /// # Arguments
    ///
    /// * `uow` - The open unit of work
    /// * `draft` - A balanced draft from the builder
    /// * `mode` - Whether an existing posted entry is success or a conflict
    /// * `posted_by` - Actor recorded on the entry
    ///
    /// # Returns
    ///
    /// The posted entry and lines, or `AlreadyPosted` in idempotent mode
    ///
    /// # Errors
    ///
    /// * `LedgerError::Conflict` in strict mode when a posted entry exists
    /// * `LedgerError::EntryNumberExhausted` when every entry number collided
    /// * `LedgerError::Port` for storage failures
    #[instrument(skip(self, uow, draft), fields(source_type = %draft.source_type, source_id = %draft.source_id))]
    pub async fn post(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        draft: &JournalDraft,
        mode: PostMode,
        posted_by: &str,
    ) -> Result<PostResult, LedgerError> {
        if let Some(existing) = uow.find_entry_by_source(draft.source_type, draft.source_id).await? {
            if existing.is_posted() {
                return self.existing_posted(mode, existing.id, draft.source_type, draft.source_id);
            }
            warn!(entry_id = %existing.id, "removing stale draft entry before posting");
            uow.delete_lines(existing.id).await?;
            uow.delete_entry(existing.id).await?;
        }

        let now = Utc::now();
        let mut entry = self.insert_header(uow, draft, now).await?;

        let mut lines = Vec::with_capacity(draft.lines.len());
        for (index, draft_line) in draft.lines.iter().enumerate() {
            let line = JournalLine::from_draft(entry.id, index as i32 + 1, draft_line);
            if let Err(e) = uow.insert_line(&line).await {
                self.compensate(uow, entry.id).await;
                return Err(e.into());
            }
            lines.push(line);
        }

        if let Err(e) = entry.mark_posted(now, posted_by) {
            self.compensate(uow, entry.id).await;
            return Err(e.into());
        }
        if let Err(e) = uow.mark_posted(entry.id, now, posted_by).await {
            self.compensate(uow, entry.id).await;
            if e.is_conflict_on(POSTED_SOURCE_CONSTRAINT) {
                return self.lost_race(uow, mode, draft).await;
            }
            return Err(e.into());
        }

        info!(
            entry_id = %entry.id,
            entry_number = %entry.entry_number,
            lines = lines.len(),
            total = %entry.total_debit,
            "journal entry posted"
        );
        Ok(PostResult::Posted { entry, lines })
    }

    /// Removes the entry for a source document, lines first
    ///
    /// Returns `None` when no entry exists.
    #[instrument(skip(self, uow))]
    pub async fn delete(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        source_type: SourceType,
        source_id: SourceId,
    ) -> Result<Option<RemovedJournal>, LedgerError> {
        let Some(entry) = uow.find_entry_by_source(source_type, source_id).await? else {
            debug!("no journal entry to delete");
            return Ok(None);
        };
        let lines = uow.lines_for_entry(entry.id).await?;
        let removed = uow.delete_lines(entry.id).await?;
        uow.delete_entry(entry.id).await?;

        info!(entry_id = %entry.id, entry_number = %entry.entry_number, lines = removed, "journal entry deleted");
        Ok(Some(RemovedJournal { entry, lines }))
    }

    async fn insert_header(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        draft: &JournalDraft,
        now: chrono::DateTime<Utc>,
    ) -> Result<JournalEntry, LedgerError> {
        for attempt in 0..self.max_number_attempts {
            let number = entry_number(draft.source_type, &draft.source_id, now, attempt);
            let entry = JournalEntry::draft(draft, number)?;
            match uow.insert_entry(&entry).await {
                Ok(()) => return Ok(entry),
                Err(e) if e.is_conflict_on(ENTRY_NUMBER_CONSTRAINT) => {
                    debug!(entry_number = %entry.entry_number, attempt, "entry number taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::EntryNumberExhausted {
            attempts: self.max_number_attempts,
        })
    }

    fn existing_posted(
        &self,
        mode: PostMode,
        entry_id: JournalEntryId,
        source_type: SourceType,
        source_id: SourceId,
    ) -> Result<PostResult, LedgerError> {
        match mode {
            PostMode::Idempotent => {
                debug!(%entry_id, "journal already posted");
                Ok(PostResult::AlreadyPosted { entry_id })
            }
            PostMode::Strict => Err(LedgerError::conflict(source_type, source_id)),
        }
    }

    /// Another writer posted the same source between our check and our flip
    async fn lost_race(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        mode: PostMode,
        draft: &JournalDraft,
    ) -> Result<PostResult, LedgerError> {
        warn!("concurrent posting detected for the same source");
        match uow.find_entry_by_source(draft.source_type, draft.source_id).await? {
            Some(winner) if winner.is_posted() => {
                self.existing_posted(mode, winner.id, draft.source_type, draft.source_id)
            }
            _ => Err(LedgerError::conflict(draft.source_type, draft.source_id)),
        }
    }

    /// Removes a partially written entry; failures are logged
    async fn compensate(&self, uow: &mut dyn LedgerUnitOfWork, entry_id: JournalEntryId) {
        let lines = uow.delete_lines(entry_id).await;
        let entry = uow.delete_entry(entry_id).await;
        match (lines, entry) {
            (Ok(_), Ok(())) => debug!(%entry_id, "partial journal entry removed"),
            (Err(e), _) | (_, Err(e)) => log_compensation_failure(entry_id, &e),
        }
    }
}

fn log_compensation_failure(entry_id: JournalEntryId, error: &PortError) {
    warn!(%entry_id, error = %error, "failed to remove partial journal entry");
}
