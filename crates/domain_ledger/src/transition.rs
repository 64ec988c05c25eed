//! Document status transitions
//!
//! Decides, from a document's previous and new status, whether its journal
//! entry must be created, deleted, replaced or left alone. Each source type
//! has a whitelist of statuses that require a posted journal.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::DocumentStatus;
use crate::journal::SourceType;

/// What to do with a document's journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionAction {
    Create,
    Delete,
    /// Delete, then create from the current document
    Replace,
    None,
}

/// Maps status changes to journal actions
#[derive(Debug, Clone)]
pub struct TransitionController {
    rules: HashMap<SourceType, HashSet<DocumentStatus>>,
}

impl Default for TransitionController {
    fn default() -> Self {
        use DocumentStatus::*;

        let mut controller = Self { rules: HashMap::new() };
        controller.set(SourceType::Sale, [Invoiced, Paid]);
        controller.set(SourceType::Purchase, [Approved, Completed, Paid]);
        controller.set(SourceType::SalesPayment, [Completed]);
        controller.set(SourceType::PurchasePayment, [Completed]);
        controller.set(SourceType::Depreciation, [Completed]);
        controller.set(SourceType::Cogs, [Invoiced, Paid]);
        controller
    }
}

impl TransitionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whitelist for a source type
    pub fn with_rule(mut self, source_type: SourceType, statuses: impl IntoIterator<Item = DocumentStatus>) -> Self {
        self.set(source_type, statuses);
        self
    }

    fn set(&mut self, source_type: SourceType, statuses: impl IntoIterator<Item = DocumentStatus>) {
        self.rules.insert(source_type, statuses.into_iter().collect());
    }

    /// True if a document of `source_type` in `status` must have a posted journal
    pub fn requires_journal(&self, source_type: SourceType, status: &DocumentStatus) -> bool {
        self.rules
            .get(&source_type)
            .is_some_and(|statuses| statuses.contains(status))
    }

    /// Decides the action for a status change
    pub fn plan(&self, source_type: SourceType, previous: &DocumentStatus, current: &DocumentStatus) -> TransitionAction {
        match (
            self.requires_journal(source_type, previous),
            self.requires_journal(source_type, current),
        ) {
            (false, true) => TransitionAction::Create,
            (true, false) => TransitionAction::Delete,
            (true, true) => TransitionAction::Replace,
            (false, false) => TransitionAction::None,
        }
    }
}
