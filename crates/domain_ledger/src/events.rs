//! Ledger events
//!
//! Non-fatal findings raised while building, posting or propagating an entry.
//! Every event is logged when recorded and returned to the caller, so a
//! fallback or skipped line is never silent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use core_kernel::{AccountId, ProductId};

use crate::account::AccountType;
use crate::document::{PaymentMethod, TaxComponent};

/// How serious an event is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Warning,
    Error,
}

/// A non-fatal finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Payment method was empty or unrecognized; settlement fell back
    UnknownPaymentMethod {
        method: String,
        fallback_code: String,
    },
    /// No account is configured for a tax component; the line was not written
    TaxLineSkipped {
        component: TaxComponent,
        amount: Decimal,
        account_code: String,
    },
    /// An item was left out of the COGS total
    CogsItemSkipped {
        product_id: Option<ProductId>,
        reason: String,
    },
    /// The COGS pair was not written
    CogsSkipped {
        reason: String,
    },
    /// The primary debit was adjusted to absorb a small imbalance
    AutoBalanceAdjusted {
        account_code: String,
        difference: Decimal,
    },
    /// The computed settlement differs from the declared document total
    TotalMismatch {
        computed: Decimal,
        declared: Decimal,
    },
    /// Declared account type contradicts the code prefix convention
    AccountTypeMismatch {
        account_id: AccountId,
        account_code: String,
        declared: AccountType,
        expected: AccountType,
    },
    /// Header roll-up did not complete
    RollupFailed {
        account_id: AccountId,
        reason: String,
    },
    /// Cash/bank mirror was not updated
    SubledgerSyncFailed {
        account_id: AccountId,
        reason: String,
    },
}

impl LedgerEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            LedgerEvent::AccountTypeMismatch { .. } => EventSeverity::Error,
            _ => EventSeverity::Warning,
        }
    }
}

/// Accumulates events for one operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<LedgerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs and stores an event
    pub fn record(&mut self, event: LedgerEvent) {
        match event.severity() {
            EventSeverity::Warning => warn!(?event, "ledger warning"),
            EventSeverity::Error => error!(?event, "ledger data integrity violation"),
        }
        self.events.push(event);
    }

    /// Records that a payment method fell back to a counterparty account
    pub fn unknown_method(&mut self, method: &PaymentMethod, fallback_code: &str) {
        self.record(LedgerEvent::UnknownPaymentMethod {
            method: method.to_string(),
            fallback_code: fallback_code.to_string(),
        });
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Appends another log
    pub fn extend(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    pub fn into_events(self) -> Vec<LedgerEvent> {
        self.events
    }

    /// True if any recorded event satisfies `predicate`
    pub fn any(&self, predicate: impl Fn(&LedgerEvent) -> bool) -> bool {
        self.events.iter().any(predicate)
    }
}
