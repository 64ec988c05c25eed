//! Journal entries and lines
//!
//! A journal entry groups balanced debit and credit lines produced from one
//! source document. Entries are written as `Draft`, receive their lines, and
//! are then flipped to `Posted`. Only posted entries count toward ledger
//! balances.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    AccountId, CoreError, Currency, JournalEntryId, JournalLineId, Money, MoneyError, SourceId,
};

/// Kind of business document a journal entry originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Sale,
    Purchase,
    Cogs,
    SalesPayment,
    PurchasePayment,
    Depreciation,
}

impl SourceType {
    /// All source types
    pub const ALL: [SourceType; 6] = [
        SourceType::Sale,
        SourceType::Purchase,
        SourceType::Cogs,
        SourceType::SalesPayment,
        SourceType::PurchasePayment,
        SourceType::Depreciation,
    ];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Sale => "SALE",
            SourceType::Purchase => "PURCHASE",
            SourceType::Cogs => "COGS",
            SourceType::SalesPayment => "SALES_PAYMENT",
            SourceType::PurchasePayment => "PURCHASE_PAYMENT",
            SourceType::Depreciation => "DEPRECIATION",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| CoreError::unknown_code("source type", s))
    }
}

/// Journal entry lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalStatus {
    Draft,
    Posted,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Draft => "DRAFT",
            JournalStatus::Posted => "POSTED",
        }
    }
}

impl FromStr for JournalStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(JournalStatus::Draft),
            "POSTED" => Ok(JournalStatus::Posted),
            other => Err(CoreError::unknown_code("journal status", other)),
        }
    }
}

/// A journal entry header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    /// Human-facing unique number, e.g. `SALE-1A2B3C4D-1735689600`
    pub entry_number: String,
    pub source_type: SourceType,
    pub source_id: SourceId,
    pub entry_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub status: JournalStatus,
    pub total_debit: Money,
    pub total_credit: Money,
    pub is_balanced: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Creates a draft entry from a balanced draft
    pub fn draft(draft: &JournalDraft, entry_number: impl Into<String>) -> Result<Self, MoneyError> {
        let total_debit = draft.total_debit()?;
        let total_credit = draft.total_credit()?;
        Ok(Self {
            id: JournalEntryId::new_v7(),
            entry_number: entry_number.into(),
            source_type: draft.source_type,
            source_id: draft.source_id,
            entry_date: draft.entry_date,
            description: draft.description.clone(),
            reference: draft.reference.clone(),
            status: JournalStatus::Draft,
            is_balanced: total_debit == total_credit,
            total_debit,
            total_credit,
            posted_at: None,
            posted_by: None,
            created_at: Utc::now(),
        })
    }

    /// Flips a draft entry to posted
    ///
    /// # Errors
    ///
    /// Returns `CoreError::IllegalStatusChange` if the entry is already
    /// posted or its totals differ
    pub fn mark_posted(&mut self, posted_at: DateTime<Utc>, posted_by: impl Into<String>) -> Result<(), CoreError> {
        if self.status != JournalStatus::Draft {
            return Err(CoreError::illegal_status_change(format!(
                "entry {} is already {}",
                self.entry_number,
                self.status.as_str()
            )));
        }
        if !self.is_balanced || self.total_debit != self.total_credit {
            return Err(CoreError::illegal_status_change(format!(
                "entry {} is not balanced: {} vs {}",
                self.entry_number, self.total_debit, self.total_credit
            )));
        }
        self.status = JournalStatus::Posted;
        self.posted_at = Some(posted_at);
        self.posted_by = Some(posted_by.into());
        Ok(())
    }

    pub fn is_posted(&self) -> bool {
        self.status == JournalStatus::Posted
    }
}

/// A persisted journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: JournalLineId,
    pub entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub account_code: String,
    pub description: String,
    pub debit: Money,
    pub credit: Money,
    pub line_number: i32,
}

impl JournalLine {
    /// Materializes a draft line for `entry_id`
    pub fn from_draft(entry_id: JournalEntryId, line_number: i32, line: &DraftLine) -> Self {
        Self {
            id: JournalLineId::new_v7(),
            entry_id,
            account_id: line.account_id,
            account_code: line.account_code.clone(),
            description: line.description.clone(),
            debit: line.debit,
            credit: line.credit,
            line_number,
        }
    }

    /// Debit minus credit
    pub fn net(&self) -> Result<Money, MoneyError> {
        self.debit.checked_sub(&self.credit)
    }
}

/// A candidate line produced by the builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub account_id: AccountId,
    pub account_code: String,
    pub description: String,
    pub debit: Money,
    pub credit: Money,
}

impl DraftLine {
    pub fn debit(account_id: AccountId, account_code: impl Into<String>, description: impl Into<String>, amount: Money) -> Self {
        Self {
            account_id,
            account_code: account_code.into(),
            description: description.into(),
            credit: Money::zero(amount.currency()),
            debit: amount,
        }
    }

    pub fn credit(account_id: AccountId, account_code: impl Into<String>, description: impl Into<String>, amount: Money) -> Self {
        Self {
            account_id,
            account_code: account_code.into(),
            description: description.into(),
            debit: Money::zero(amount.currency()),
            credit: amount,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.debit.is_positive()
    }

    /// Exactly one side carries a positive amount
    pub fn is_one_sided(&self) -> bool {
        self.debit.is_positive() ^ self.credit.is_positive()
            && !self.debit.is_negative()
            && !self.credit.is_negative()
    }
}

/// An ordered, not yet persisted set of lines for one source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub source_type: SourceType,
    pub source_id: SourceId,
    pub entry_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub currency: Currency,
    pub lines: Vec<DraftLine>,
}

impl JournalDraft {
    pub fn new(source_type: SourceType, source_id: SourceId, entry_date: NaiveDate, currency: Currency) -> Self {
        Self {
            source_type,
            source_id,
            entry_date,
            description: String::new(),
            reference: None,
            currency,
            lines: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    /// Adds a line; zero-amount lines are dropped
    pub fn push(&mut self, line: DraftLine) {
        if line.debit.is_zero() && line.credit.is_zero() {
            return;
        }
        self.lines.push(line);
    }

    pub fn total_debit(&self) -> Result<Money, MoneyError> {
        Money::sum(self.lines.iter().map(|l| &l.debit), self.currency)
    }

    pub fn total_credit(&self) -> Result<Money, MoneyError> {
        Money::sum(self.lines.iter().map(|l| &l.credit), self.currency)
    }

    /// Absolute difference between the debit and credit sides
    pub fn imbalance(&self) -> Result<Decimal, MoneyError> {
        Ok(self.total_debit()?.checked_sub(&self.total_credit()?)?.amount().abs())
    }

    pub fn is_balanced(&self) -> Result<bool, MoneyError> {
        Ok(self.imbalance()?.is_zero())
    }
}

/// Human-facing entry number for an attempt
///
/// The first attempt has no suffix; retries append `-<attempt>`.
pub fn entry_number(source_type: SourceType, source_id: &SourceId, at: DateTime<Utc>, attempt: u32) -> String {
    let base = format!("{}-{}-{}", source_type.as_str(), source_id.short(), at.timestamp());
    if attempt == 0 {
        base
    } else {
        format!("{}-{}", base, attempt)
    }
}
