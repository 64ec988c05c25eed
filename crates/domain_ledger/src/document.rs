//! Source documents that produce journal entries
//!
//! These are read-only views of sales, purchases, payments, depreciation runs
//! and COGS backfills. Document amounts are plain decimals in the ledger
//! currency; the builder turns them into `Money` lines.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AccountId, CashBankId, ProductId, SourceId};

use crate::journal::SourceType;

/// Business status of a source document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    Draft,
    Pending,
    Confirmed,
    Approved,
    Invoiced,
    Completed,
    Paid,
    Cancelled,
    /// Any status this crate has no special meaning for
    Other(String),
}

impl DocumentStatus {
    /// Parses a status name, case-insensitively
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "DRAFT" => DocumentStatus::Draft,
            "PENDING" => DocumentStatus::Pending,
            "CONFIRMED" => DocumentStatus::Confirmed,
            "APPROVED" => DocumentStatus::Approved,
            "INVOICED" => DocumentStatus::Invoiced,
            "COMPLETED" => DocumentStatus::Completed,
            "PAID" => DocumentStatus::Paid,
            "CANCELLED" | "CANCELED" => DocumentStatus::Cancelled,
            other => DocumentStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DocumentStatus::Draft => "DRAFT",
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Confirmed => "CONFIRMED",
            DocumentStatus::Approved => "APPROVED",
            DocumentStatus::Invoiced => "INVOICED",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Paid => "PAID",
            DocumentStatus::Cancelled => "CANCELLED",
            DocumentStatus::Other(other) => other.as_str(),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a document is settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Bank,
    /// Settled later through receivables or payables
    Credit,
    /// Empty or unrecognized method, kept verbatim for reporting
    Unknown(String),
}

impl PaymentMethod {
    /// Lenient parse of the method names used by the document modules
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "CASH" | "TUNAI" => PaymentMethod::Cash,
            "BANK" | "BANK_TRANSFER" | "TRANSFER" => PaymentMethod::Bank,
            "CREDIT" | "KREDIT" | "HUTANG" | "PIUTANG" => PaymentMethod::Credit,
            _ => PaymentMethod::Unknown(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => f.write_str("CASH"),
            PaymentMethod::Bank => f.write_str("BANK"),
            PaymentMethod::Credit => f.write_str("CREDIT"),
            PaymentMethod::Unknown(raw) if raw.is_empty() => f.write_str("<empty>"),
            PaymentMethod::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Individual tax component of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxComponent {
    /// Value-added tax on top of the subtotal
    Vat,
    /// Other taxes added to the total
    OtherAddition,
    /// General withholding deducted from the settlement
    Withholding,
    /// Income tax article 21 withholding
    Withholding21,
    /// Income tax article 23 withholding
    Withholding23,
    /// Other deductions from the settlement
    OtherDeduction,
}

impl TaxComponent {
    /// True for components that increase the settlement amount
    pub fn is_addition(&self) -> bool {
        matches!(self, TaxComponent::Vat | TaxComponent::OtherAddition)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaxComponent::Vat => "VAT",
            TaxComponent::OtherAddition => "Other tax",
            TaxComponent::Withholding => "Withholding tax",
            TaxComponent::Withholding21 => "Income tax art. 21",
            TaxComponent::Withholding23 => "Income tax art. 23",
            TaxComponent::OtherDeduction => "Other deduction",
        }
    }
}

/// Tax amounts attached to a sale or purchase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub vat: Decimal,
    pub other_tax_additions: Decimal,
    pub withholding: Decimal,
    pub withholding_21: Decimal,
    pub withholding_23: Decimal,
    pub other_deductions: Decimal,
}

impl TaxBreakdown {
    /// Breakdown with only VAT
    pub fn vat(amount: Decimal) -> Self {
        Self {
            vat: amount,
            ..Default::default()
        }
    }

    /// Components in posting order
    pub fn components(&self) -> Vec<(TaxComponent, Decimal)> {
        vec![
            (TaxComponent::Vat, self.vat),
            (TaxComponent::OtherAddition, self.other_tax_additions),
            (TaxComponent::Withholding, self.withholding),
            (TaxComponent::Withholding21, self.withholding_21),
            (TaxComponent::Withholding23, self.withholding_23),
            (TaxComponent::OtherDeduction, self.other_deductions),
        ]
    }
}

/// A line item on a sale or purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentItem {
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// Purchase items may name their own expense account
    pub expense_account_id: Option<AccountId>,
}

impl DocumentItem {
    /// Creates an item with `line_total = quantity * unit_price`
    pub fn new(product_id: Option<ProductId>, description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            product_id,
            description: description.into(),
            quantity,
            unit_price,
            line_total: quantity * unit_price,
            expense_account_id: None,
        }
    }

    pub fn with_expense_account(mut self, account_id: AccountId) -> Self {
        self.expense_account_id = Some(account_id);
        self
    }
}

/// A sales invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesDocument {
    pub id: SourceId,
    pub number: String,
    pub date: NaiveDate,
    pub status: DocumentStatus,
    pub customer_name: String,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub taxes: TaxBreakdown,
    /// Declared total as stored on the document
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub cash_bank_id: Option<CashBankId>,
    pub items: Vec<DocumentItem>,
}

/// A purchase order or bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseDocument {
    pub id: SourceId,
    pub number: String,
    pub date: NaiveDate,
    pub status: DocumentStatus,
    pub vendor_name: String,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub taxes: TaxBreakdown,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub cash_bank_id: Option<CashBankId>,
    pub items: Vec<DocumentItem>,
}

/// Direction of a payment document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentDirection {
    /// Customer pays a sale
    Received,
    /// We pay a vendor
    Made,
}

/// A receipt or disbursement against a sale or purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDocument {
    pub id: SourceId,
    pub number: String,
    pub date: NaiveDate,
    pub status: DocumentStatus,
    pub direction: PaymentDirection,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub cash_bank_id: Option<CashBankId>,
    /// Number of the invoice or bill being settled
    pub settles: Option<String>,
}

/// One depreciation posting for a fixed asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepreciationRun {
    pub id: SourceId,
    pub asset_name: String,
    pub period: NaiveDate,
    pub status: DocumentStatus,
    pub amount: Decimal,
    pub expense_account_id: Option<AccountId>,
    pub accumulated_account_id: Option<AccountId>,
}

/// Standalone cost-of-goods-sold posting for a sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CogsDocument {
    /// Id of the sale the cost belongs to
    pub id: SourceId,
    pub sale_number: String,
    pub date: NaiveDate,
    pub status: DocumentStatus,
    pub items: Vec<DocumentItem>,
}

/// Any document the journal service accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceDocument {
    Sale(SalesDocument),
    Purchase(PurchaseDocument),
    Payment(PaymentDocument),
    Depreciation(DepreciationRun),
    Cogs(CogsDocument),
}

impl SourceDocument {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceDocument::Sale(_) => SourceType::Sale,
            SourceDocument::Purchase(_) => SourceType::Purchase,
            SourceDocument::Payment(p) => match p.direction {
                PaymentDirection::Received => SourceType::SalesPayment,
                PaymentDirection::Made => SourceType::PurchasePayment,
            },
            SourceDocument::Depreciation(_) => SourceType::Depreciation,
            SourceDocument::Cogs(_) => SourceType::Cogs,
        }
    }

    pub fn source_id(&self) -> SourceId {
        match self {
            SourceDocument::Sale(d) => d.id,
            SourceDocument::Purchase(d) => d.id,
            SourceDocument::Payment(d) => d.id,
            SourceDocument::Depreciation(d) => d.id,
            SourceDocument::Cogs(d) => d.id,
        }
    }

    pub fn status(&self) -> &DocumentStatus {
        match self {
            SourceDocument::Sale(d) => &d.status,
            SourceDocument::Purchase(d) => &d.status,
            SourceDocument::Payment(d) => &d.status,
            SourceDocument::Depreciation(d) => &d.status,
            SourceDocument::Cogs(d) => &d.status,
        }
    }

    pub fn entry_date(&self) -> NaiveDate {
        match self {
            SourceDocument::Sale(d) => d.date,
            SourceDocument::Purchase(d) => d.date,
            SourceDocument::Payment(d) => d.date,
            SourceDocument::Depreciation(d) => d.period,
            SourceDocument::Cogs(d) => d.date,
        }
    }

    /// Document number used as the journal reference
    pub fn reference(&self) -> Option<String> {
        match self {
            SourceDocument::Sale(d) => Some(d.number.clone()),
            SourceDocument::Purchase(d) => Some(d.number.clone()),
            SourceDocument::Payment(d) => Some(d.number.clone()),
            SourceDocument::Depreciation(_) => None,
            SourceDocument::Cogs(d) => Some(d.sale_number.clone()),
        }
    }
}

impl From<SalesDocument> for SourceDocument {
    fn from(doc: SalesDocument) -> Self {
        SourceDocument::Sale(doc)
    }
}

impl From<PurchaseDocument> for SourceDocument {
    fn from(doc: PurchaseDocument) -> Self {
        SourceDocument::Purchase(doc)
    }
}

impl From<PaymentDocument> for SourceDocument {
    fn from(doc: PaymentDocument) -> Self {
        SourceDocument::Payment(doc)
    }
}

impl From<DepreciationRun> for SourceDocument {
    fn from(doc: DepreciationRun) -> Self {
        SourceDocument::Depreciation(doc)
    }
}

impl From<CogsDocument> for SourceDocument {
    fn from(doc: CogsDocument) -> Self {
        SourceDocument::Cogs(doc)
    }
}
