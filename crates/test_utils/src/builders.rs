//! Test Data Builders
//!
//! Builders for source documents with sensible defaults. Tests set only the
//! fields they care about.

use chrono::NaiveDate;
use core_kernel::{AccountId, CashBankId, ProductId, SourceId};
use domain_ledger::{
    CogsDocument, DepreciationRun, DocumentItem, DocumentStatus, PaymentDirection, PaymentDocument,
    PaymentMethod, PurchaseDocument, SalesDocument, SourceDocument, TaxBreakdown,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{DateFixtures, MoneyFixtures, StringFixtures};

/// Builder for sales invoices
pub struct SalesDocumentBuilder {
    id: SourceId,
    number: String,
    date: NaiveDate,
    status: DocumentStatus,
    customer_name: String,
    subtotal: Decimal,
    shipping: Decimal,
    taxes: TaxBreakdown,
    payment_method: PaymentMethod,
    cash_bank_id: Option<CashBankId>,
    items: Option<Vec<DocumentItem>>,
}

impl Default for SalesDocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SalesDocumentBuilder {
    /// Invoiced cash sale of 1,000,000 plus 110,000 VAT
    pub fn new() -> Self {
        Self {
            id: SourceId::new(),
            number: StringFixtures::invoice_number().to_string(),
            date: DateFixtures::posting_date(),
            status: DocumentStatus::Invoiced,
            customer_name: StringFixtures::company_name(),
            subtotal: MoneyFixtures::idr_subtotal().amount(),
            shipping: Decimal::ZERO,
            taxes: TaxBreakdown::vat(MoneyFixtures::idr_vat().amount()),
            payment_method: PaymentMethod::Cash,
            cash_bank_id: None,
            items: None,
        }
    }

    pub fn with_id(mut self, id: SourceId) -> Self {
        self.id = id;
        self
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_subtotal(mut self, subtotal: Decimal) -> Self {
        self.subtotal = subtotal;
        self
    }

    pub fn with_shipping(mut self, shipping: Decimal) -> Self {
        self.shipping = shipping;
        self
    }

    pub fn with_taxes(mut self, taxes: TaxBreakdown) -> Self {
        self.taxes = taxes;
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn with_register(mut self, cash_bank_id: CashBankId) -> Self {
        self.cash_bank_id = Some(cash_bank_id);
        self
    }

    /// Adds a product line; the first call replaces the default service line
    pub fn with_product(mut self, product_id: ProductId, quantity: Decimal, unit_price: Decimal) -> Self {
        self.items
            .get_or_insert_with(Vec::new)
            .push(DocumentItem::new(Some(product_id), "Merchandise", quantity, unit_price));
        self
    }

    pub fn build(self) -> SalesDocument {
        let total_amount = self.subtotal + self.shipping + self.taxes.vat + self.taxes.other_tax_additions
            - self.taxes.withholding
            - self.taxes.withholding_21
            - self.taxes.withholding_23
            - self.taxes.other_deductions;
        let subtotal = self.subtotal;
        SalesDocument {
            id: self.id,
            number: self.number,
            date: self.date,
            status: self.status,
            customer_name: self.customer_name,
            subtotal,
            shipping: self.shipping,
            taxes: self.taxes,
            total_amount,
            payment_method: self.payment_method,
            cash_bank_id: self.cash_bank_id,
            items: self
                .items
                .unwrap_or_else(|| vec![DocumentItem::new(None, "Consulting services", dec!(1), subtotal)]),
        }
    }

    pub fn build_source(self) -> SourceDocument {
        SourceDocument::Sale(self.build())
    }
}

/// Builder for purchase orders
pub struct PurchaseDocumentBuilder {
    id: SourceId,
    number: String,
    status: DocumentStatus,
    vendor_name: String,
    subtotal: Decimal,
    shipping: Decimal,
    taxes: TaxBreakdown,
    payment_method: PaymentMethod,
    cash_bank_id: Option<CashBankId>,
    expense_account_id: Option<AccountId>,
}

impl Default for PurchaseDocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PurchaseDocumentBuilder {
    /// Approved credit purchase of 2,000,000 plus 220,000 VAT
    pub fn new() -> Self {
        Self {
            id: SourceId::new(),
            number: StringFixtures::purchase_number().to_string(),
            status: DocumentStatus::Approved,
            vendor_name: StringFixtures::company_name(),
            subtotal: dec!(2000000),
            shipping: Decimal::ZERO,
            taxes: TaxBreakdown::vat(dec!(220000)),
            payment_method: PaymentMethod::Credit,
            cash_bank_id: None,
            expense_account_id: None,
        }
    }

    pub fn with_id(mut self, id: SourceId) -> Self {
        self.id = id;
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_subtotal(mut self, subtotal: Decimal) -> Self {
        self.subtotal = subtotal;
        self
    }

    pub fn with_shipping(mut self, shipping: Decimal) -> Self {
        self.shipping = shipping;
        self
    }

    pub fn with_taxes(mut self, taxes: TaxBreakdown) -> Self {
        self.taxes = taxes;
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn with_register(mut self, cash_bank_id: CashBankId) -> Self {
        self.cash_bank_id = Some(cash_bank_id);
        self
    }

    /// Books the single item to `account_id` instead of inventory
    pub fn with_expense_account(mut self, account_id: AccountId) -> Self {
        self.expense_account_id = Some(account_id);
        self
    }

    pub fn build(self) -> PurchaseDocument {
        let total_amount = self.subtotal + self.shipping + self.taxes.vat + self.taxes.other_tax_additions
            - self.taxes.withholding
            - self.taxes.withholding_21
            - self.taxes.withholding_23
            - self.taxes.other_deductions;
        let mut item = DocumentItem::new(None, "Office supplies", dec!(1), self.subtotal);
        if let Some(account_id) = self.expense_account_id {
            item = item.with_expense_account(account_id);
        }
        PurchaseDocument {
            id: self.id,
            number: self.number,
            date: DateFixtures::posting_date(),
            status: self.status,
            vendor_name: self.vendor_name,
            subtotal: self.subtotal,
            shipping: self.shipping,
            taxes: self.taxes,
            total_amount,
            payment_method: self.payment_method,
            cash_bank_id: self.cash_bank_id,
            items: vec![item],
        }
    }

    pub fn build_source(self) -> SourceDocument {
        SourceDocument::Purchase(self.build())
    }
}

/// Builder for payments received or made
pub struct PaymentDocumentBuilder {
    id: SourceId,
    status: DocumentStatus,
    direction: PaymentDirection,
    amount: Decimal,
    payment_method: PaymentMethod,
    cash_bank_id: Option<CashBankId>,
}

impl Default for PaymentDocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentDocumentBuilder {
    /// Completed bank receipt of 1,110,000
    pub fn new() -> Self {
        Self {
            id: SourceId::new(),
            status: DocumentStatus::Completed,
            direction: PaymentDirection::Received,
            amount: dec!(1110000),
            payment_method: PaymentMethod::Bank,
            cash_bank_id: None,
        }
    }

    pub fn with_id(mut self, id: SourceId) -> Self {
        self.id = id;
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn made(mut self) -> Self {
        self.direction = PaymentDirection::Made;
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn with_register(mut self, cash_bank_id: CashBankId) -> Self {
        self.cash_bank_id = Some(cash_bank_id);
        self
    }

    pub fn build(self) -> PaymentDocument {
        PaymentDocument {
            id: self.id,
            number: StringFixtures::payment_number().to_string(),
            date: DateFixtures::posting_date(),
            status: self.status,
            direction: self.direction,
            amount: self.amount,
            payment_method: self.payment_method,
            cash_bank_id: self.cash_bank_id,
            settles: Some(StringFixtures::invoice_number().to_string()),
        }
    }

    pub fn build_source(self) -> SourceDocument {
        SourceDocument::Payment(self.build())
    }
}

/// Posted depreciation run of `amount` on the default accounts
pub fn depreciation_run(amount: Decimal) -> SourceDocument {
    SourceDocument::Depreciation(DepreciationRun {
        id: SourceId::new(),
        asset_name: "Delivery van".to_string(),
        period: DateFixtures::period_end(),
        status: DocumentStatus::Completed,
        amount,
        expense_account_id: None,
        accumulated_account_id: None,
    })
}

/// Standalone COGS document for one product line
pub fn cogs_document(product_id: ProductId, quantity: Decimal) -> SourceDocument {
    SourceDocument::Cogs(CogsDocument {
        id: SourceId::new(),
        sale_number: StringFixtures::invoice_number().to_string(),
        date: DateFixtures::posting_date(),
        status: DocumentStatus::Invoiced,
        items: vec![DocumentItem::new(Some(product_id), "Merchandise", quantity, Decimal::ZERO)],
    })
}
