//! Journal entry construction
//!
//! Turns a [`SourceDocument`] into an ordered, validated and balanced
//! [`JournalDraft`]. Nothing is written here; the builder only reads
//! accounts and product costs.
//!
//! # Example
//!
//! ```rust,ignore
//! let builder = JournalBuilder::new(LedgerSettings::default());
//! let mut events = EventLog::new();
//! let draft = builder.build(&document, uow.as_mut(), costs.as_ref(), &mut events).await?;
//! assert!(draft.is_balanced()?);
//! ```

use rust_decimal::Decimal;
use tracing::debug;

use core_kernel::Money;

use crate::account::Account;
use crate::document::{
    CogsDocument, DepreciationRun, DocumentItem, PaymentDirection, PaymentDocument, PurchaseDocument,
    SalesDocument, SourceDocument, TaxBreakdown, TaxComponent,
};
use crate::error::LedgerError;
use crate::events::{EventLog, LedgerEvent};
use crate::journal::{DraftLine, JournalDraft};
use crate::ports::{AccountDirectory, ProductCostLookup};
use crate::resolver::{AccountResolver, Counterparty, TaxSide};
use crate::settings::LedgerSettings;

/// Builds balanced drafts from source documents
#[derive(Debug, Clone)]
pub struct JournalBuilder {
    resolver: AccountResolver,
    settings: LedgerSettings,
}

impl JournalBuilder {
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            resolver: AccountResolver::new(settings.accounts.clone()),
            settings,
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Builds the draft for `document`
    ///
    /// # Arguments
    ///
    /// * `document` - The source document
    /// * `directory` - Account lookups, usually the open unit of work
    /// * `costs` - Product costs for COGS lines
    /// * `events` - Receives every fallback and skipped line
    ///
    /// # Errors
    ///
    /// * `LedgerError::Validation` for negative amounts, header or inactive accounts
    /// * `LedgerError::NotFound` for a missing mandatory account
    /// * `LedgerError::Unbalanced` when the imbalance exceeds the tolerance
    pub async fn build<D: AccountDirectory + ?Sized>(
        &self,
        document: &SourceDocument,
        directory: &mut D,
        costs: &dyn ProductCostLookup,
        events: &mut EventLog,
    ) -> Result<JournalDraft, LedgerError> {
        let mut draft = JournalDraft::new(
            document.source_type(),
            document.source_id(),
            document.entry_date(),
            self.settings.currency,
        )
        .with_reference(document.reference());

        match document {
            SourceDocument::Sale(sale) => self.sale_lines(sale, &mut draft, directory, costs, events).await?,
            SourceDocument::Purchase(purchase) => self.purchase_lines(purchase, &mut draft, directory, events).await?,
            SourceDocument::Payment(payment) => self.payment_lines(payment, &mut draft, directory, events).await?,
            SourceDocument::Depreciation(run) => self.depreciation_lines(run, &mut draft, directory).await?,
            SourceDocument::Cogs(cogs) => self.cogs_document_lines(cogs, &mut draft, directory, costs, events).await?,
        }

        if draft.lines.len() < 2 {
            return Err(LedgerError::validation(format!(
                "{} {} produces no postable lines",
                draft.source_type, draft.source_id
            )));
        }
        self.balance(&mut draft, events)?;

        debug!(
            source_type = %draft.source_type,
            source_id = %draft.source_id,
            lines = draft.lines.len(),
            "journal draft built"
        );
        Ok(draft)
    }

    async fn sale_lines<D: AccountDirectory + ?Sized>(
        &self,
        sale: &SalesDocument,
        draft: &mut JournalDraft,
        directory: &mut D,
        costs: &dyn ProductCostLookup,
        events: &mut EventLog,
    ) -> Result<(), LedgerError> {
        non_negative("subtotal", sale.subtotal)?;
        non_negative("shipping", sale.shipping)?;
        validate_taxes(&sale.taxes)?;
        validate_items(&sale.items)?;
        draft.description = format!("Sales invoice {} - {}", sale.number, sale.customer_name);

        let components = self.material_components(&sale.taxes);
        let settlement = settlement_amount(sale.subtotal, sale.shipping, &components)?;
        if settlement.is_sign_negative() {
            return Err(LedgerError::validation_field("withholdings exceed the invoice amount", "taxes"));
        }
        if settlement != sale.total_amount {
            events.record(LedgerEvent::TotalMismatch {
                computed: settlement,
                declared: sale.total_amount,
            });
        }

        let settlement_account = self
            .resolver
            .settlement(directory, &sale.payment_method, sale.cash_bank_id, Counterparty::Receivable, events)
            .await?
            .into_account();
        draft.push(self.debit(&settlement_account, format!("Settlement {}", sale.number), settlement));

        for (component, amount) in components.iter().filter(|(c, _)| !c.is_addition()) {
            if let Some(account) = self.tax_account(directory, TaxSide::Sales, *component, *amount, events).await? {
                draft.push(self.debit(&account, format!("{} withheld by customer", component.label()), *amount));
            }
        }

        let revenue = self.resolver.require(directory, &self.resolver.mapping().revenue).await?;
        draft.push(self.credit(&revenue, format!("Sales revenue {}", sale.number), sale.subtotal));

        if !sale.shipping.is_zero() {
            let mapping = self.resolver.mapping();
            let shipping = self
                .resolver
                .with_fallback(directory, &mapping.shipping_revenue, &mapping.revenue)
                .await?
                .ok_or_else(|| LedgerError::not_found("Account", &mapping.shipping_revenue))?;
            draft.push(self.credit(&shipping, format!("Shipping {}", sale.number), sale.shipping));
        }

        for (component, amount) in components.iter().filter(|(c, _)| c.is_addition()) {
            if let Some(account) = self.tax_account(directory, TaxSide::Sales, *component, *amount, events).await? {
                draft.push(self.credit(&account, format!("{} {}", component.label(), sale.number), *amount));
            }
        }

        if self.settings.inline_cogs {
            self.inline_cogs(&sale.items, &sale.number, draft, directory, costs, events).await?;
        }
        Ok(())
    }

    async fn purchase_lines<D: AccountDirectory + ?Sized>(
        &self,
        purchase: &PurchaseDocument,
        draft: &mut JournalDraft,
        directory: &mut D,
        events: &mut EventLog,
    ) -> Result<(), LedgerError> {
        non_negative("subtotal", purchase.subtotal)?;
        non_negative("shipping", purchase.shipping)?;
        validate_taxes(&purchase.taxes)?;
        validate_items(&purchase.items)?;
        draft.description = format!("Purchase {} - {}", purchase.number, purchase.vendor_name);

        let mapping = self.resolver.mapping();
        if purchase.items.is_empty() {
            let inventory = self.resolver.require(directory, &mapping.inventory).await?;
            draft.push(self.debit(&inventory, format!("Purchase {}", purchase.number), purchase.subtotal));
        }
        for item in &purchase.items {
            let account = match item.expense_account_id {
                Some(id) => self.resolver.by_id(directory, id).await?,
                None => self.resolver.require(directory, &mapping.inventory).await?,
            };
            draft.push(self.debit(&account, item.description.clone(), item.line_total));
        }

        let components = self.material_components(&purchase.taxes);
        for (component, amount) in components.iter().filter(|(c, _)| c.is_addition()) {
            if let Some(account) = self.tax_account(directory, TaxSide::Purchase, *component, *amount, events).await? {
                draft.push(self.debit(&account, format!("{} {}", component.label(), purchase.number), *amount));
            }
        }

        if !purchase.shipping.is_zero() {
            let freight = self.resolver.require(directory, &mapping.freight_in).await?;
            draft.push(self.debit(&freight, format!("Freight in {}", purchase.number), purchase.shipping));
        }

        let settlement = settlement_amount(purchase.subtotal, purchase.shipping, &components)?;
        if settlement.is_sign_negative() {
            return Err(LedgerError::validation_field("withholdings exceed the purchase amount", "taxes"));
        }
        if settlement != purchase.total_amount {
            events.record(LedgerEvent::TotalMismatch {
                computed: settlement,
                declared: purchase.total_amount,
            });
        }
        let settlement_account = self
            .resolver
            .settlement(directory, &purchase.payment_method, purchase.cash_bank_id, Counterparty::Payable, events)
            .await?
            .into_account();
        draft.push(self.credit(&settlement_account, format!("Settlement {}", purchase.number), settlement));

        for (component, amount) in components.iter().filter(|(c, _)| !c.is_addition()) {
            if let Some(account) = self.tax_account(directory, TaxSide::Purchase, *component, *amount, events).await? {
                draft.push(self.credit(&account, format!("{} withheld", component.label()), *amount));
            }
        }
        Ok(())
    }

    async fn payment_lines<D: AccountDirectory + ?Sized>(
        &self,
        payment: &PaymentDocument,
        draft: &mut JournalDraft,
        directory: &mut D,
        events: &mut EventLog,
    ) -> Result<(), LedgerError> {
        positive("amount", payment.amount)?;
        let reference = payment.settles.as_deref().unwrap_or(&payment.number);
        let cash = self
            .resolver
            .payment_account(directory, &payment.payment_method, payment.cash_bank_id, events)
            .await?
            .into_account();
        let mapping = self.resolver.mapping();

        match payment.direction {
            PaymentDirection::Received => {
                draft.description = format!("Payment received {}", payment.number);
                let receivable = self.resolver.require(directory, &mapping.receivable).await?;
                draft.push(self.debit(&cash, format!("Receipt for {}", reference), payment.amount));
                draft.push(self.credit(&receivable, format!("Settle receivable {}", reference), payment.amount));
            }
            PaymentDirection::Made => {
                draft.description = format!("Payment made {}", payment.number);
                let payable = self.resolver.require(directory, &mapping.payable).await?;
                draft.push(self.debit(&payable, format!("Settle payable {}", reference), payment.amount));
                draft.push(self.credit(&cash, format!("Disbursement for {}", reference), payment.amount));
            }
        }
        Ok(())
    }

    async fn depreciation_lines<D: AccountDirectory + ?Sized>(
        &self,
        run: &DepreciationRun,
        draft: &mut JournalDraft,
        directory: &mut D,
    ) -> Result<(), LedgerError> {
        positive("amount", run.amount)?;
        draft.description = format!("Depreciation {} {}", run.asset_name, run.period.format("%Y-%m"));
        let mapping = self.resolver.mapping();

        let expense = match run.expense_account_id {
            Some(id) => self.resolver.by_id(directory, id).await?,
            None => self.resolver.require(directory, &mapping.depreciation_expense).await?,
        };
        let accumulated = match run.accumulated_account_id {
            Some(id) => self.resolver.by_id(directory, id).await?,
            None => self.resolver.require(directory, &mapping.accumulated_depreciation).await?,
        };
        draft.push(self.debit(&expense, format!("Depreciation expense {}", run.asset_name), run.amount));
        draft.push(self.credit(&accumulated, format!("Accumulated depreciation {}", run.asset_name), run.amount));
        Ok(())
    }

    async fn cogs_document_lines<D: AccountDirectory + ?Sized>(
        &self,
        cogs: &CogsDocument,
        draft: &mut JournalDraft,
        directory: &mut D,
        costs: &dyn ProductCostLookup,
        events: &mut EventLog,
    ) -> Result<(), LedgerError> {
        validate_items(&cogs.items)?;
        draft.description = format!("Cost of goods sold {}", cogs.sale_number);
        let mapping = self.resolver.mapping();
        let expense = self.resolver.require(directory, &mapping.cogs).await?;
        let inventory = self.resolver.require(directory, &mapping.inventory).await?;

        let total = self.cogs_total(&cogs.items, costs, events).await?;
        if total.is_zero() {
            return Err(LedgerError::validation_field(
                format!("sale {} has no costed items", cogs.sale_number),
                "items",
            ));
        }
        draft.push(self.debit(&expense, format!("COGS {}", cogs.sale_number), total));
        draft.push(self.credit(&inventory, format!("Inventory out {}", cogs.sale_number), total));
        Ok(())
    }

    async fn inline_cogs<D: AccountDirectory + ?Sized>(
        &self,
        items: &[DocumentItem],
        number: &str,
        draft: &mut JournalDraft,
        directory: &mut D,
        costs: &dyn ProductCostLookup,
        events: &mut EventLog,
    ) -> Result<(), LedgerError> {
        let total = self.cogs_total(items, costs, events).await?;
        if total.is_zero() {
            return Ok(());
        }
        let mapping = self.resolver.mapping();
        let expense = self.resolver.optional(directory, &mapping.cogs).await?;
        let inventory = self.resolver.optional(directory, &mapping.inventory).await?;
        match (expense, inventory) {
            (Some(expense), Some(inventory)) => {
                draft.push(self.debit(&expense, format!("COGS {}", number), total));
                draft.push(self.credit(&inventory, format!("Inventory out {}", number), total));
            }
            _ => events.record(LedgerEvent::CogsSkipped {
                reason: format!("COGS account {} or inventory account {} unavailable", mapping.cogs, mapping.inventory),
            }),
        }
        Ok(())
    }

    /// Sum of quantity times unit cost over items with a known, non-zero cost
    async fn cogs_total(
        &self,
        items: &[DocumentItem],
        costs: &dyn ProductCostLookup,
        events: &mut EventLog,
    ) -> Result<Decimal, LedgerError> {
        let mut total = Decimal::ZERO;
        for item in items {
            let Some(product_id) = item.product_id else {
                events.record(LedgerEvent::CogsItemSkipped {
                    product_id: None,
                    reason: format!("item '{}' has no product", item.description),
                });
                continue;
            };
            match costs.unit_cost(product_id).await? {
                None => events.record(LedgerEvent::CogsItemSkipped {
                    product_id: Some(product_id),
                    reason: "product not found".into(),
                }),
                Some(cost) if cost.unit_cost.is_zero() => events.record(LedgerEvent::CogsItemSkipped {
                    product_id: Some(product_id),
                    reason: format!("product '{}' has zero cost", cost.name),
                }),
                Some(cost) => {
                    total = item
                        .quantity
                        .checked_mul(cost.unit_cost)
                        .and_then(|line| total.checked_add(line))
                        .ok_or_else(|| overflow("cogs"))?;
                }
            }
        }
        Ok(total)
    }

    async fn tax_account<D: AccountDirectory + ?Sized>(
        &self,
        directory: &mut D,
        side: TaxSide,
        component: TaxComponent,
        amount: Decimal,
        events: &mut EventLog,
    ) -> Result<Option<Account>, LedgerError> {
        let account = self.resolver.tax_account(directory, side, component).await?;
        if account.is_none() {
            let (code, _) = self.resolver.tax_codes(side, component);
            events.record(LedgerEvent::TaxLineSkipped {
                component,
                amount,
                account_code: code.to_string(),
            });
        }
        Ok(account)
    }

    /// Tax components at or above the materiality threshold
    fn material_components(&self, taxes: &TaxBreakdown) -> Vec<(TaxComponent, Decimal)> {
        taxes
            .components()
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero() && *amount >= self.settings.materiality_threshold)
            .collect()
    }

    /// Accepts a balanced draft, absorbs an imbalance within tolerance, or fails
    fn balance(&self, draft: &mut JournalDraft, events: &mut EventLog) -> Result<(), LedgerError> {
        if let Some(line) = draft.lines.iter().find(|l| !l.is_one_sided()) {
            return Err(LedgerError::validation(format!(
                "line for account {} must carry exactly one positive side",
                line.account_code
            )));
        }

        let debits = draft.total_debit()?.amount();
        let credits = draft.total_credit()?.amount();
        let difference = debits - credits;
        if difference.is_zero() {
            return Ok(());
        }

        let tolerance = self.settings.balancing_tolerance;
        let unbalanced = || LedgerError::Unbalanced {
            debits,
            credits,
            difference: difference.abs(),
        };
        if tolerance.is_zero() || difference.abs() > tolerance {
            return Err(unbalanced());
        }

        let currency = draft.currency;
        let primary = draft
            .lines
            .iter_mut()
            .find(|l| l.is_debit())
            .ok_or_else(unbalanced)?;
        let adjusted = primary.debit.amount() - difference;
        if !adjusted.is_sign_positive() || adjusted.is_zero() {
            return Err(unbalanced());
        }
        primary.debit = Money::new(adjusted, currency);
        events.record(LedgerEvent::AutoBalanceAdjusted {
            account_code: primary.account_code.clone(),
            difference: -difference,
        });
        Ok(())
    }

    fn debit(&self, account: &Account, description: impl Into<String>, amount: Decimal) -> DraftLine {
        DraftLine::debit(account.id, &account.code, description, Money::new(amount, self.settings.currency))
    }

    fn credit(&self, account: &Account, description: impl Into<String>, amount: Decimal) -> DraftLine {
        DraftLine::credit(account.id, &account.code, description, Money::new(amount, self.settings.currency))
    }
}

/// subtotal + shipping + additions - deductions
fn settlement_amount(
    subtotal: Decimal,
    shipping: Decimal,
    components: &[(TaxComponent, Decimal)],
) -> Result<Decimal, LedgerError> {
    let start = subtotal.checked_add(shipping).ok_or_else(|| overflow("settlement"))?;
    components.iter().try_fold(start, |acc, (component, amount)| {
        let next = if component.is_addition() {
            acc.checked_add(*amount)
        } else {
            acc.checked_sub(*amount)
        };
        next.ok_or_else(|| overflow("settlement"))
    })
}

fn overflow(field: &str) -> LedgerError {
    LedgerError::validation_field(format!("{} amount overflows", field), field)
}

fn non_negative(field: &str, amount: Decimal) -> Result<(), LedgerError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::validation_field(format!("{} must not be negative", field), field));
    }
    Ok(())
}

fn positive(field: &str, amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation_field(format!("{} must be positive", field), field));
    }
    Ok(())
}

fn validate_taxes(taxes: &TaxBreakdown) -> Result<(), LedgerError> {
    for (component, amount) in taxes.components() {
        non_negative(component.label(), amount)?;
    }
    Ok(())
}

fn validate_items(items: &[DocumentItem]) -> Result<(), LedgerError> {
    for item in items {
        non_negative("quantity", item.quantity)?;
        non_negative("unit_price", item.unit_price)?;
        non_negative("line_total", item.line_total)?;
    }
    Ok(())
}
