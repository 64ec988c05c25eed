//! Account resolution
//!
//! Maps the roles a journal line plays (settlement, revenue, a tax component)
//! to concrete accounts, using the configured [`AccountMapping`] and the
//! cash/bank sub-ledger links. Payment-method resolution is an exhaustive
//! [`PaymentAccountResolution`]; the unknown-method case records an event.

use serde::{Deserialize, Serialize};
use tracing::debug;

use core_kernel::{AccountId, CashBankId};

use crate::account::Account;
use crate::document::{PaymentMethod, TaxComponent};
use crate::error::LedgerError;
use crate::events::EventLog;
use crate::ports::AccountDirectory;

/// Account codes used by the builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountMapping {
    pub cash: String,
    pub bank: String,
    pub receivable: String,
    pub payable: String,
    pub revenue: String,
    pub shipping_revenue: String,
    pub vat_output: String,
    pub vat_input: String,
    pub other_tax_payable: String,
    pub withholding_payable: String,
    pub withholding_21_payable: String,
    pub withholding_23_payable: String,
    pub prepaid_withholding_21: String,
    pub prepaid_withholding_23: String,
    pub prepaid_other_tax: String,
    pub inventory: String,
    pub freight_in: String,
    pub cogs: String,
    pub fixed_assets: String,
    pub accumulated_depreciation: String,
    pub depreciation_expense: String,
}

impl Default for AccountMapping {
    fn default() -> Self {
        Self {
            cash: "1101".into(),
            bank: "1102".into(),
            receivable: "1201".into(),
            payable: "2101".into(),
            revenue: "4101".into(),
            shipping_revenue: "4102".into(),
            vat_output: "2103".into(),
            vat_input: "1240".into(),
            other_tax_payable: "2108".into(),
            withholding_payable: "2104".into(),
            withholding_21_payable: "2111".into(),
            withholding_23_payable: "2112".into(),
            prepaid_withholding_21: "1114".into(),
            prepaid_withholding_23: "1115".into(),
            prepaid_other_tax: "1116".into(),
            inventory: "1301".into(),
            freight_in: "1301".into(),
            cogs: "5101".into(),
            fixed_assets: "1501".into(),
            accumulated_depreciation: "1502".into(),
            depreciation_expense: "6201".into(),
        }
    }
}

/// Which counterparty account a document settles against on credit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counterparty {
    Receivable,
    Payable,
}

/// Which side of the tax relationship a document sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxSide {
    /// We sell: VAT is owed, customer withholdings are prepaid tax
    Sales,
    /// We buy: VAT is reclaimable, our withholdings are owed
    Purchase,
}

/// Outcome of resolving a settlement account
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentAccountResolution {
    Cash(Account),
    Bank {
        account: Account,
        cash_bank_id: Option<CashBankId>,
    },
    Counterparty(Account),
    /// Method was empty or unrecognized; the counterparty account was used
    UnknownMethodFallback {
        method: String,
        account: Account,
    },
}

impl PaymentAccountResolution {
    pub fn account(&self) -> &Account {
        match self {
            PaymentAccountResolution::Cash(account)
            | PaymentAccountResolution::Counterparty(account) => account,
            PaymentAccountResolution::Bank { account, .. }
            | PaymentAccountResolution::UnknownMethodFallback { account, .. } => account,
        }
    }

    pub fn into_account(self) -> Account {
        match self {
            PaymentAccountResolution::Cash(account)
            | PaymentAccountResolution::Counterparty(account) => account,
            PaymentAccountResolution::Bank { account, .. }
            | PaymentAccountResolution::UnknownMethodFallback { account, .. } => account,
        }
    }
}

/// Resolves line roles to accounts
#[derive(Debug, Clone, Default)]
pub struct AccountResolver {
    mapping: AccountMapping,
}

impl AccountResolver {
    pub fn new(mapping: AccountMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &AccountMapping {
        &self.mapping
    }

    /// Resolves a mandatory account
    ///
    /// # Errors
    ///
    /// * `LedgerError::NotFound` if no account has `code`
    /// * `LedgerError::Validation` if the account is a header or inactive
    pub async fn require<D: AccountDirectory + ?Sized>(&self, directory: &mut D, code: &str) -> Result<Account, LedgerError> {
        let account = directory
            .account_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::not_found("Account", code))?;
        ensure_postable(account)
    }

    /// Resolves an optional account
    ///
    /// A missing or inactive account yields `None`; a header account is
    /// still rejected.
    pub async fn optional<D: AccountDirectory + ?Sized>(&self, directory: &mut D, code: &str) -> Result<Option<Account>, LedgerError> {
        match directory.account_by_code(code).await? {
            Some(account) if !account.is_active => {
                debug!(code, "optional account inactive, treated as missing");
                Ok(None)
            }
            Some(account) => ensure_postable(account).map(Some),
            None => Ok(None),
        }
    }

    /// Resolves `primary`, then `fallback` if the primary code is missing
    pub async fn with_fallback<D: AccountDirectory + ?Sized>(
        &self,
        directory: &mut D,
        primary: &str,
        fallback: &str,
    ) -> Result<Option<Account>, LedgerError> {
        if let Some(account) = self.optional(directory, primary).await? {
            return Ok(Some(account));
        }
        debug!(primary, fallback, "account unavailable, trying fallback");
        self.optional(directory, fallback).await
    }

    /// Resolves an account referenced by id, such as an item expense account
    pub async fn by_id<D: AccountDirectory + ?Sized>(&self, directory: &mut D, id: AccountId) -> Result<Account, LedgerError> {
        let account = directory
            .account_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Account", id))?;
        ensure_postable(account)
    }

    /// Primary code and fallback code for a tax component
    pub fn tax_codes(&self, side: TaxSide, component: TaxComponent) -> (&str, &str) {
        let m = &self.mapping;
        match (side, component) {
            (TaxSide::Sales, TaxComponent::Vat) => (&m.vat_output, &m.vat_output),
            (TaxSide::Sales, TaxComponent::OtherAddition) => (&m.other_tax_payable, &m.vat_output),
            (TaxSide::Sales, TaxComponent::Withholding) => (&m.prepaid_withholding_21, &m.prepaid_withholding_21),
            (TaxSide::Sales, TaxComponent::Withholding21) => (&m.prepaid_withholding_21, &m.prepaid_withholding_21),
            (TaxSide::Sales, TaxComponent::Withholding23) => (&m.prepaid_withholding_23, &m.prepaid_withholding_23),
            (TaxSide::Sales, TaxComponent::OtherDeduction) => (&m.prepaid_other_tax, &m.prepaid_withholding_21),
            (TaxSide::Purchase, TaxComponent::Vat) => (&m.vat_input, &m.vat_input),
            (TaxSide::Purchase, TaxComponent::OtherAddition) => (&m.vat_input, &m.vat_input),
            (TaxSide::Purchase, TaxComponent::Withholding) => (&m.withholding_payable, &m.withholding_payable),
            (TaxSide::Purchase, TaxComponent::Withholding21) => (&m.withholding_21_payable, &m.withholding_payable),
            (TaxSide::Purchase, TaxComponent::Withholding23) => (&m.withholding_23_payable, &m.withholding_payable),
            (TaxSide::Purchase, TaxComponent::OtherDeduction) => (&m.withholding_payable, &m.withholding_payable),
        }
    }

    /// Resolves the account for a tax component, `None` if unconfigured
    pub async fn tax_account<D: AccountDirectory + ?Sized>(
        &self,
        directory: &mut D,
        side: TaxSide,
        component: TaxComponent,
    ) -> Result<Option<Account>, LedgerError> {
        let (primary, fallback) = self.tax_codes(side, component);
        self.with_fallback(directory, primary, fallback).await
    }

    /// Settlement account for a sale or purchase
    ///
    /// Cash and bank settle through the linked register when one is given,
    /// otherwise through the configured cash or bank account. Credit settles
    /// against the counterparty account. Unknown methods fall back to the
    /// counterparty account and record an event.
    pub async fn settlement<D: AccountDirectory + ?Sized>(
        &self,
        directory: &mut D,
        method: &PaymentMethod,
        cash_bank_id: Option<CashBankId>,
        counterparty: Counterparty,
        events: &mut EventLog,
    ) -> Result<PaymentAccountResolution, LedgerError> {
        match method {
            PaymentMethod::Cash | PaymentMethod::Bank => self.cash_or_bank(directory, method, cash_bank_id).await,
            PaymentMethod::Credit => {
                let account = self.require(directory, self.counterparty_code(counterparty)).await?;
                Ok(PaymentAccountResolution::Counterparty(account))
            }
            PaymentMethod::Unknown(raw) => {
                let account = self.require(directory, self.counterparty_code(counterparty)).await?;
                events.unknown_method(method, &account.code);
                Ok(PaymentAccountResolution::UnknownMethodFallback {
                    method: raw.clone(),
                    account,
                })
            }
        }
    }

    /// Cash or bank account for a payment document
    ///
    /// # Errors
    ///
    /// `LedgerError::Validation` if the method is credit or unknown and no
    /// register is linked
    pub async fn payment_account<D: AccountDirectory + ?Sized>(
        &self,
        directory: &mut D,
        method: &PaymentMethod,
        cash_bank_id: Option<CashBankId>,
        events: &mut EventLog,
    ) -> Result<PaymentAccountResolution, LedgerError> {
        match (method, cash_bank_id) {
            (PaymentMethod::Cash | PaymentMethod::Bank, _) => self.cash_or_bank(directory, method, cash_bank_id).await,
            (_, Some(cash_bank_id)) => {
                let resolution = self.register(directory, cash_bank_id).await?;
                events.unknown_method(method, &resolution.account().code);
                Ok(resolution)
            }
            (_, None) => Err(LedgerError::validation_field(
                format!("payment method {} does not settle through cash or bank", method),
                "payment_method",
            )),
        }
    }

    fn counterparty_code(&self, counterparty: Counterparty) -> &str {
        match counterparty {
            Counterparty::Receivable => &self.mapping.receivable,
            Counterparty::Payable => &self.mapping.payable,
        }
    }

    async fn cash_or_bank<D: AccountDirectory + ?Sized>(
        &self,
        directory: &mut D,
        method: &PaymentMethod,
        cash_bank_id: Option<CashBankId>,
    ) -> Result<PaymentAccountResolution, LedgerError> {
        if let Some(cash_bank_id) = cash_bank_id {
            return self.register(directory, cash_bank_id).await;
        }
        if *method == PaymentMethod::Cash {
            let account = self.require(directory, &self.mapping.cash).await?;
            Ok(PaymentAccountResolution::Cash(account))
        } else {
            let account = self.require(directory, &self.mapping.bank).await?;
            Ok(PaymentAccountResolution::Bank {
                account,
                cash_bank_id: None,
            })
        }
    }

    async fn register<D: AccountDirectory + ?Sized>(
        &self,
        directory: &mut D,
        cash_bank_id: CashBankId,
    ) -> Result<PaymentAccountResolution, LedgerError> {
        let register = directory
            .cash_bank_by_id(cash_bank_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("CashBankAccount", cash_bank_id))?;
        let account = self.by_id(directory, register.account_id).await?;
        Ok(PaymentAccountResolution::Bank {
            account,
            cash_bank_id: Some(register.id),
        })
    }
}

fn ensure_postable(account: Account) -> Result<Account, LedgerError> {
    if account.is_header {
        return Err(LedgerError::validation_field(
            format!("account {} is a header account and cannot receive postings", account.code),
            "account_code",
        ));
    }
    if !account.is_active {
        return Err(LedgerError::validation_field(
            format!("account {} is inactive", account.code),
            "account_code",
        ));
    }
    Ok(account)
}
