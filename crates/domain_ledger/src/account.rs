//! Account types for the chart of accounts
//!
//! This module defines the account structure for double-entry bookkeeping,
//! the normal-balance sign table, and the cash/bank sub-ledger record that
//! mirrors a subset of asset accounts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{AccountId, CashBankId, CoreError, Currency, Money, MoneyError};

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Revenue accounts (credit normal balance)
    Revenue,
    /// Expense accounts (debit normal balance)
    Expense,
}

impl AccountType {
    /// Returns true if this account type has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// Returns the side on which this account type increases
    pub fn normal_balance(&self) -> NormalBalance {
        if self.is_debit_normal() {
            NormalBalance::Debit
        } else {
            NormalBalance::Credit
        }
    }

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        }
    }

    /// Type implied by the leading digit of an account code
    ///
    /// 1xxx assets, 2xxx liabilities, 3xxx equity, 4xxx revenue, 5xxx and
    /// 6xxx expenses. Other prefixes carry no convention.
    pub fn expected_for_code(code: &str) -> Option<AccountType> {
        match code.trim().chars().next()? {
            '1' => Some(AccountType::Asset),
            '2' => Some(AccountType::Liability),
            '3' => Some(AccountType::Equity),
            '4' => Some(AccountType::Revenue),
            '5' | '6' => Some(AccountType::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASSET" => Ok(AccountType::Asset),
            "LIABILITY" => Ok(AccountType::Liability),
            "EQUITY" => Ok(AccountType::Equity),
            "REVENUE" => Ok(AccountType::Revenue),
            "EXPENSE" => Ok(AccountType::Expense),
            other => Err(CoreError::unknown_code("account type", other)),
        }
    }
}

/// The side (debit or credit) on which an account naturally increases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NormalBalance {
    Debit,
    Credit,
}

/// Category of account for financial reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountCategory {
    CurrentAsset,
    FixedAsset,
    CurrentLiability,
    Equity,
    OperatingRevenue,
    CostOfGoodsSold,
    OperatingExpense,
    Other,
}

impl AccountCategory {
    const ALL: [AccountCategory; 8] = [
        AccountCategory::CurrentAsset,
        AccountCategory::FixedAsset,
        AccountCategory::CurrentLiability,
        AccountCategory::Equity,
        AccountCategory::OperatingRevenue,
        AccountCategory::CostOfGoodsSold,
        AccountCategory::OperatingExpense,
        AccountCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountCategory::CurrentAsset => "CURRENT_ASSET",
            AccountCategory::FixedAsset => "FIXED_ASSET",
            AccountCategory::CurrentLiability => "CURRENT_LIABILITY",
            AccountCategory::Equity => "EQUITY",
            AccountCategory::OperatingRevenue => "OPERATING_REVENUE",
            AccountCategory::CostOfGoodsSold => "COST_OF_GOODS_SOLD",
            AccountCategory::OperatingExpense => "OPERATING_EXPENSE",
            AccountCategory::Other => "OTHER",
        }
    }
}

impl FromStr for AccountCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        AccountCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| CoreError::unknown_code("account category", s))
    }
}

/// An account in the chart of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,
    /// Account code (e.g., "1101")
    pub code: String,
    /// Account name
    pub name: String,
    /// Account type
    pub account_type: AccountType,
    /// Account category
    pub category: Option<AccountCategory>,
    /// Parent account ID (for hierarchical charts)
    pub parent_id: Option<AccountId>,
    /// Header accounts aggregate their children and take no direct postings
    pub is_header: bool,
    /// Whether account is active
    pub is_active: bool,
    /// Cached running balance, positive on the normal side
    pub balance: Money,
    /// Description
    pub description: Option<String>,
}

impl Account {
    /// Creates a new active leaf account with a zero balance
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier
    /// * `code` - Account code
    /// * `name` - Account name
    /// * `account_type` - Type of account
    /// * `currency` - Ledger currency for the cached balance
    pub fn new(
        id: AccountId,
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        currency: Currency,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            account_type,
            category: None,
            parent_id: None,
            is_header: false,
            is_active: true,
            balance: Money::zero(currency),
            description: None,
        }
    }

    /// Sets the account category
    pub fn with_category(mut self, category: AccountCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the parent account
    pub fn with_parent(mut self, parent_id: AccountId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Marks the account as a header (aggregating) account
    pub fn as_header(mut self) -> Self {
        self.is_header = true;
        self
    }

    /// Sets the cached balance
    pub fn with_balance(mut self, balance: Money) -> Self {
        self.balance = balance;
        self
    }

    /// Marks the account as inactive
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the normal balance side of this account
    pub fn normal_balance(&self) -> NormalBalance {
        self.account_type.normal_balance()
    }

    /// Applies the sign table to a debit/credit pair
    ///
    /// Net change is `debit - credit`; it is added as-is for debit-normal
    /// accounts and negated for credit-normal accounts.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if the amounts are not in the account's currency
    pub fn signed_change(&self, debit: &Money, credit: &Money) -> Result<Money, MoneyError> {
        let net = debit.checked_sub(credit)?;
        if self.account_type.is_debit_normal() {
            Ok(net)
        } else {
            Ok(-net)
        }
    }

    /// Returns the type the code prefix implies when it contradicts the declared type
    pub fn type_mismatch(&self) -> Option<AccountType> {
        AccountType::expected_for_code(&self.code)
            .filter(|expected| *expected != self.account_type)
    }

    /// Returns true if the account may receive journal lines
    pub fn is_postable(&self) -> bool {
        self.is_active && !self.is_header
    }
}

/// A cash or bank register mirrored from a general-ledger asset account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBankAccount {
    /// Unique identifier
    pub id: CashBankId,
    /// Register code (e.g., "BNK-001")
    pub code: String,
    /// Register name
    pub name: String,
    /// Linked general-ledger account
    pub account_id: AccountId,
    /// Mirrored balance
    pub balance: Money,
    /// Whether the register is active
    pub is_active: bool,
}

impl CashBankAccount {
    /// Creates a register linked to `account_id` with a zero balance
    pub fn new(
        id: CashBankId,
        code: impl Into<String>,
        name: impl Into<String>,
        account_id: AccountId,
        currency: Currency,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            account_id,
            balance: Money::zero(currency),
            is_active: true,
        }
    }

    /// Sets the mirrored balance
    pub fn with_balance(mut self, balance: Money) -> Self {
        self.balance = balance;
        self
    }
}

/// Standard trading-company chart of accounts
///
/// Codes match the defaults in [`crate::resolver::AccountMapping`].
pub struct StandardChart;

impl StandardChart {
    /// Creates the standard hierarchical chart with zero balances
    pub fn create_standard_accounts(currency: Currency) -> Vec<Account> {
        use AccountCategory::*;
        use AccountType::*;

        let mut accounts = Vec::new();
        let mut push = |code: &str, name: &str, ty: AccountType, cat: AccountCategory, parent: Option<AccountId>, header: bool| {
            let mut account = Account::new(AccountId::new_v7(), code, name, ty, currency).with_category(cat);
            if let Some(parent_id) = parent {
                account = account.with_parent(parent_id);
            }
            if header {
                account = account.as_header();
            }
            let id = account.id;
            accounts.push(account);
            id
        };

        let assets = push("1000", "ASSETS", Asset, CurrentAsset, None, true);
        let current = push("1100", "CURRENT ASSETS", Asset, CurrentAsset, Some(assets), true);
        push("1101", "CASH", Asset, CurrentAsset, Some(current), false);
        push("1102", "BANK", Asset, CurrentAsset, Some(current), false);
        push("1114", "PREPAID INCOME TAX ART. 21", Asset, CurrentAsset, Some(current), false);
        push("1115", "PREPAID INCOME TAX ART. 23", Asset, CurrentAsset, Some(current), false);
        push("1116", "OTHER PREPAID TAXES", Asset, CurrentAsset, Some(current), false);
        push("1201", "ACCOUNTS RECEIVABLE", Asset, CurrentAsset, Some(current), false);
        push("1240", "INPUT VAT", Asset, CurrentAsset, Some(current), false);
        push("1301", "MERCHANDISE INVENTORY", Asset, CurrentAsset, Some(current), false);
        let fixed = push("1500", "FIXED ASSETS", Asset, FixedAsset, Some(assets), true);
        push("1501", "EQUIPMENT", Asset, FixedAsset, Some(fixed), false);
        push("1502", "ACCUMULATED DEPRECIATION", Asset, FixedAsset, Some(fixed), false);

        let liabilities = push("2000", "LIABILITIES", Liability, CurrentLiability, None, true);
        let current_liabilities = push("2100", "CURRENT LIABILITIES", Liability, CurrentLiability, Some(liabilities), true);
        push("2101", "ACCOUNTS PAYABLE", Liability, CurrentLiability, Some(current_liabilities), false);
        push("2103", "OUTPUT VAT", Liability, CurrentLiability, Some(current_liabilities), false);
        push("2104", "WITHHOLDING TAX PAYABLE", Liability, CurrentLiability, Some(current_liabilities), false);
        push("2108", "OTHER TAXES PAYABLE", Liability, CurrentLiability, Some(current_liabilities), false);
        push("2111", "INCOME TAX ART. 21 PAYABLE", Liability, CurrentLiability, Some(current_liabilities), false);
        push("2112", "INCOME TAX ART. 23 PAYABLE", Liability, CurrentLiability, Some(current_liabilities), false);

        let equity = push("3000", "EQUITY", AccountType::Equity, AccountCategory::Equity, None, true);
        push("3101", "OWNER CAPITAL", AccountType::Equity, AccountCategory::Equity, Some(equity), false);
        push("3201", "RETAINED EARNINGS", AccountType::Equity, AccountCategory::Equity, Some(equity), false);

        let revenue = push("4000", "REVENUE", Revenue, OperatingRevenue, None, true);
        push("4101", "SALES REVENUE", Revenue, OperatingRevenue, Some(revenue), false);
        push("4102", "SHIPPING REVENUE", Revenue, OperatingRevenue, Some(revenue), false);

        let cogs = push("5000", "COST OF GOODS SOLD", Expense, CostOfGoodsSold, None, true);
        push("5101", "COST OF GOODS SOLD", Expense, CostOfGoodsSold, Some(cogs), false);

        let opex = push("6000", "OPERATING EXPENSES", Expense, OperatingExpense, None, true);
        push("6001", "GENERAL OPERATING EXPENSE", Expense, OperatingExpense, Some(opex), false);
        push("6201", "DEPRECIATION EXPENSE", Expense, OperatingExpense, Some(opex), false);

        accounts
    }

    /// Creates the petty-cash and main-bank registers linked to 1101 and 1102
    pub fn create_cash_banks(accounts: &[Account], currency: Currency) -> Vec<CashBankAccount> {
        let link = |code: &str| accounts.iter().find(|a| a.code == code).map(|a| a.id);

        let mut registers = Vec::new();
        if let Some(cash) = link("1101") {
            registers.push(CashBankAccount::new(CashBankId::new_v7(), "CSH-001", "Petty Cash", cash, currency));
        }
        if let Some(bank) = link("1102") {
            registers.push(CashBankAccount::new(CashBankId::new_v7(), "BNK-001", "Main Bank Account", bank, currency));
        }
        registers
    }
}
