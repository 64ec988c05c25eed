//! Ledger repository
//!
//! Row types and SQL for accounts, cash/bank registers and the journal. Every
//! function takes a borrowed connection so the caller decides the transaction
//! boundary; the unit of work in [`crate::adapters::ledger`] passes its open
//! transaction.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use core_kernel::{AccountId, CashBankId, Currency, JournalEntryId, JournalLineId, Money, SourceId};
use domain_ledger::{
    Account, AccountCategory, AccountType, CashBankAccount, DuplicatePosting, JournalEntry,
    JournalLine, JournalStatus, LineTotals, SourceType, UnbalancedEntry,
};

use crate::error::DatabaseError;

// ============================================================================
// Rows
// ============================================================================

/// Row of the `accounts` table
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub category: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_header: bool,
    pub is_active: bool,
    pub balance: Decimal,
    pub description: Option<String>,
}

impl AccountRow {
    pub fn into_domain(self, currency: Currency) -> Result<Account, DatabaseError> {
        let account_type = AccountType::from_str(&self.account_type)
            .map_err(|e| DatabaseError::decode("accounts.account_type", e))?;
        let category = self
            .category
            .as_deref()
            .map(AccountCategory::from_str)
            .transpose()
            .map_err(|e| DatabaseError::decode("accounts.category", e))?;
        Ok(Account {
            id: AccountId::from_uuid(self.account_id),
            code: self.code,
            name: self.name,
            account_type,
            category,
            parent_id: self.parent_id.map(AccountId::from_uuid),
            is_header: self.is_header,
            is_active: self.is_active,
            balance: Money::new(self.balance, currency),
            description: self.description,
        })
    }
}

/// Row of the `cash_bank_accounts` table
#[derive(Debug, Clone, FromRow)]
pub struct CashBankRow {
    pub cash_bank_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_id: Uuid,
    pub balance: Decimal,
    pub is_active: bool,
}

impl CashBankRow {
    pub fn into_domain(self, currency: Currency) -> CashBankAccount {
        CashBankAccount {
            id: CashBankId::from_uuid(self.cash_bank_id),
            code: self.code,
            name: self.name,
            account_id: AccountId::from_uuid(self.account_id),
            balance: Money::new(self.balance, currency),
            is_active: self.is_active,
        }
    }
}

/// Row of the `journal_entries` table
#[derive(Debug, Clone, FromRow)]
pub struct JournalEntryRow {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub source_type: String,
    pub source_id: Uuid,
    pub entry_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub status: String,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub is_balanced: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntryRow {
    pub fn into_domain(self, currency: Currency) -> Result<JournalEntry, DatabaseError> {
        Ok(JournalEntry {
            id: JournalEntryId::from_uuid(self.entry_id),
            entry_number: self.entry_number,
            source_type: SourceType::from_str(&self.source_type)
                .map_err(|e| DatabaseError::decode("journal_entries.source_type", e))?,
            source_id: SourceId::from_uuid(self.source_id),
            entry_date: self.entry_date,
            description: self.description,
            reference: self.reference,
            status: JournalStatus::from_str(&self.status)
                .map_err(|e| DatabaseError::decode("journal_entries.status", e))?,
            total_debit: Money::new(self.total_debit, currency),
            total_credit: Money::new(self.total_credit, currency),
            is_balanced: self.is_balanced,
            posted_at: self.posted_at,
            posted_by: self.posted_by,
            created_at: self.created_at,
        })
    }
}

/// Row of the `journal_lines` table
#[derive(Debug, Clone, FromRow)]
pub struct JournalLineRow {
    pub line_id: Uuid,
    pub entry_id: Uuid,
    pub account_id: Uuid,
    pub account_code: String,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub line_number: i32,
}

impl JournalLineRow {
    pub fn into_domain(self, currency: Currency) -> JournalLine {
        JournalLine {
            id: JournalLineId::from_uuid(self.line_id),
            entry_id: JournalEntryId::from_uuid(self.entry_id),
            account_id: AccountId::from_uuid(self.account_id),
            account_code: self.account_code,
            description: self.description,
            debit: Money::new(self.debit, currency),
            credit: Money::new(self.credit, currency),
            line_number: self.line_number,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LineTotalsRow {
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl From<LineTotalsRow> for LineTotals {
    fn from(row: LineTotalsRow) -> Self {
        LineTotals {
            account_id: AccountId::from_uuid(row.account_id),
            debit: row.debit,
            credit: row.credit,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UnbalancedEntryRow {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

impl From<UnbalancedEntryRow> for UnbalancedEntry {
    fn from(row: UnbalancedEntryRow) -> Self {
        UnbalancedEntry {
            entry_id: JournalEntryId::from_uuid(row.entry_id),
            entry_number: row.entry_number,
            total_debit: row.total_debit,
            total_credit: row.total_credit,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DuplicatePostingRow {
    pub source_type: String,
    pub source_id: Uuid,
    pub entry_count: i64,
}

impl DuplicatePostingRow {
    pub fn into_domain(self) -> Result<DuplicatePosting, DatabaseError> {
        Ok(DuplicatePosting {
            source_type: SourceType::from_str(&self.source_type)
                .map_err(|e| DatabaseError::decode("journal_entries.source_type", e))?,
            source_id: SourceId::from_uuid(self.source_id),
            entry_count: self.entry_count,
        })
    }
}

// ============================================================================
// Accounts
// ============================================================================

pub async fn account_by_code(conn: &mut PgConnection, code: &str) -> Result<Option<AccountRow>, DatabaseError> {
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT account_id, code, name, account_type, category, parent_id,
               is_header, is_active, balance, description
        FROM accounts
        WHERE code = $1
        "#,
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn account_by_id(conn: &mut PgConnection, id: AccountId) -> Result<Option<AccountRow>, DatabaseError> {
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT account_id, code, name, account_type, category, parent_id,
               is_header, is_active, balance, description
        FROM accounts
        WHERE account_id = $1
        "#,
    )
    .bind(Uuid::from(id))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// `SELECT ... FOR UPDATE`; the sort sits below the lock so rows are taken in id order
pub async fn lock_accounts(conn: &mut PgConnection, ids: &[AccountId]) -> Result<Vec<AccountRow>, DatabaseError> {
    let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
    let rows = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT account_id, code, name, account_type, category, parent_id,
               is_header, is_active, balance, description
        FROM accounts
        WHERE account_id = ANY($1)
        ORDER BY account_id
        FOR UPDATE
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn children_of(conn: &mut PgConnection, parent_id: AccountId) -> Result<Vec<AccountRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT account_id, code, name, account_type, category, parent_id,
               is_header, is_active, balance, description
        FROM accounts
        WHERE parent_id = $1
        ORDER BY code
        "#,
    )
    .bind(Uuid::from(parent_id))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn list_accounts(conn: &mut PgConnection) -> Result<Vec<AccountRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT account_id, code, name, account_type, category, parent_id,
               is_header, is_active, balance, description
        FROM accounts
        ORDER BY code
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn insert_account(conn: &mut PgConnection, account: &Account) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (
            account_id, code, name, account_type, category, parent_id,
            is_header, is_active, balance, description
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(Uuid::from(account.id))
    .bind(&account.code)
    .bind(&account.name)
    .bind(account.account_type.as_str())
    .bind(account.category.map(|c| c.as_str()))
    .bind(account.parent_id.map(Uuid::from))
    .bind(account.is_header)
    .bind(account.is_active)
    .bind(account.balance.amount())
    .bind(&account.description)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_account_balance(conn: &mut PgConnection, id: AccountId, balance: Decimal) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = $2, updated_at = NOW()
        WHERE account_id = $1
        "#,
    )
    .bind(Uuid::from(id))
    .bind(balance)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("account", id));
    }
    Ok(())
}

// ============================================================================
// Cash/bank registers
// ============================================================================

pub async fn cash_bank_by_id(conn: &mut PgConnection, id: CashBankId) -> Result<Option<CashBankRow>, DatabaseError> {
    let row = sqlx::query_as::<_, CashBankRow>(
        r#"
        SELECT cash_bank_id, code, name, account_id, balance, is_active
        FROM cash_bank_accounts
        WHERE cash_bank_id = $1
        "#,
    )
    .bind(Uuid::from(id))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn cash_bank_for_account(conn: &mut PgConnection, account_id: AccountId) -> Result<Option<CashBankRow>, DatabaseError> {
    let row = sqlx::query_as::<_, CashBankRow>(
        r#"
        SELECT cash_bank_id, code, name, account_id, balance, is_active
        FROM cash_bank_accounts
        WHERE account_id = $1
        ORDER BY code
        LIMIT 1
        "#,
    )
    .bind(Uuid::from(account_id))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn list_cash_banks(conn: &mut PgConnection) -> Result<Vec<CashBankRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, CashBankRow>(
        r#"
        SELECT cash_bank_id, code, name, account_id, balance, is_active
        FROM cash_bank_accounts
        ORDER BY code
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn insert_cash_bank(conn: &mut PgConnection, register: &CashBankAccount) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO cash_bank_accounts (cash_bank_id, code, name, account_id, balance, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::from(register.id))
    .bind(&register.code)
    .bind(&register.name)
    .bind(Uuid::from(register.account_id))
    .bind(register.balance.amount())
    .bind(register.is_active)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_cash_bank_balance(conn: &mut PgConnection, id: CashBankId, balance: Decimal) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE cash_bank_accounts
        SET balance = $2, updated_at = NOW()
        WHERE cash_bank_id = $1
        "#,
    )
    .bind(Uuid::from(id))
    .bind(balance)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("cash/bank account", id));
    }
    Ok(())
}

pub async fn insert_cash_bank_transaction(
    conn: &mut PgConnection,
    cash_bank_id: CashBankId,
    transaction_date: NaiveDate,
    amount: Decimal,
    description: Option<&str>,
) -> Result<Uuid, DatabaseError> {
    let transaction_id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO cash_bank_transactions (transaction_id, cash_bank_id, transaction_date, amount, description)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(transaction_id)
    .bind(Uuid::from(cash_bank_id))
    .bind(transaction_date)
    .bind(amount)
    .bind(description)
    .execute(&mut *conn)
    .await?;
    Ok(transaction_id)
}

pub async fn subledger_transaction_sum(conn: &mut PgConnection, cash_bank_id: CashBankId) -> Result<Decimal, DatabaseError> {
    let sum = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM cash_bank_transactions
        WHERE cash_bank_id = $1
        "#,
    )
    .bind(Uuid::from(cash_bank_id))
    .fetch_one(&mut *conn)
    .await?;
    Ok(sum)
}

// ============================================================================
// Journal
// ============================================================================

/// Entry for a source document; a posted entry wins over a leftover draft
pub async fn entry_by_source(
    conn: &mut PgConnection,
    source_type: SourceType,
    source_id: SourceId,
) -> Result<Option<JournalEntryRow>, DatabaseError> {
    let row = sqlx::query_as::<_, JournalEntryRow>(
        r#"
        SELECT entry_id, entry_number, source_type, source_id, entry_date, description,
               reference, status, total_debit, total_credit, is_balanced,
               posted_at, posted_by, created_at
        FROM journal_entries
        WHERE source_type = $1 AND source_id = $2
        ORDER BY (status = 'POSTED') DESC, created_at
        LIMIT 1
        "#,
    )
    .bind(source_type.as_str())
    .bind(Uuid::from(source_id))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn insert_entry(conn: &mut PgConnection, entry: &JournalEntry) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO journal_entries (
            entry_id, entry_number, source_type, source_id, entry_date, description,
            reference, status, total_debit, total_credit, is_balanced,
            posted_at, posted_by, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(Uuid::from(entry.id))
    .bind(&entry.entry_number)
    .bind(entry.source_type.as_str())
    .bind(Uuid::from(entry.source_id))
    .bind(entry.entry_date)
    .bind(&entry.description)
    .bind(&entry.reference)
    .bind(entry.status.as_str())
    .bind(entry.total_debit.amount())
    .bind(entry.total_credit.amount())
    .bind(entry.is_balanced)
    .bind(entry.posted_at)
    .bind(&entry.posted_by)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_line(conn: &mut PgConnection, line: &JournalLine) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO journal_lines (
            line_id, entry_id, account_id, account_code, description, debit, credit, line_number
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::from(line.id))
    .bind(Uuid::from(line.entry_id))
    .bind(Uuid::from(line.account_id))
    .bind(&line.account_code)
    .bind(&line.description)
    .bind(line.debit.amount())
    .bind(line.credit.amount())
    .bind(line.line_number)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn mark_posted(
    conn: &mut PgConnection,
    entry_id: JournalEntryId,
    posted_at: DateTime<Utc>,
    posted_by: &str,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE journal_entries
        SET status = 'POSTED', posted_at = $2, posted_by = $3
        WHERE entry_id = $1
        "#,
    )
    .bind(Uuid::from(entry_id))
    .bind(posted_at)
    .bind(posted_by)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("journal entry", entry_id));
    }
    Ok(())
}

pub async fn lines_for_entry(conn: &mut PgConnection, entry_id: JournalEntryId) -> Result<Vec<JournalLineRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, JournalLineRow>(
        r#"
        SELECT line_id, entry_id, account_id, account_code, description, debit, credit, line_number
        FROM journal_lines
        WHERE entry_id = $1
        ORDER BY line_number
        "#,
    )
    .bind(Uuid::from(entry_id))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn delete_lines(conn: &mut PgConnection, entry_id: JournalEntryId) -> Result<u64, DatabaseError> {
    let result = sqlx::query("DELETE FROM journal_lines WHERE entry_id = $1")
        .bind(Uuid::from(entry_id))
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_entry(conn: &mut PgConnection, entry_id: JournalEntryId) -> Result<(), DatabaseError> {
    sqlx::query("DELETE FROM journal_entries WHERE entry_id = $1")
        .bind(Uuid::from(entry_id))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Posted debit and credit totals for every account that has any line
pub async fn posted_line_totals(conn: &mut PgConnection) -> Result<Vec<LineTotalsRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, LineTotalsRow>(
        r#"
        SELECT l.account_id,
               COALESCE(SUM(l.debit) FILTER (WHERE e.status = 'POSTED'), 0) AS debit,
               COALESCE(SUM(l.credit) FILTER (WHERE e.status = 'POSTED'), 0) AS credit
        FROM journal_lines l
        JOIN journal_entries e ON e.entry_id = l.entry_id
        GROUP BY l.account_id
        ORDER BY l.account_id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn posted_totals_for(conn: &mut PgConnection, account_id: AccountId) -> Result<LineTotalsRow, DatabaseError> {
    let id = Uuid::from(account_id);
    let row = sqlx::query_as::<_, LineTotalsRow>(
        r#"
        SELECT $1::uuid AS account_id,
               COALESCE(SUM(l.debit), 0) AS debit,
               COALESCE(SUM(l.credit), 0) AS credit
        FROM journal_lines l
        JOIN journal_entries e ON e.entry_id = l.entry_id
        WHERE l.account_id = $1 AND e.status = 'POSTED'
        "#,
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Posted entries whose header totals or line sums disagree
pub async fn unbalanced_posted_entries(conn: &mut PgConnection) -> Result<Vec<UnbalancedEntryRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, UnbalancedEntryRow>(
        r#"
        SELECT e.entry_id, e.entry_number,
               COALESCE(SUM(l.debit), 0) AS total_debit,
               COALESCE(SUM(l.credit), 0) AS total_credit
        FROM journal_entries e
        LEFT JOIN journal_lines l ON l.entry_id = e.entry_id
        WHERE e.status = 'POSTED'
        GROUP BY e.entry_id, e.entry_number, e.total_debit, e.total_credit
        HAVING COALESCE(SUM(l.debit), 0) <> COALESCE(SUM(l.credit), 0)
            OR e.total_debit <> e.total_credit
        ORDER BY e.entry_number
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn duplicate_posted_sources(conn: &mut PgConnection) -> Result<Vec<DuplicatePostingRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, DuplicatePostingRow>(
        r#"
        SELECT source_type, source_id, COUNT(*) AS entry_count
        FROM journal_entries
        WHERE status = 'POSTED'
        GROUP BY source_type, source_id
        HAVING COUNT(*) > 1
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account_row(account_type: &str, category: Option<&str>) -> AccountRow {
        AccountRow {
            account_id: Uuid::new_v4(),
            code: "1101".into(),
            name: "CASH".into(),
            account_type: account_type.into(),
            category: category.map(str::to_string),
            parent_id: None,
            is_header: false,
            is_active: true,
            balance: dec!(1500.25),
            description: None,
        }
    }

    #[test]
    fn test_account_row_decodes() {
        let account = account_row("ASSET", Some("CURRENT_ASSET"))
            .into_domain(Currency::IDR)
            .unwrap();
        assert_eq!(account.account_type, AccountType::Asset);
        assert_eq!(account.category, Some(AccountCategory::CurrentAsset));
        assert_eq!(account.balance, Money::new(dec!(1500.25), Currency::IDR));
    }

    #[test]
    fn test_unknown_account_type_is_decode_error() {
        let err = account_row("CONTRA", None).into_domain(Currency::IDR).unwrap_err();
        assert!(matches!(err, DatabaseError::Decode { ref column, .. } if column == "accounts.account_type"));
    }

    #[test]
    fn test_entry_row_decodes_status() {
        let row = JournalEntryRow {
            entry_id: Uuid::new_v4(),
            entry_number: "SALE-0A1B2C3D-1735689600".into(),
            source_type: "SALES_PAYMENT".into(),
            source_id: Uuid::new_v4(),
            entry_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            description: "Payment received".into(),
            reference: None,
            status: "POSTED".into(),
            total_debit: dec!(10),
            total_credit: dec!(10),
            is_balanced: true,
            posted_at: Some(Utc::now()),
            posted_by: Some("system".into()),
            created_at: Utc::now(),
        };
        let entry = row.into_domain(Currency::IDR).unwrap();
        assert_eq!(entry.source_type, SourceType::SalesPayment);
        assert!(entry.is_posted());
    }
}
