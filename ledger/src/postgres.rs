//! PostgreSQL storage backend.
//!
//! `commit` runs the conditional balance update and the ledger insert inside
//! one database transaction. The update only matches while the stored balance
//! equals the expected one, so a writer in another process holding a stale
//! read gets `Conflict` instead of overwriting a newer balance.
//!
//! ## Error Mapping
//!
//! | Failure | WalletError |
//! |---------|-------------|
//! | Conditional update matched no row, account exists | `Conflict` |
//! | Conditional update matched no row, account missing | `AccountNotFound` |
//! | Any other SQLx error | `Storage` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use wallet_common::{AccountId, EntryId, Result, WalletError};

use crate::account::Account;
use crate::journal::{CommitBatch, LedgerEntry, NewEntry};
use crate::query::PageRequest;
use crate::store::{AccountStore, LedgerStore, Storage};

/// Schema statements, applied in order by [`PgStorage::migrate`].
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS wallets (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL CHECK (length(name) > 0),
        balance     NUMERIC(28, 4) NOT NULL CHECK (balance >= 0),
        created_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        sequence           BIGSERIAL PRIMARY KEY,
        id                 UUID NOT NULL UNIQUE,
        wallet_id          UUID NOT NULL REFERENCES wallets (id),
        amount             NUMERIC(28, 4) NOT NULL,
        resulting_balance  NUMERIC(28, 4) NOT NULL CHECK (resulting_balance >= 0),
        description        TEXT NOT NULL CHECK (length(description) > 0),
        kind               TEXT NOT NULL CHECK (kind IN ('CREDIT', 'DEBIT')),
        occurred_at        TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ledger_entries_wallet_sequence_idx
        ON ledger_entries (wallet_id, sequence)
    "#,
];

const ENTRY_COLUMNS: &str =
    "id, wallet_id, sequence, amount, resulting_balance, description, occurred_at";

/// PostgreSQL-backed account and ledger storage.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and verify it answers.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| map_sqlx_error("validate_connection", e))?;

        info!(max_connections, "Database pool connected");
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if missing.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStorage {
    async fn create(&self, name: &str, initial_balance: Decimal) -> Result<Account> {
        let account = Account::new(name, initial_balance)?;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        insert_account(&mut conn, &account).await?;
        Ok(account)
    }

    async fn get(&self, id: &AccountId) -> Result<Account> {
        let row = sqlx::query("SELECT id, name, balance, created_at FROM wallets WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_account", e))?;

        match row {
            Some(row) => account_from_row(&row),
            None => Err(WalletError::AccountNotFound(*id)),
        }
    }

    async fn compare_and_set_balance(
        &self,
        id: &AccountId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<Account> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        update_balance(&mut conn, id, expected, new).await
    }
}

#[async_trait]
impl LedgerStore for PgStorage {
    async fn append(&self, entry: NewEntry) -> Result<LedgerEntry> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        insert_entry(&mut conn, entry).await
    }

    #[instrument(skip(self, account_id), fields(account_id = %account_id), err)]
    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: &PageRequest,
    ) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE wallet_id = $1 \
             ORDER BY {} OFFSET $2 LIMIT $3",
            page.order_by_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(account_id.as_uuid())
            .bind(i64::try_from(page.skip).unwrap_or(i64::MAX))
            .bind(i64::from(page.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_by_account", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn history(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE wallet_id = $1 ORDER BY sequence ASC"
        );

        let rows = sqlx::query(&sql)
            .bind(account_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter().map(entry_from_row).collect()
    }
}

#[async_trait]
impl Storage for PgStorage {
    #[instrument(skip(self), err)]
    async fn open(&self, name: &str, initial_balance: Decimal) -> Result<(Account, LedgerEntry)> {
        let account = Account::new(name, initial_balance)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        insert_account(&mut tx, &account).await?;
        let entry = insert_entry(&mut tx, NewEntry::opening(account.id, account.balance)).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok((account, entry))
    }

    #[instrument(skip(self, batch), fields(account_id = %batch.account_id()), err)]
    async fn commit(&self, batch: CommitBatch) -> Result<(Account, LedgerEntry)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Dropping `tx` on any early return rolls both writes back.
        let account = update_balance(
            &mut tx,
            &batch.account_id(),
            batch.expected_balance,
            batch.new_balance(),
        )
        .await?;
        let entry = insert_entry(&mut tx, batch.entry).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok((account, entry))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

async fn insert_account(conn: &mut PgConnection, account: &Account) -> Result<()> {
    sqlx::query("INSERT INTO wallets (id, name, balance, created_at) VALUES ($1, $2, $3, $4)")
        .bind(account.id.as_uuid())
        .bind(&account.name)
        .bind(account.balance)
        .bind(account.created_at)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
    Ok(())
}

async fn update_balance(
    conn: &mut PgConnection,
    id: &AccountId,
    expected: Decimal,
    new: Decimal,
) -> Result<Account> {
    let row = sqlx::query(
        r#"
        UPDATE wallets SET balance = $3
        WHERE id = $1 AND balance = $2
        RETURNING id, name, balance, created_at
        "#,
    )
    .bind(id.as_uuid())
    .bind(expected)
    .bind(new)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("update_balance", e))?;

    if let Some(row) = row {
        return account_from_row(&row);
    }

    let exists = sqlx::query("SELECT 1 FROM wallets WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("update_balance", e))?
        .is_some();

    if exists {
        Err(WalletError::conflict(
            *id,
            format!("balance no longer {expected}"),
        ))
    } else {
        Err(WalletError::AccountNotFound(*id))
    }
}

async fn insert_entry(conn: &mut PgConnection, entry: NewEntry) -> Result<LedgerEntry> {
    let id = EntryId::new();
    let kind = crate::journal::EntryKind::from_amount(entry.amount);

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO ledger_entries
            (id, wallet_id, amount, resulting_balance, description, kind, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(id.as_uuid())
    .bind(entry.account_id.as_uuid())
    .bind(entry.amount)
    .bind(entry.resulting_balance)
    .bind(&entry.description)
    .bind(kind.as_str())
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_entry", e))?;

    entry_from_row(&row)
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let decode = |e| map_sqlx_error("decode_account", e);
    Ok(Account {
        id: AccountId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        balance: row.try_get("balance").map_err(decode)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let decode = |e| map_sqlx_error("decode_entry", e);
    let sequence: i64 = row.try_get("sequence").map_err(decode)?;
    Ok(LedgerEntry {
        id: EntryId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("wallet_id").map_err(decode)?),
        sequence: u64::try_from(sequence).unwrap_or_default(),
        amount: row.try_get("amount").map_err(decode)?,
        resulting_balance: row.try_get("resulting_balance").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, error: sqlx::Error) -> WalletError {
    WalletError::Storage(format!("{operation}: {error}"))
}
