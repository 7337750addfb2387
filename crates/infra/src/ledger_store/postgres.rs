//! Postgres-backed ledger store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerStoreError | Scenario |
//! |------------|----------------------|------------------|----------|
//! | Database (unique violation) | `23505` | `AlreadyExists` | Second wallet for an owner |
//! | Database (check constraint violation) | `23514` | `Backend` | Negative balance or amount slipped through |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! A unique violation on `wallet_transactions.reference_id` is resolved into
//! `DuplicateReference` by re-reading the recorded row.
//!
//! ## Locking
//!
//! `create_wallet` holds a transaction-scoped advisory lock and stamps
//! `created_at` at least one microsecond after the newest wallet, matching
//! the in-memory store, so `created_at` cursors never skip a row.
//!
//! `apply_entry` takes `SELECT ... FOR UPDATE` on the wallet row, so entries
//! for one wallet serialize on the database; the expected-balance check then
//! detects plans computed from a stale read.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{Span, instrument};

use walletd_core::{OwnerId, TransactionId, WalletId};
use walletd_wallet::{
    Amount, Direction, ReferenceId, StatusTransition, Transaction, TransactionStatus, Wallet,
    WalletStatus,
};

use super::r#trait::{LedgerEntry, LedgerStore, LedgerStoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    id          UUID PRIMARY KEY,
    owner_id    TEXT NOT NULL UNIQUE,
    status      TEXT NOT NULL CHECK (status IN ('enabled', 'disabled')),
    balance     BIGINT NOT NULL CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS wallets_created_at_idx ON wallets (created_at);

CREATE TABLE IF NOT EXISTS wallet_transactions (
    id             UUID PRIMARY KEY,
    reference_id   TEXT NOT NULL UNIQUE,
    wallet_id      UUID NOT NULL REFERENCES wallets (id),
    direction      TEXT NOT NULL CHECK (direction IN ('deposit', 'withdraw')),
    amount         BIGINT NOT NULL CHECK (amount > 0),
    status         TEXT NOT NULL CHECK (status IN ('success', 'failed')),
    balance_after  BIGINT NOT NULL,
    actor          TEXT NOT NULL,
    created_at     TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS wallet_transactions_wallet_idx
    ON wallet_transactions (wallet_id, created_at);
"#;

/// Advisory lock key held while a wallet row is inserted.
const WALLET_CREATION_LOCK: i64 = 0x7761_6c6c_6574;

const WALLET_COLUMNS: &str = "id, owner_id, status, balance, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, reference_id, wallet_id, direction, amount, status, balance_after, actor, created_at";

/// Postgres-backed ledger store.
///
/// `Send + Sync`; all access goes through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), LedgerStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self, wallet), fields(owner_id = %wallet.owner_id, wallet_id = %wallet.id), err)]
    async fn create_wallet(&self, mut wallet: Wallet) -> Result<Wallet, LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Creations serialize so `created_at` is strictly increasing and
        // cursor pages never split two wallets sharing a microsecond.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(WALLET_CREATION_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_wallet_creation", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO wallets (id, owner_id, status, balance, created_at, updated_at)
            SELECT $1, $2, $3, $4, stamp, stamp
            FROM (
                SELECT GREATEST(
                    $5::timestamptz,
                    (SELECT max(created_at) FROM wallets) + interval '1 microsecond'
                ) AS stamp
            ) AS next
            RETURNING created_at
            "#,
        )
        .bind(wallet.id.as_uuid())
        .bind(wallet.owner_id.as_str())
        .bind(wallet.status.as_str())
        .bind(wallet.balance)
        .bind(wallet.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerStoreError::AlreadyExists(format!("wallet for owner {}", wallet.owner_id))
            } else {
                map_sqlx_error("create_wallet", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        wallet.created_at = read(&row, "created_at")?;
        wallet.updated_at = wallet.created_at;
        Ok(wallet)
    }

    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn get_wallet(&self, owner_id: &OwnerId) -> Result<Wallet, LedgerStoreError> {
        let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE owner_id = $1");
        let row = sqlx::query(&sql)
            .bind(owner_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_wallet", e))?
            .ok_or_else(|| LedgerStoreError::NotFound(format!("wallet for owner {owner_id}")))?;

        wallet_from_row(&row)
    }

    #[instrument(skip(self), fields(wallet_id = %wallet_id), err)]
    async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Wallet, LedgerStoreError> {
        let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(wallet_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_wallet_by_id", e))?
            .ok_or_else(|| LedgerStoreError::NotFound(format!("wallet {wallet_id}")))?;

        wallet_from_row(&row)
    }

    #[instrument(skip(self, transition), fields(wallet_id = %wallet_id, to = %transition.to), err)]
    async fn update_status(
        &self,
        wallet_id: WalletId,
        transition: StatusTransition,
        now: DateTime<Utc>,
    ) -> Result<Wallet, LedgerStoreError> {
        let sql = format!(
            "UPDATE wallets SET status = $1, updated_at = $2 \
             WHERE id = $3 AND status = $4 \
             RETURNING {WALLET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(transition.to.as_str())
            .bind(now)
            .bind(wallet_id.as_uuid())
            .bind(transition.from.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_status", e))?
            .ok_or_else(|| {
                LedgerStoreError::PreconditionFailed(format!(
                    "wallet {wallet_id} is not {}",
                    transition.from
                ))
            })?;

        wallet_from_row(&row)
    }

    #[instrument(
        skip(self, entry),
        fields(
            wallet_id = %entry.wallet_id,
            reference_id = %entry.reference_id,
            direction = entry.direction().as_str(),
            amount = entry.amount().get(),
            status = tracing::field::Empty
        ),
        err
    )]
    async fn apply_entry(&self, entry: LedgerEntry) -> Result<Transaction, LedgerStoreError> {
        let span = Span::current();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE reference_id = $1");
        let existing = sqlx::query(&sql)
            .bind(entry.reference_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_reference", e))?;
        if let Some(row) = existing {
            let recorded = transaction_from_row(&row)?;
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::DuplicateReference(Box::new(recorded)));
        }

        let row = sqlx::query("SELECT status, balance FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(entry.wallet_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_wallet", e))?
            .ok_or_else(|| LedgerStoreError::NotFound(format!("wallet {}", entry.wallet_id)))?;

        let status: String = read(&row, "status")?;
        let balance: i64 = read(&row, "balance")?;

        if status != WalletStatus::Enabled.as_str() {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::PreconditionFailed(format!(
                "wallet {} is not enabled",
                entry.wallet_id
            )));
        }
        if balance != entry.posting.expected_balance {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::Conflict(format!(
                "wallet {} balance is {balance}, expected {}",
                entry.wallet_id, entry.posting.expected_balance
            )));
        }

        if let Some(next) = entry.posting.new_balance {
            sqlx::query("UPDATE wallets SET balance = $1, updated_at = $2 WHERE id = $3")
                .bind(next)
                .bind(entry.recorded_at)
                .bind(entry.wallet_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_balance", e))?;
        }

        let recorded = Transaction {
            id: TransactionId::new(),
            reference_id: entry.reference_id.clone(),
            wallet_id: entry.wallet_id,
            direction: entry.direction(),
            amount: entry.amount(),
            status: entry.status(),
            balance_after: entry.posting.balance_after(),
            actor: entry.actor.clone(),
            created_at: entry.recorded_at,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, reference_id, wallet_id, direction, amount, status, balance_after, actor, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(recorded.id.as_uuid())
        .bind(recorded.reference_id.as_str())
        .bind(recorded.wallet_id.as_uuid())
        .bind(recorded.direction.as_str())
        .bind(recorded.amount.get())
        .bind(recorded.status.as_str())
        .bind(recorded.balance_after)
        .bind(recorded.actor.as_str())
        .bind(recorded.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                // A concurrent insert won the reference id between our check and insert.
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                let winner = self.find_transaction(&entry.reference_id).await?.ok_or_else(|| {
                    LedgerStoreError::Backend(format!(
                        "reference id {} vanished after unique violation",
                        entry.reference_id
                    ))
                })?;
                return Err(LedgerStoreError::DuplicateReference(Box::new(winner)));
            }
            Err(e) => return Err(map_sqlx_error("insert_transaction", e)),
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        span.record("status", recorded.status.as_str());
        Ok(recorded)
    }

    #[instrument(skip(self), fields(reference_id = %reference_id), err)]
    async fn find_transaction(
        &self,
        reference_id: &ReferenceId,
    ) -> Result<Option<Transaction>, LedgerStoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE reference_id = $1");
        let row = sqlx::query(&sql)
            .bind(reference_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_transaction", e))?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    #[instrument(skip(self), fields(wallet_id = %wallet_id), err)]
    async fn list_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, LedgerStoreError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions \
             WHERE wallet_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(wallet_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_transactions", e))?;

        rows.iter().map(transaction_from_row).collect()
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn list_wallets_after(
        &self,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Wallet>, LedgerStoreError> {
        let span = Span::current();

        let sql = format!(
            "SELECT {WALLET_COLUMNS} FROM wallets \
             WHERE ($1::timestamptz IS NULL OR created_at > $1) \
             ORDER BY created_at ASC, id ASC \
             LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(after)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_wallets_after", e))?;

        span.record("row_count", rows.len());
        rows.iter().map(wallet_from_row).collect()
    }
}

fn read<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T, LedgerStoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| LedgerStoreError::Backend(format!("failed to read {column}: {e}")))
}

fn wallet_from_row(row: &sqlx::postgres::PgRow) -> Result<Wallet, LedgerStoreError> {
    let status: String = read(row, "status")?;
    let owner_id: String = read(row, "owner_id")?;

    Ok(Wallet {
        id: WalletId::from_uuid(read(row, "id")?),
        owner_id: OwnerId::parse(owner_id)
            .map_err(|e| LedgerStoreError::Backend(format!("stored owner_id: {e}")))?,
        status: WalletStatus::parse(&status)
            .ok_or_else(|| LedgerStoreError::Backend(format!("unknown wallet status {status:?}")))?,
        balance: read(row, "balance")?,
        created_at: read(row, "created_at")?,
        updated_at: read(row, "updated_at")?,
    })
}

fn transaction_from_row(row: &sqlx::postgres::PgRow) -> Result<Transaction, LedgerStoreError> {
    let reference_id: String = read(row, "reference_id")?;
    let direction: String = read(row, "direction")?;
    let status: String = read(row, "status")?;
    let actor: String = read(row, "actor")?;

    Ok(Transaction {
        id: TransactionId::from_uuid(read(row, "id")?),
        reference_id: ReferenceId::new(reference_id)
            .map_err(|e| LedgerStoreError::Backend(format!("stored reference_id: {e}")))?,
        wallet_id: WalletId::from_uuid(read(row, "wallet_id")?),
        direction: Direction::parse(&direction)
            .ok_or_else(|| LedgerStoreError::Backend(format!("unknown direction {direction:?}")))?,
        amount: Amount::new(read(row, "amount")?)
            .map_err(|e| LedgerStoreError::Backend(format!("stored amount: {e}")))?,
        status: TransactionStatus::parse(&status)
            .ok_or_else(|| LedgerStoreError::Backend(format!("unknown transaction status {status:?}")))?,
        balance_after: read(row, "balance_after")?,
        actor: OwnerId::parse(actor)
            .map_err(|e| LedgerStoreError::Backend(format!("stored actor: {e}")))?,
        created_at: read(row, "created_at")?,
    })
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

/// Map SQLx errors to LedgerStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => LedgerStoreError::AlreadyExists(msg),
                _ => LedgerStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerStoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => LedgerStoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
