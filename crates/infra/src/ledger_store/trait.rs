use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use walletd_core::{OwnerId, WalletError, WalletId};
use walletd_wallet::{
    Amount, Direction, Posting, ReferenceId, StatusTransition, Transaction, TransactionStatus,
    Wallet,
};

/// A balance change plus its ledger row, applied as one unit.
///
/// The store assigns the transaction id and its `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub wallet_id: WalletId,
    pub reference_id: ReferenceId,
    pub actor: OwnerId,
    pub posting: Posting,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn direction(&self) -> Direction {
        self.posting.direction
    }

    pub fn amount(&self) -> Amount {
        self.posting.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.posting.status
    }
}

/// Ledger store operation error.
///
/// Infrastructure-level outcomes; the state machine decides which
/// [`WalletError`] each one means for its caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerStoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A conditional status change or entry found the wallet in the wrong status.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The expected balance no longer matches (lost compare-and-swap).
    #[error("balance changed concurrently: {0}")]
    Conflict(String),

    /// The reference id is already recorded; carries the recorded row.
    #[error("reference id already recorded")]
    DuplicateReference(Box<Transaction>),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<LedgerStoreError> for WalletError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::NotFound(msg) => WalletError::not_found(msg),
            LedgerStoreError::AlreadyExists(msg) => WalletError::already_exists(msg),
            LedgerStoreError::PreconditionFailed(msg) | LedgerStoreError::Conflict(msg) => {
                WalletError::conflict(msg)
            }
            LedgerStoreError::DuplicateReference(tx) => WalletError::conflict(format!(
                "reference id {} already recorded",
                tx.reference_id
            )),
            LedgerStoreError::Backend(msg) => WalletError::internal(msg),
        }
    }
}

/// Durable storage for wallets and their transaction log.
///
/// ## Atomicity
///
/// [`LedgerStore::apply_entry`] is the only way money moves. Implementations
/// must, as one indivisible step:
/// 1. reject a reference id that is already recorded (returning that row)
/// 2. check the wallet is `Enabled` and still holds `posting.expected_balance`
/// 3. write `posting.new_balance` when present
/// 4. append the transaction row
///
/// A balance never changes without its row and a row never lands without its
/// balance change.
///
/// ## Ordering
///
/// `created_at` on wallets is the paging key. `list_wallets_after` returns
/// wallets strictly after the given instant, oldest first.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a freshly opened wallet. Fails with `AlreadyExists` when the owner already has one.
    async fn create_wallet(&self, wallet: Wallet) -> Result<Wallet, LedgerStoreError>;

    /// The owner's wallet in any status.
    async fn get_wallet(&self, owner_id: &OwnerId) -> Result<Wallet, LedgerStoreError>;

    async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Wallet, LedgerStoreError>;

    /// Move `transition.from -> transition.to`, only if the stored status is still `from`.
    ///
    /// Unknown wallets also fail the precondition.
    async fn update_status(
        &self,
        wallet_id: WalletId,
        transition: StatusTransition,
        now: DateTime<Utc>,
    ) -> Result<Wallet, LedgerStoreError>;

    async fn apply_entry(&self, entry: LedgerEntry) -> Result<Transaction, LedgerStoreError>;

    async fn find_transaction(
        &self,
        reference_id: &ReferenceId,
    ) -> Result<Option<Transaction>, LedgerStoreError>;

    /// A wallet's full log in recording order.
    async fn list_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, LedgerStoreError>;

    async fn list_wallets_after(
        &self,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Wallet>, LedgerStoreError>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn create_wallet(&self, wallet: Wallet) -> Result<Wallet, LedgerStoreError> {
        (**self).create_wallet(wallet).await
    }

    async fn get_wallet(&self, owner_id: &OwnerId) -> Result<Wallet, LedgerStoreError> {
        (**self).get_wallet(owner_id).await
    }

    async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Wallet, LedgerStoreError> {
        (**self).get_wallet_by_id(wallet_id).await
    }

    async fn update_status(
        &self,
        wallet_id: WalletId,
        transition: StatusTransition,
        now: DateTime<Utc>,
    ) -> Result<Wallet, LedgerStoreError> {
        (**self).update_status(wallet_id, transition, now).await
    }

    async fn apply_entry(&self, entry: LedgerEntry) -> Result<Transaction, LedgerStoreError> {
        (**self).apply_entry(entry).await
    }

    async fn find_transaction(
        &self,
        reference_id: &ReferenceId,
    ) -> Result<Option<Transaction>, LedgerStoreError> {
        (**self).find_transaction(reference_id).await
    }

    async fn list_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, LedgerStoreError> {
        (**self).list_transactions(wallet_id).await
    }

    async fn list_wallets_after(
        &self,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Wallet>, LedgerStoreError> {
        (**self).list_wallets_after(after, limit).await
    }
}
