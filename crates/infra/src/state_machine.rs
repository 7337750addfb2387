//! Wallet lifecycle and balance transitions against a [`LedgerStore`].
//!
//! `Uninitialized -> Enabled <-> Disabled`. Status changes are optimistic
//! (conditional on the stored status); money moves only through the
//! [`IdempotencyGuard`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use walletd_core::{OwnerId, WalletError, WalletId, WalletResult, clock};
use walletd_wallet::{
    Amount, Direction, ReferenceId, StatusTransition, Transaction, Wallet, WalletStatus,
    derive_balance,
};

use crate::idempotency::{IdempotencyGuard, PostingRequest};
use crate::ledger_store::{LedgerStore, LedgerStoreError};

/// Cached balance compared with the balance implied by the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub wallet_id: WalletId,
    pub cached: i64,
    pub derived: i128,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        i128::from(self.cached) == self.derived
    }
}

#[derive(Debug, Clone)]
pub struct WalletStateMachine<S> {
    store: S,
    guard: IdempotencyGuard<S>,
}

impl<S> WalletStateMachine<S>
where
    S: LedgerStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            guard: IdempotencyGuard::new(store.clone()),
            store,
        }
    }

    /// Open an enabled, empty wallet for an owner that has none.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn init(&self, owner_id: OwnerId) -> WalletResult<Wallet> {
        let wallet = self.store.create_wallet(Wallet::open(owner_id, clock::now())).await?;
        info!(wallet_id = %wallet.id, "wallet initialized");
        Ok(wallet)
    }

    /// `Disabled -> Enabled`. Anything else, including an unknown id, is `AlreadyEnabled`.
    pub async fn enable(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.transition(wallet_id, StatusTransition::enable()).await
    }

    /// `Enabled -> Disabled`. Anything else, including an unknown id, is `AlreadyDisabled`.
    pub async fn disable(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.transition(wallet_id, StatusTransition::disable()).await
    }

    #[instrument(skip(self, transition), fields(wallet_id = %wallet_id, to = %transition.to))]
    async fn transition(&self, wallet_id: WalletId, transition: StatusTransition) -> WalletResult<Wallet> {
        match self.store.update_status(wallet_id, transition, clock::now()).await {
            Ok(wallet) => {
                info!("wallet status changed");
                Ok(wallet)
            }
            Err(LedgerStoreError::PreconditionFailed(_)) => Err(transition.precondition_error()),
            Err(other) => Err(other.into()),
        }
    }

    /// The owner's wallet, which must be enabled (`Disabled` otherwise).
    pub async fn fetch(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        self.fetch_in(owner_id, WalletStatus::Enabled).await
    }

    /// The owner's wallet, which must be disabled (`AlreadyEnabled` otherwise).
    pub async fn fetch_disabled(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        self.fetch_in(owner_id, WalletStatus::Disabled).await
    }

    /// The owner's wallet in whatever status it is.
    pub async fn fetch_any(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        Ok(self.store.get_wallet(owner_id).await?)
    }

    async fn fetch_in(&self, owner_id: &OwnerId, required: WalletStatus) -> WalletResult<Wallet> {
        let wallet = self.store.get_wallet(owner_id).await?;
        wallet.require(required)?;
        Ok(wallet)
    }

    pub async fn get_by_id(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        Ok(self.store.get_wallet_by_id(wallet_id).await?)
    }

    pub async fn deposit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference_id: ReferenceId,
        actor: OwnerId,
    ) -> WalletResult<Transaction> {
        self.guard
            .apply(PostingRequest {
                wallet_id,
                reference_id,
                direction: Direction::Deposit,
                amount,
                actor,
            })
            .await
    }

    /// Withdraw `amount`. Overdrawing records a `Failed` row and reports `InsufficientFunds`.
    pub async fn withdraw(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference_id: ReferenceId,
        actor: OwnerId,
    ) -> WalletResult<Transaction> {
        self.guard
            .apply(PostingRequest {
                wallet_id,
                reference_id,
                direction: Direction::Withdraw,
                amount,
                actor,
            })
            .await
    }

    /// Wallets created strictly after `after`, oldest first.
    pub async fn list_after(&self, after: Option<DateTime<Utc>>, limit: usize) -> WalletResult<Vec<Wallet>> {
        Ok(self.store.list_wallets_after(after, limit).await?)
    }

    /// Recompute the balance from the log and compare it with the cached one.
    #[instrument(skip(self), fields(wallet_id = %wallet_id))]
    pub async fn reconcile(&self, wallet_id: WalletId) -> WalletResult<Reconciliation> {
        let wallet = self.store.get_wallet_by_id(wallet_id).await?;
        let log = self.store.list_transactions(wallet_id).await?;

        let report = Reconciliation {
            wallet_id,
            cached: wallet.balance,
            derived: derive_balance(&log),
        };
        if !report.is_consistent() {
            warn!(cached = report.cached, derived = %report.derived, "wallet balance diverged from its ledger");
        }
        Ok(report)
    }
}
