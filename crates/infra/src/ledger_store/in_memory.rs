use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};

use walletd_core::{OwnerId, TransactionId, WalletId};
use walletd_wallet::{ReferenceId, StatusTransition, Transaction, Wallet, WalletStatus};

use super::r#trait::{LedgerEntry, LedgerStore, LedgerStoreError};

#[derive(Debug, Default)]
struct LedgerState {
    wallets: HashMap<WalletId, Wallet>,
    by_owner: HashMap<OwnerId, WalletId>,
    transactions: Vec<Transaction>,
    by_reference: HashMap<ReferenceId, usize>,
    last_created_at: Option<DateTime<Utc>>,
}

impl LedgerState {
    /// Next wallet creation time, strictly after every earlier one.
    fn next_created_at(&mut self, proposed: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self.last_created_at {
            Some(last) if proposed <= last => last + TimeDelta::microseconds(1),
            _ => proposed,
        };
        self.last_created_at = Some(next);
        next
    }

    fn wallet_mut(&mut self, wallet_id: WalletId) -> Result<&mut Wallet, LedgerStoreError> {
        self.wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| LedgerStoreError::NotFound(format!("wallet {wallet_id}")))
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. One mutex guards all state, so every operation is
/// trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerStoreError> {
        self.state
            .lock()
            .map_err(|_| LedgerStoreError::Backend("ledger lock poisoned".to_string()))
    }

    /// Overwrite a cached balance without a ledger row.
    ///
    /// Only for reconciliation tests that need a diverged wallet.
    #[cfg(test)]
    pub(crate) fn corrupt_balance(&self, wallet_id: WalletId, balance: i64) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(w) = state.wallets.get_mut(&wallet_id) {
                w.balance = balance;
            }
        }
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_wallet(&self, mut wallet: Wallet) -> Result<Wallet, LedgerStoreError> {
        let mut state = self.lock()?;

        if state.by_owner.contains_key(&wallet.owner_id) {
            return Err(LedgerStoreError::AlreadyExists(format!(
                "wallet for owner {}",
                wallet.owner_id
            )));
        }

        wallet.created_at = state.next_created_at(wallet.created_at);
        wallet.updated_at = wallet.created_at;

        state.by_owner.insert(wallet.owner_id.clone(), wallet.id);
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, owner_id: &OwnerId) -> Result<Wallet, LedgerStoreError> {
        let state = self.lock()?;
        state
            .by_owner
            .get(owner_id)
            .and_then(|id| state.wallets.get(id))
            .cloned()
            .ok_or_else(|| LedgerStoreError::NotFound(format!("wallet for owner {owner_id}")))
    }

    async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Wallet, LedgerStoreError> {
        let state = self.lock()?;
        state
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| LedgerStoreError::NotFound(format!("wallet {wallet_id}")))
    }

    async fn update_status(
        &self,
        wallet_id: WalletId,
        transition: StatusTransition,
        now: DateTime<Utc>,
    ) -> Result<Wallet, LedgerStoreError> {
        let mut state = self.lock()?;

        match state.wallets.get_mut(&wallet_id) {
            Some(w) if w.status == transition.from => {
                w.status = transition.to;
                w.updated_at = now;
                Ok(w.clone())
            }
            _ => Err(LedgerStoreError::PreconditionFailed(format!(
                "wallet {wallet_id} is not {}",
                transition.from
            ))),
        }
    }

    async fn apply_entry(&self, entry: LedgerEntry) -> Result<Transaction, LedgerStoreError> {
        let mut state = self.lock()?;

        if let Some(&idx) = state.by_reference.get(&entry.reference_id) {
            return Err(LedgerStoreError::DuplicateReference(Box::new(
                state.transactions[idx].clone(),
            )));
        }

        let wallet = state.wallet_mut(entry.wallet_id)?;
        if wallet.status != WalletStatus::Enabled {
            return Err(LedgerStoreError::PreconditionFailed(format!(
                "wallet {} is not enabled",
                entry.wallet_id
            )));
        }
        if wallet.balance != entry.posting.expected_balance {
            return Err(LedgerStoreError::Conflict(format!(
                "wallet {} balance is {}, expected {}",
                entry.wallet_id, wallet.balance, entry.posting.expected_balance
            )));
        }
        wallet.apply(&entry.posting, entry.recorded_at);

        let tx = Transaction {
            id: TransactionId::new(),
            reference_id: entry.reference_id.clone(),
            wallet_id: entry.wallet_id,
            direction: entry.direction(),
            amount: entry.amount(),
            status: entry.status(),
            balance_after: entry.posting.balance_after(),
            actor: entry.actor,
            created_at: entry.recorded_at,
        };

        let idx = state.transactions.len();
        state.transactions.push(tx.clone());
        state.by_reference.insert(entry.reference_id, idx);
        Ok(tx)
    }

    async fn find_transaction(
        &self,
        reference_id: &ReferenceId,
    ) -> Result<Option<Transaction>, LedgerStoreError> {
        let state = self.lock()?;
        Ok(state
            .by_reference
            .get(reference_id)
            .map(|&idx| state.transactions[idx].clone()))
    }

    async fn list_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, LedgerStoreError> {
        let state = self.lock()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn list_wallets_after(
        &self,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Wallet>, LedgerStoreError> {
        let state = self.lock()?;

        let mut page: Vec<Wallet> = state
            .wallets
            .values()
            .filter(|w| after.is_none_or(|t| w.created_at > t))
            .cloned()
            .collect();
        page.sort_by_key(|w| w.created_at);
        page.truncate(limit);
        Ok(page)
    }
}
