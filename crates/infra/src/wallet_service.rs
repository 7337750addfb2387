//! Orchestration: every operation runs under one per-call deadline.
//!
//! Expiry drops the in-flight future, which aborts enrichment lookups. A
//! ledger write already handed to the store may still commit; the caller
//! learns the outcome by replaying the same reference id.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{instrument, warn};

use walletd_core::{Cursor, OwnerId, WalletError, WalletId, WalletResult};
use walletd_wallet::{Amount, EnrichedWallet, OwnerProfile, ReferenceId, Transaction, Wallet};

use crate::enrichment::EnrichmentPipeline;
use crate::ledger_store::LedgerStore;
use crate::owner_directory::OwnerDirectory;
use crate::state_machine::{Reconciliation, WalletStateMachine};

/// Page size used when the caller asks for zero.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Largest page a single `list` call may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of enriched wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletPage {
    pub wallets: Vec<EnrichedWallet>,
    /// Empty once the sequence is exhausted.
    pub next_cursor: Cursor,
}

#[derive(Debug)]
pub struct WalletService<S, D> {
    machine: WalletStateMachine<S>,
    directory: Arc<D>,
    enrichment: EnrichmentPipeline<D>,
    timeout: Duration,
}

impl<S, D> WalletService<S, D>
where
    S: LedgerStore + Clone,
    D: OwnerDirectory + 'static,
{
    pub fn new(store: S, directory: Arc<D>, timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            machine: WalletStateMachine::new(store),
            enrichment: EnrichmentPipeline::new(Arc::clone(&directory), max_concurrency),
            directory,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn deadline<T>(&self, op: &'static str, fut: impl Future<Output = WalletResult<T>>) -> WalletResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "wallet operation timed out");
                Err(WalletError::Timeout)
            }
        }
    }

    /// Register the owner (if new) and open their wallet.
    ///
    /// `name` only applies the first time an owner is seen; it defaults to the owner id.
    #[instrument(skip(self, name), fields(owner_id = %owner_id))]
    pub async fn init(&self, owner_id: OwnerId, name: Option<String>) -> WalletResult<Wallet> {
        self.deadline("init", async {
            let name = name.unwrap_or_else(|| owner_id.to_string());
            self.directory
                .register_owner(OwnerProfile {
                    id: owner_id.clone(),
                    name,
                })
                .await?;
            self.machine.init(owner_id).await
        })
        .await
    }

    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn fetch(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        self.deadline("fetch", self.machine.fetch(owner_id)).await
    }

    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn enable(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        self.deadline("enable", async {
            let wallet = self.machine.fetch_any(owner_id).await?;
            self.machine.enable(wallet.id).await
        })
        .await
    }

    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn disable(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        self.deadline("disable", async {
            let wallet = self.machine.fetch_any(owner_id).await?;
            self.machine.disable(wallet.id).await
        })
        .await
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, reference_id = %reference_id))]
    pub async fn deposit(
        &self,
        owner_id: &OwnerId,
        reference_id: ReferenceId,
        amount: Amount,
    ) -> WalletResult<Transaction> {
        self.deadline("deposit", async {
            let wallet = self.machine.fetch_any(owner_id).await?;
            self.machine
                .deposit(wallet.id, amount, reference_id, owner_id.clone())
                .await
        })
        .await
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, reference_id = %reference_id))]
    pub async fn withdraw(
        &self,
        owner_id: &OwnerId,
        reference_id: ReferenceId,
        amount: Amount,
    ) -> WalletResult<Transaction> {
        self.deadline("withdraw", async {
            let wallet = self.machine.fetch_any(owner_id).await?;
            self.machine
                .withdraw(wallet.id, amount, reference_id, owner_id.clone())
                .await
        })
        .await
    }

    /// A page of wallets after `cursor`, with owners attached.
    ///
    /// `page_size == 0` means [`DEFAULT_PAGE_SIZE`].
    #[instrument(skip(self, cursor), fields(cursor = %cursor))]
    pub async fn list(&self, cursor: &Cursor, page_size: usize) -> WalletResult<WalletPage> {
        let after = cursor.decode()?;
        let limit = match page_size {
            0 => DEFAULT_PAGE_SIZE,
            n if n > MAX_PAGE_SIZE => {
                return Err(WalletError::bad_input(format!(
                    "page size must be at most {MAX_PAGE_SIZE}"
                )));
            }
            n => n,
        };

        self.deadline("list", async {
            let rows = self.machine.list_after(after, limit).await?;
            let next_cursor = match rows.last() {
                Some(last) if rows.len() >= limit => Cursor::encode(last.created_at),
                _ => Cursor::start(),
            };
            let wallets = self.enrichment.enrich(rows).await?;
            Ok(WalletPage { wallets, next_cursor })
        })
        .await
    }

    #[instrument(skip(self), fields(wallet_id = %wallet_id))]
    pub async fn get_by_id(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.deadline("get_by_id", self.machine.get_by_id(wallet_id)).await
    }

    #[instrument(skip(self), fields(wallet_id = %wallet_id))]
    pub async fn reconcile(&self, wallet_id: WalletId) -> WalletResult<Reconciliation> {
        self.deadline("reconcile", self.machine.reconcile(wallet_id)).await
    }
}
