//! At-most-once application of deposits and withdrawals per reference id.
//!
//! The guard never holds an in-process lock. Exactly-once rests on the ledger
//! store: `apply_entry` refuses a reference id that is already recorded and
//! refuses a plan computed from a stale balance. The guard turns those two
//! refusals into a replay and a retry respectively.

use tracing::{debug, instrument, warn};

use walletd_core::{OwnerId, WalletError, WalletId, WalletResult, clock};
use walletd_wallet::{Amount, Direction, ReferenceId, Transaction, TransactionStatus};

use crate::ledger_store::{LedgerEntry, LedgerStore, LedgerStoreError};

/// Upper bound on re-planning after a lost compare-and-swap.
pub const MAX_CAS_ATTEMPTS: usize = 8;

/// One logical deposit or withdrawal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingRequest {
    pub wallet_id: WalletId,
    pub reference_id: ReferenceId,
    pub direction: Direction,
    pub amount: Amount,
    pub actor: OwnerId,
}

#[derive(Debug, Clone)]
pub struct IdempotencyGuard<S> {
    store: S,
}

impl<S> IdempotencyGuard<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Apply `request` at most once.
    ///
    /// A repeated reference id returns the outcome recorded the first time:
    /// the same transaction on success, `InsufficientFunds` for a recorded
    /// failure. Reusing a reference id for a different wallet, direction or
    /// amount is a `Conflict`.
    #[instrument(
        skip(self, request),
        fields(
            wallet_id = %request.wallet_id,
            reference_id = %request.reference_id,
            direction = request.direction.as_str(),
            amount = request.amount.get()
        )
    )]
    pub async fn apply(&self, request: PostingRequest) -> WalletResult<Transaction> {
        if let Some(recorded) = self.store.find_transaction(&request.reference_id).await? {
            return replay(&recorded, &request);
        }

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let wallet = self.store.get_wallet_by_id(request.wallet_id).await?;
            let posting = wallet.plan(request.direction, request.amount)?;

            let entry = LedgerEntry {
                wallet_id: request.wallet_id,
                reference_id: request.reference_id.clone(),
                actor: request.actor.clone(),
                posting,
                recorded_at: clock::now(),
            };

            match self.store.apply_entry(entry).await {
                Ok(recorded) => return settle(recorded),
                Err(LedgerStoreError::DuplicateReference(recorded)) => {
                    return replay(&recorded, &request);
                }
                Err(LedgerStoreError::Conflict(reason)) => {
                    debug!(attempt, %reason, "balance moved underneath us; re-planning");
                }
                Err(LedgerStoreError::PreconditionFailed(_)) => return Err(WalletError::Disabled),
                Err(other) => return Err(other.into()),
            }
        }

        warn!(attempts = MAX_CAS_ATTEMPTS, "gave up after repeated balance conflicts");
        Err(WalletError::conflict(format!(
            "wallet {} kept changing; retry the request",
            request.wallet_id
        )))
    }
}

/// Report a freshly recorded transaction to the caller.
fn settle(recorded: Transaction) -> WalletResult<Transaction> {
    if recorded.status == TransactionStatus::Failed {
        warn!(
            wallet_id = %recorded.wallet_id,
            reference_id = %recorded.reference_id,
            balance = recorded.balance_after,
            requested = recorded.amount.get(),
            "withdrawal recorded as failed: insufficient funds"
        );
    }
    recorded.outcome().cloned()
}

fn replay(recorded: &Transaction, request: &PostingRequest) -> WalletResult<Transaction> {
    if !recorded.same_request(request.wallet_id, request.direction, request.amount) {
        return Err(WalletError::conflict(format!(
            "reference id {} was already used for a different request",
            request.reference_id
        )));
    }
    debug!(transaction_id = %recorded.id, status = recorded.status.as_str(), "replaying recorded outcome");
    recorded.outcome().cloned()
}
