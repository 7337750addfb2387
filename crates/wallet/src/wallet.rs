use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use walletd_core::{OwnerId, WalletError, WalletId};

use crate::transaction::{Amount, Direction, TransactionStatus};

/// Wallet lifecycle status. `Uninitialized` is simply "no row yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Enabled,
    Disabled,
}

impl WalletStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WalletStatus::Enabled => "enabled",
            WalletStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enabled" => Some(WalletStatus::Enabled),
            "disabled" => Some(WalletStatus::Disabled),
            _ => None,
        }
    }

    /// Error reported when a read requires `self` but the wallet is in the other state.
    pub fn mismatch_error(self) -> WalletError {
        match self {
            WalletStatus::Enabled => WalletError::Disabled,
            WalletStatus::Disabled => WalletError::AlreadyEnabled,
        }
    }
}

impl core::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A balance-bearing account owned by exactly one owner.
///
/// `balance` is a cached projection of the wallet's successful transactions;
/// it only changes together with a ledger row (see [`Posting`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: OwnerId,
    pub status: WalletStatus,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Allowed status change, checked optimistically against the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: WalletStatus,
    pub to: WalletStatus,
}

impl StatusTransition {
    pub fn enable() -> Self {
        Self {
            from: WalletStatus::Disabled,
            to: WalletStatus::Enabled,
        }
    }

    pub fn disable() -> Self {
        Self {
            from: WalletStatus::Enabled,
            to: WalletStatus::Disabled,
        }
    }

    /// Error reported when the `from` precondition does not hold.
    pub fn precondition_error(&self) -> WalletError {
        match self.to {
            WalletStatus::Enabled => WalletError::AlreadyEnabled,
            WalletStatus::Disabled => WalletError::AlreadyDisabled,
        }
    }
}

/// Planned effect of a deposit or withdrawal, applied atomically with its ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub direction: Direction,
    pub amount: Amount,
    /// Balance the plan was computed from (compare-and-swap precondition).
    pub expected_balance: i64,
    /// `None` when the attempt is recorded as failed and the balance stays put.
    pub new_balance: Option<i64>,
    pub status: TransactionStatus,
}

impl Posting {
    pub fn balance_after(&self) -> i64 {
        self.new_balance.unwrap_or(self.expected_balance)
    }
}

impl Wallet {
    /// A freshly initialized wallet: enabled, zero balance.
    pub fn open(owner_id: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            id: WalletId::new(),
            owner_id,
            status: WalletStatus::Enabled,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == WalletStatus::Enabled
    }

    /// Check the wallet is in `required` state, reporting the distinct mismatch kind otherwise.
    pub fn require(&self, required: WalletStatus) -> Result<(), WalletError> {
        if self.status == required {
            Ok(())
        } else {
            Err(required.mismatch_error())
        }
    }

    /// Decide the balance effect of a deposit or withdrawal.
    ///
    /// Only enabled wallets move money. An overdrawing withdrawal is not an
    /// error here: it plans a `Failed` row so the attempt stays visible in the
    /// ledger, and the caller reports `InsufficientFunds` after recording it.
    pub fn plan(&self, direction: Direction, amount: Amount) -> Result<Posting, WalletError> {
        self.require(WalletStatus::Enabled)?;

        let (new_balance, status) = match direction {
            Direction::Deposit => {
                let next = self
                    .balance
                    .checked_add(amount.get())
                    .ok_or_else(|| WalletError::bad_input("deposit would overflow the balance"))?;
                (Some(next), TransactionStatus::Success)
            }
            Direction::Withdraw => {
                let next = self.balance - amount.get();
                if next < 0 {
                    (None, TransactionStatus::Failed)
                } else {
                    (Some(next), TransactionStatus::Success)
                }
            }
        };

        Ok(Posting {
            direction,
            amount,
            expected_balance: self.balance,
            new_balance,
            status,
        })
    }

    /// Evolve in-memory state from a posting that the store accepted.
    pub fn apply(&mut self, posting: &Posting, now: DateTime<Utc>) {
        if let Some(next) = posting.new_balance {
            self.balance = next;
            self.updated_at = now;
        }
    }
}
