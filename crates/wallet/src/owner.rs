//! Owner profiles and list-response enrichment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use walletd_core::{OwnerId, WalletId};

use crate::wallet::{Wallet, WalletStatus};

/// Owner data resolved from the owner directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub id: OwnerId,
    pub name: String,
}

/// A wallet with its owner resolved. Built per list request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedWallet {
    pub id: WalletId,
    pub owned_by: OwnerProfile,
    pub status: WalletStatus,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichedWallet {
    pub fn new(wallet: Wallet, owner: OwnerProfile) -> Self {
        Self {
            id: wallet.id,
            owned_by: owner,
            status: wallet.status,
            balance: wallet.balance,
            created_at: wallet.created_at,
            updated_at: wallet.updated_at,
        }
    }
}
