use serde::Deserialize;

use walletd_core::WalletResult;
use walletd_wallet::{
    Amount, Direction, EnrichedWallet, ReferenceId, Transaction, Wallet, WalletStatus,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub customer_id: String,
    /// Display name recorded in the owner directory on first init.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub is_disabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub reference_id: String,
    pub amount: i64,
}

impl TransactionRequest {
    pub fn parse(self) -> WalletResult<(ReferenceId, Amount)> {
        Ok((ReferenceId::new(self.reference_id)?, Amount::new(self.amount)?))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub cursor: Option<String>,
    /// Page size; absent or zero means the service default.
    pub num: Option<usize>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn wallet_to_json(w: &Wallet) -> serde_json::Value {
    let since = match w.status {
        WalletStatus::Enabled => "enabled_at",
        WalletStatus::Disabled => "disabled_at",
    };
    let mut body = serde_json::json!({
        "id": w.id.to_string(),
        "owned_by": w.owner_id.to_string(),
        "status": w.status.as_str(),
        "balance": w.balance,
    });
    body[since] = serde_json::json!(w.updated_at.to_rfc3339());
    body
}

pub fn enriched_wallet_to_json(w: &EnrichedWallet) -> serde_json::Value {
    serde_json::json!({
        "id": w.id.to_string(),
        "owned_by": {
            "id": w.owned_by.id.to_string(),
            "name": w.owned_by.name,
        },
        "status": w.status.as_str(),
        "balance": w.balance,
        "created_at": w.created_at.to_rfc3339(),
        "updated_at": w.updated_at.to_rfc3339(),
    })
}

/// `{"deposit": {...}}` or `{"withdrawal": {...}}`, keyed by direction.
pub fn transaction_to_json(tx: &Transaction) -> serde_json::Value {
    let (key, by, at) = match tx.direction {
        Direction::Deposit => ("deposit", "deposited_by", "deposited_at"),
        Direction::Withdraw => ("withdrawal", "withdrawn_by", "withdrawn_at"),
    };
    let mut row = serde_json::json!({
        "id": tx.id.to_string(),
        "reference_id": tx.reference_id.as_str(),
        "amount": tx.amount.get(),
        "status": tx.status.as_str(),
        "balance": tx.balance_after,
    });
    row[by] = serde_json::json!(tx.actor.to_string());
    row[at] = serde_json::json!(tx.created_at.to_rfc3339());
    serde_json::json!({ key: row })
}
