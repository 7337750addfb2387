use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use walletd_core::{OwnerId, TransactionId, WalletError, WalletId};

/// Positive amount in minor units (e.g. cents).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self, WalletError> {
        if value <= 0 {
            return Err(WalletError::bad_input("amount must be positive"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = WalletError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

/// Caller-supplied idempotency key for one logical transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceId(String);

impl ReferenceId {
    pub const MAX_LEN: usize = 64;

    pub fn new(raw: impl Into<String>) -> Result<Self, WalletError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(WalletError::bad_input("reference_id must not be empty"));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(WalletError::bad_input(format!(
                "reference_id must be at most {} bytes",
                Self::MAX_LEN
            )));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(WalletError::bad_input("reference_id must not contain whitespace"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReferenceId {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ReferenceId> for String {
    fn from(value: ReferenceId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Deposit,
    Withdraw,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdraw => "withdraw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Direction::Deposit),
            "withdraw" => Some(Direction::Withdraw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(TransactionStatus::Success),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// One row of the append-only ledger. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub reference_id: ReferenceId,
    pub wallet_id: WalletId,
    pub direction: Direction,
    pub amount: Amount,
    pub status: TransactionStatus,
    /// Wallet balance right after this row was recorded (unchanged for failures).
    pub balance_after: i64,
    pub actor: OwnerId,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Effect of this row on the wallet balance.
    pub fn balance_delta(&self) -> i64 {
        match (self.status, self.direction) {
            (TransactionStatus::Failed, _) => 0,
            (TransactionStatus::Success, Direction::Deposit) => self.amount.get(),
            (TransactionStatus::Success, Direction::Withdraw) => -self.amount.get(),
        }
    }

    /// Whether a replayed request describes the same logical attempt.
    pub fn same_request(&self, wallet_id: WalletId, direction: Direction, amount: Amount) -> bool {
        self.wallet_id == wallet_id && self.direction == direction && self.amount == amount
    }

    /// The outcome the caller saw when this row was first recorded.
    pub fn outcome(&self) -> Result<&Transaction, WalletError> {
        match self.status {
            TransactionStatus::Success => Ok(self),
            TransactionStatus::Failed => Err(WalletError::InsufficientFunds {
                balance: self.balance_after,
                requested: self.amount.get(),
            }),
        }
    }
}

/// Balance implied by a wallet's transaction log.
///
/// Summed in `i128` so a corrupt log cannot overflow while being checked.
pub fn derive_balance<'a>(log: impl IntoIterator<Item = &'a Transaction>) -> i128 {
    log.into_iter().map(|t| t.balance_delta() as i128).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(direction: Direction, amount: i64, status: TransactionStatus) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            reference_id: ReferenceId::new(format!("ref-{amount}")).unwrap(),
            wallet_id: WalletId::new(),
            direction,
            amount: Amount::new(amount).unwrap(),
            status,
            balance_after: 0,
            actor: OwnerId::parse("owner").unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(Amount::new(0).is_err());
        assert!(Amount::new(-5).is_err());
        assert_eq!(Amount::new(5).unwrap().get(), 5);
    }

    #[test]
    fn reference_id_rules() {
        assert!(ReferenceId::new("").is_err());
        assert!(ReferenceId::new("has space").is_err());
        assert!(ReferenceId::new("x".repeat(65)).is_err());
        assert!(ReferenceId::new("50535246-dcb2-4929-8cc9-004ea06f5241").is_ok());
    }

    #[test]
    fn amount_rejects_non_positive_json() {
        let err = serde_json::from_str::<Amount>("0").unwrap_err();
        assert!(err.to_string().contains("amount must be positive"));
    }

    #[test]
    fn failed_rows_do_not_move_the_balance() {
        let log = vec![
            tx(Direction::Deposit, 100, TransactionStatus::Success),
            tx(Direction::Withdraw, 150, TransactionStatus::Failed),
            tx(Direction::Withdraw, 50, TransactionStatus::Success),
        ];
        assert_eq!(derive_balance(&log), 50);
    }

    #[test]
    fn failed_outcome_replays_as_insufficient_funds() {
        let mut t = tx(Direction::Withdraw, 150, TransactionStatus::Failed);
        t.balance_after = 100;
        assert_eq!(
            t.outcome().unwrap_err(),
            WalletError::InsufficientFunds { balance: 100, requested: 150 }
        );
    }
}
