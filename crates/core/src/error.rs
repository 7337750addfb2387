//! Wallet error taxonomy.

use thiserror::Error;

/// Result type used across the wallet layers.
pub type WalletResult<T> = Result<T, WalletError>;

/// Every failure a wallet operation can report.
///
/// Adapters keep their own error enums and convert into this one at the engine
/// boundary, so callers (and the transport layer) only ever see these kinds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// No such wallet, owner or transaction.
    #[error("not found: {0}")]
    NotFound(String),

    /// A wallet already exists for the owner.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Enable requested but the wallet is not disabled.
    #[error("wallet is already enabled")]
    AlreadyEnabled,

    /// Disable requested but the wallet is not enabled.
    #[error("wallet is already disabled")]
    AlreadyDisabled,

    /// The wallet exists but is disabled (distinct from `NotFound`).
    #[error("wallet is disabled")]
    Disabled,

    /// Withdrawal exceeds the current balance. The attempt is still recorded.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    /// A pagination cursor could not be decoded.
    #[error("bad cursor: {0}")]
    BadCursor(String),

    /// Malformed amount, reference id or other input.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Ownership/reference collision or a lost concurrent update.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The per-call deadline elapsed.
    #[error("deadline exceeded")]
    Timeout,

    /// The caller could not be authenticated.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Store or directory failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WalletError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn bad_cursor(msg: impl Into<String>) -> Self {
        Self::BadCursor(msg.into())
    }

    pub fn bad_input(msg: impl Into<String>) -> Self {
        Self::BadInput(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code, used in transport payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::NotFound(_) => "not_found",
            WalletError::AlreadyExists(_) => "already_exists",
            WalletError::AlreadyEnabled => "already_enabled",
            WalletError::AlreadyDisabled => "already_disabled",
            WalletError::Disabled => "disabled",
            WalletError::InsufficientFunds { .. } => "insufficient_funds",
            WalletError::BadCursor(_) => "bad_cursor",
            WalletError::BadInput(_) => "bad_input",
            WalletError::Conflict(_) => "conflict",
            WalletError::Timeout => "timeout",
            WalletError::Unauthenticated => "unauthenticated",
            WalletError::Internal(_) => "internal",
        }
    }
}
