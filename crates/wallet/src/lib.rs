//! Wallet domain module (balance state machine rules, ledger records).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod owner;
pub mod transaction;
pub mod wallet;

pub use owner::{EnrichedWallet, OwnerProfile};
pub use transaction::{Amount, Direction, ReferenceId, Transaction, TransactionStatus, derive_balance};
pub use wallet::{Posting, StatusTransition, Wallet, WalletStatus};
