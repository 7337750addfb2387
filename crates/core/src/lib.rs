//! `walletd-core`: wallet foundation building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod clock;
pub mod cursor;
pub mod error;
pub mod id;

pub use cursor::Cursor;
pub use error::{WalletError, WalletResult};
pub use id::{OwnerId, TransactionId, WalletId};
