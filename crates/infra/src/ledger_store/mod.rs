//! Ledger store boundary: wallets plus their append-only transaction log.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerEntry, LedgerStore, LedgerStoreError};
