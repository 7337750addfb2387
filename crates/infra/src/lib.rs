//! Infrastructure layer: ledger and owner adapters, the wallet engine, config.

pub mod config;
pub mod enrichment;
pub mod idempotency;
pub mod ledger_store;
pub mod owner_directory;
pub mod state_machine;
pub mod wallet_service;


pub use config::{AppConfig, ConfigError};
pub use enrichment::EnrichmentPipeline;
pub use idempotency::{IdempotencyGuard, PostingRequest};
pub use ledger_store::{InMemoryLedgerStore, LedgerEntry, LedgerStore, LedgerStoreError, PostgresLedgerStore};
pub use owner_directory::{
    InMemoryOwnerDirectory, OwnerDirectory, OwnerDirectoryError, PostgresOwnerDirectory,
};
pub use state_machine::{Reconciliation, WalletStateMachine};
pub use wallet_service::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, WalletPage, WalletService};
