use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use walletd_core::{Cursor, OwnerId, WalletId, WalletResult};
use walletd_infra::{
    AppConfig, InMemoryLedgerStore, InMemoryOwnerDirectory, PostgresLedgerStore,
    PostgresOwnerDirectory, Reconciliation, WalletPage, WalletService,
};
use walletd_wallet::{Amount, ReferenceId, Transaction, Wallet};

type InMemoryService = WalletService<Arc<InMemoryLedgerStore>, InMemoryOwnerDirectory>;
type PostgresService = WalletService<PostgresLedgerStore, PostgresOwnerDirectory>;

/// The wallet service behind the HTTP layer, over whichever adapters were configured.
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory { service: Arc<InMemoryService> },
    Postgres { service: Arc<PostgresService> },
}

/// Connect the adapters selected by `config`.
///
/// With `DATABASE_URL` set the Postgres schema is created if missing;
/// otherwise everything lives in process memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let Some(database_url) = config.database_url.as_deref() else {
        info!("DATABASE_URL not set; using in-memory stores");
        return Ok(in_memory(config));
    };

    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = PostgresLedgerStore::new(pool.clone());
    store
        .ensure_schema()
        .await
        .context("failed to prepare ledger schema")?;

    let directory = PostgresOwnerDirectory::new(pool);
    directory
        .ensure_schema()
        .await
        .context("failed to prepare owner schema")?;

    info!("using Postgres stores");
    Ok(AppServices::Postgres {
        service: Arc::new(WalletService::new(
            store,
            Arc::new(directory),
            config.request_timeout,
            config.enrichment_concurrency,
        )),
    })
}

pub fn in_memory(config: &AppConfig) -> AppServices {
    AppServices::InMemory {
        service: Arc::new(WalletService::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryOwnerDirectory::new()),
            config.request_timeout,
            config.enrichment_concurrency,
        )),
    }
}

impl AppServices {
    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Postgres { .. } => "postgres",
        }
    }

    pub async fn init(&self, owner_id: OwnerId, name: Option<String>) -> WalletResult<Wallet> {
        match self {
            AppServices::InMemory { service } => service.init(owner_id, name).await,
            AppServices::Postgres { service } => service.init(owner_id, name).await,
        }
    }

    pub async fn fetch(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        match self {
            AppServices::InMemory { service } => service.fetch(owner_id).await,
            AppServices::Postgres { service } => service.fetch(owner_id).await,
        }
    }

    pub async fn enable(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        match self {
            AppServices::InMemory { service } => service.enable(owner_id).await,
            AppServices::Postgres { service } => service.enable(owner_id).await,
        }
    }

    pub async fn disable(&self, owner_id: &OwnerId) -> WalletResult<Wallet> {
        match self {
            AppServices::InMemory { service } => service.disable(owner_id).await,
            AppServices::Postgres { service } => service.disable(owner_id).await,
        }
    }

    pub async fn deposit(
        &self,
        owner_id: &OwnerId,
        reference_id: ReferenceId,
        amount: Amount,
    ) -> WalletResult<Transaction> {
        match self {
            AppServices::InMemory { service } => {
                service.deposit(owner_id, reference_id, amount).await
            }
            AppServices::Postgres { service } => {
                service.deposit(owner_id, reference_id, amount).await
            }
        }
    }

    pub async fn withdraw(
        &self,
        owner_id: &OwnerId,
        reference_id: ReferenceId,
        amount: Amount,
    ) -> WalletResult<Transaction> {
        match self {
            AppServices::InMemory { service } => {
                service.withdraw(owner_id, reference_id, amount).await
            }
            AppServices::Postgres { service } => {
                service.withdraw(owner_id, reference_id, amount).await
            }
        }
    }

    pub async fn list(&self, cursor: &Cursor, page_size: usize) -> WalletResult<WalletPage> {
        match self {
            AppServices::InMemory { service } => service.list(cursor, page_size).await,
            AppServices::Postgres { service } => service.list(cursor, page_size).await,
        }
    }

    pub async fn get_by_id(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        match self {
            AppServices::InMemory { service } => service.get_by_id(wallet_id).await,
            AppServices::Postgres { service } => service.get_by_id(wallet_id).await,
        }
    }

    pub async fn reconcile(&self, wallet_id: WalletId) -> WalletResult<Reconciliation> {
        match self {
            AppServices::InMemory { service } => service.reconcile(wallet_id).await,
            AppServices::Postgres { service } => service.reconcile(wallet_id).await,
        }
    }
}
