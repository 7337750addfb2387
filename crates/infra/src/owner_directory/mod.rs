//! Owner directory boundary: owner id -> profile lookups for enrichment.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryOwnerDirectory;
pub use postgres::PostgresOwnerDirectory;

use std::sync::Arc;

use thiserror::Error;

use walletd_core::{OwnerId, WalletError};
use walletd_wallet::OwnerProfile;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwnerDirectoryError {
    #[error("owner not found: {0}")]
    NotFound(OwnerId),

    #[error("owner directory unavailable: {0}")]
    Unavailable(String),
}

impl From<OwnerDirectoryError> for WalletError {
    fn from(value: OwnerDirectoryError) -> Self {
        match value {
            OwnerDirectoryError::NotFound(id) => WalletError::not_found(format!("owner {id}")),
            OwnerDirectoryError::Unavailable(msg) => WalletError::internal(msg),
        }
    }
}

/// Source of owner profiles.
#[async_trait::async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn get_owner(&self, owner_id: &OwnerId) -> Result<OwnerProfile, OwnerDirectoryError>;

    /// Store `profile` unless the owner is already known; returns the stored profile.
    async fn register_owner(&self, profile: OwnerProfile) -> Result<OwnerProfile, OwnerDirectoryError>;
}

#[async_trait::async_trait]
impl<D> OwnerDirectory for Arc<D>
where
    D: OwnerDirectory + ?Sized,
{
    async fn get_owner(&self, owner_id: &OwnerId) -> Result<OwnerProfile, OwnerDirectoryError> {
        (**self).get_owner(owner_id).await
    }

    async fn register_owner(&self, profile: OwnerProfile) -> Result<OwnerProfile, OwnerDirectoryError> {
        (**self).register_owner(profile).await
    }
}
