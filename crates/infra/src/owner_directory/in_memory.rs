use std::collections::HashMap;
use std::sync::RwLock;

use walletd_core::OwnerId;
use walletd_wallet::OwnerProfile;

use super::{OwnerDirectory, OwnerDirectoryError};

/// In-memory owner directory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryOwnerDirectory {
    owners: RwLock<HashMap<OwnerId, OwnerProfile>>,
}

impl InMemoryOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owners(profiles: impl IntoIterator<Item = OwnerProfile>) -> Self {
        let owners = profiles.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            owners: RwLock::new(owners),
        }
    }
}

#[async_trait::async_trait]
impl OwnerDirectory for InMemoryOwnerDirectory {
    async fn get_owner(&self, owner_id: &OwnerId) -> Result<OwnerProfile, OwnerDirectoryError> {
        let owners = self
            .owners
            .read()
            .map_err(|_| OwnerDirectoryError::Unavailable("owner directory lock poisoned".to_string()))?;
        owners
            .get(owner_id)
            .cloned()
            .ok_or_else(|| OwnerDirectoryError::NotFound(owner_id.clone()))
    }

    async fn register_owner(&self, profile: OwnerProfile) -> Result<OwnerProfile, OwnerDirectoryError> {
        let mut owners = self
            .owners
            .write()
            .map_err(|_| OwnerDirectoryError::Unavailable("owner directory lock poisoned".to_string()))?;
        Ok(owners.entry(profile.id.clone()).or_insert(profile).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, name: &str) -> OwnerProfile {
        OwnerProfile {
            id: OwnerId::parse(id).unwrap(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn register_keeps_the_first_profile() {
        let dir = InMemoryOwnerDirectory::new();
        dir.register_owner(profile("o1", "Ada")).await.unwrap();
        let stored = dir.register_owner(profile("o1", "Someone else")).await.unwrap();

        assert_eq!(stored.name, "Ada");
        assert_eq!(dir.get_owner(&stored.id).await.unwrap().name, "Ada");
    }

    #[tokio::test]
    async fn unknown_owner_is_not_found() {
        let dir = InMemoryOwnerDirectory::with_owners([profile("o1", "Ada")]);
        let missing = OwnerId::parse("o2").unwrap();
        assert_eq!(
            dir.get_owner(&missing).await.unwrap_err(),
            OwnerDirectoryError::NotFound(missing)
        );
    }
}
