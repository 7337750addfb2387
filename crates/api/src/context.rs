use walletd_core::OwnerId;

/// The authenticated wallet owner for a request.
///
/// Inserted by the auth middleware; every owner-scoped route requires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerContext {
    owner_id: OwnerId,
}

impl OwnerContext {
    pub fn new(owner_id: OwnerId) -> Self {
        Self { owner_id }
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
}
