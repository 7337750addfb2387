//! Bearer token authentication.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use tracing::debug;

use walletd_core::{OwnerId, WalletError};

use crate::claims::{OwnerClaims, TokenValidationError, validate_claims};

/// Resolves a raw bearer token to the owner it was issued for.
///
/// Every failure surfaces to callers as [`WalletError::Unauthenticated`]; the
/// precise reason only goes to the logs.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<OwnerId, WalletError>;
}

#[async_trait::async_trait]
impl<A> Authenticator for Arc<A>
where
    A: Authenticator + ?Sized,
{
    async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<OwnerId, WalletError> {
        (**self).authenticate(token, now).await
    }
}

/// HMAC-SHA256 signed JWTs carrying [`OwnerClaims`].
pub struct Hs256Authenticator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256Authenticator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time windows are checked by `validate_claims` on the chrono fields.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    /// Verify the signature and the claim window.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<OwnerClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<OwnerClaims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::BadSignature,
                _ => TokenValidationError::Malformed(e.to_string()),
            })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

impl core::fmt::Debug for Hs256Authenticator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Authenticator").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Authenticator for Hs256Authenticator {
    async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<OwnerId, WalletError> {
        match self.verify(token, now) {
            Ok(claims) => Ok(claims.sub),
            Err(reason) => {
                debug!(%reason, "bearer token rejected");
                Err(WalletError::Unauthenticated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use jsonwebtoken::{EncodingKey, Header};

    fn mint(secret: &str, sub: &str, issued_at: DateTime<Utc>, ttl: TimeDelta) -> String {
        let claims = OwnerClaims {
            sub: OwnerId::parse(sub).unwrap(),
            issued_at,
            expires_at: issued_at + ttl,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_owner() {
        let now = Utc::now();
        let auth = Hs256Authenticator::new("s3cret");
        let token = mint("s3cret", "ea0212d3-abd6-406f-8c67-868e814a2436", now, TimeDelta::minutes(10));

        let owner = auth.authenticate(&token, now).await.unwrap();
        assert_eq!(owner.as_str(), "ea0212d3-abd6-406f-8c67-868e814a2436");
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthenticated() {
        let now = Utc::now();
        let auth = Hs256Authenticator::new("s3cret");
        let token = mint("other", "owner-1", now, TimeDelta::minutes(10));

        assert_eq!(auth.verify(&token, now).unwrap_err(), TokenValidationError::BadSignature);
        assert_eq!(auth.authenticate(&token, now).await.unwrap_err(), WalletError::Unauthenticated);
    }

    #[tokio::test]
    async fn expired_and_garbage_tokens_are_rejected() {
        let now = Utc::now();
        let auth = Hs256Authenticator::new("s3cret");
        let expired = mint("s3cret", "owner-1", now - TimeDelta::hours(1), TimeDelta::minutes(10));

        assert_eq!(auth.verify(&expired, now).unwrap_err(), TokenValidationError::Expired);
        assert!(matches!(
            auth.verify("not-a-jwt", now),
            Err(TokenValidationError::Malformed(_))
        ));
    }
}
