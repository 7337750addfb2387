//! `walletd-auth`: turns a bearer token into an authenticated owner id.
//!
//! Decoupled from HTTP and storage; the transport hands over the raw token.

pub mod authenticator;
pub mod claims;

pub use authenticator::{Authenticator, Hs256Authenticator};
pub use claims::{OwnerClaims, TokenValidationError, validate_claims};
