use axum::{Router, routing::get};

pub mod system;
pub mod wallet;

/// Router for all authenticated (owner-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(wallet::router())
}

/// Router for endpoints that need no bearer token.
pub fn public_router() -> Router {
    wallet::public_router()
}
