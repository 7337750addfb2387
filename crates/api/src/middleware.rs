use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use walletd_auth::Authenticator;
use walletd_core::WalletError;

use crate::app::errors;
use crate::context::OwnerContext;

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<dyn Authenticator>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let owner_id = match extract_bearer(req.headers()) {
        Some(token) => state.authenticator.authenticate(token, Utc::now()).await,
        None => Err(WalletError::Unauthenticated),
    };

    match owner_id {
        Ok(owner_id) => {
            req.extensions_mut().insert(OwnerContext::new(owner_id));
            next.run(req).await
        }
        Err(_) => errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "missing or invalid bearer token",
        ),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
