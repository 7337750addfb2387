use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};

use walletd_core::{Cursor, OwnerId, WalletError, WalletId, WalletResult};
use walletd_wallet::Wallet;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::OwnerContext;

/// Owner-scoped routes; mounted behind the auth middleware.
pub fn router() -> Router {
    Router::new()
        .route("/api/v1/wallet", post(enable_wallet).get(get_wallet).patch(disable_wallet))
        .route("/api/v1/wallet/deposits", post(deposit))
        .route("/api/v1/wallet/withdrawals", post(withdraw))
        .route("/api/v1/wallets", get(list_wallets))
        .route("/api/v1/wallets/:id", get(get_wallet_by_id))
        .route("/api/v1/wallets/:id/reconciliation", get(reconcile_wallet))
}

/// Routes that run before an owner has a token.
pub fn public_router() -> Router {
    Router::new().route("/api/v1/init", post(init_wallet))
}

pub async fn init_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::InitRequest>,
) -> axum::response::Response {
    let owner_id = match OwnerId::parse(body.customer_id) {
        Ok(id) => id,
        Err(e) => return errors::wallet_error_response(e),
    };

    match services.init(owner_id, body.name).await {
        Ok(wallet) => errors::success(
            StatusCode::CREATED,
            serde_json::json!({ "wallet": dto::wallet_to_json(&wallet) }),
        ),
        Err(e) => errors::wallet_error_response(e),
    }
}

pub async fn enable_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
) -> axum::response::Response {
    wallet_response(StatusCode::CREATED, services.enable(owner.owner_id()).await)
}

pub async fn get_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
) -> axum::response::Response {
    wallet_response(StatusCode::OK, services.fetch(owner.owner_id()).await)
}

pub async fn disable_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Json(body): Json<dto::DisableRequest>,
) -> axum::response::Response {
    if !body.is_disabled {
        return errors::wallet_error_response(WalletError::bad_input(
            "is_disabled must be true; use POST /api/v1/wallet to enable",
        ));
    }
    wallet_response(StatusCode::OK, services.disable(owner.owner_id()).await)
}

pub async fn deposit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Json(body): Json<dto::TransactionRequest>,
) -> axum::response::Response {
    let (reference_id, amount) = match body.parse() {
        Ok(parsed) => parsed,
        Err(e) => return errors::wallet_error_response(e),
    };

    match services.deposit(owner.owner_id(), reference_id, amount).await {
        Ok(tx) => errors::success(StatusCode::CREATED, dto::transaction_to_json(&tx)),
        Err(e) => errors::wallet_error_response(e),
    }
}

pub async fn withdraw(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
    Json(body): Json<dto::TransactionRequest>,
) -> axum::response::Response {
    let (reference_id, amount) = match body.parse() {
        Ok(parsed) => parsed,
        Err(e) => return errors::wallet_error_response(e),
    };

    match services.withdraw(owner.owner_id(), reference_id, amount).await {
        Ok(tx) => errors::success(StatusCode::CREATED, dto::transaction_to_json(&tx)),
        Err(e) => errors::wallet_error_response(e),
    }
}

pub async fn list_wallets(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListQuery>,
) -> axum::response::Response {
    let cursor = Cursor::from(query.cursor.unwrap_or_default());

    match services.list(&cursor, query.num.unwrap_or(0)).await {
        Ok(page) => errors::success(
            StatusCode::OK,
            serde_json::json!({
                "wallets": page.wallets.iter().map(dto::enriched_wallet_to_json).collect::<Vec<_>>(),
                "next_cursor": page.next_cursor.as_str(),
            }),
        ),
        Err(e) => errors::wallet_error_response(e),
    }
}

pub async fn get_wallet_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let wallet_id: WalletId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::wallet_error_response(e),
    };
    wallet_response(StatusCode::OK, services.get_by_id(wallet_id).await)
}

pub async fn reconcile_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let wallet_id: WalletId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::wallet_error_response(e),
    };

    match services.reconcile(wallet_id).await {
        Ok(report) => errors::success(
            StatusCode::OK,
            serde_json::json!({
                "wallet_id": report.wallet_id.to_string(),
                "cached": report.cached,
                "derived": report.derived.to_string(),
                "consistent": report.is_consistent(),
            }),
        ),
        Err(e) => errors::wallet_error_response(e),
    }
}

fn wallet_response(status: StatusCode, result: WalletResult<Wallet>) -> axum::response::Response {
    match result {
        Ok(wallet) => errors::success(
            status,
            serde_json::json!({ "wallet": dto::wallet_to_json(&wallet) }),
        ),
        Err(e) => errors::wallet_error_response(e),
    }
}
