use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use walletd_core::WalletError;

/// Every wallet failure maps to exactly one status.
pub fn status_for(err: &WalletError) -> StatusCode {
    match err {
        WalletError::NotFound(_) | WalletError::Disabled => StatusCode::NOT_FOUND,
        WalletError::AlreadyExists(_) | WalletError::Conflict(_) => StatusCode::CONFLICT,
        WalletError::AlreadyEnabled
        | WalletError::AlreadyDisabled
        | WalletError::BadCursor(_)
        | WalletError::BadInput(_) => StatusCode::BAD_REQUEST,
        WalletError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WalletError::Unauthenticated => StatusCode::UNAUTHORIZED,
        WalletError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        WalletError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn wallet_error_response(err: WalletError) -> axum::response::Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(code = err.code(), error = %err, "wallet request failed");
    }
    json_error(status, err.code(), err.to_string())
}

/// `{"status": "success", "data": ...}`
pub fn success(status: StatusCode, data: impl Serialize) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "status": "success",
            "data": data,
        })),
    )
        .into_response()
}

/// `{"status": "fail", "data": {"error": ..., "message": ...}}`
pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "status": "fail",
            "data": {
                "error": code,
                "message": message.into(),
            },
        })),
    )
        .into_response()
}
