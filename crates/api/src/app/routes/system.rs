use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::OwnerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<OwnerContext>,
) -> axum::response::Response {
    errors::success(
        StatusCode::OK,
        serde_json::json!({
            "owner_id": owner.owner_id().to_string(),
            "backend": services.backend(),
        }),
    )
}
