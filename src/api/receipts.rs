//! Receipt endpoints: download and resend

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::services::receipt::{ReceiptError, ReceiptService};

pub struct ReceiptApiState {
    pub receipts: Arc<ReceiptService>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub reference: Option<String>,
}

/// GET /api/receipts/download?reference=
pub async fn download_receipt(
    State(state): State<Arc<ReceiptApiState>>,
    Query(query): Query<DownloadQuery>,
) -> impl IntoResponse {
    let Some(reference) = query
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Missing payment reference",
            })),
        )
            .into_response();
    };

    match state.receipts.download_by_reference(reference).await {
        Ok(rendered) => {
            info!(reference = %reference, filename = %rendered.filename, "Receipt downloaded");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, rendered.content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", rendered.filename),
                    ),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
                rendered.bytes,
            )
                .into_response()
        }
        Err(ReceiptError::NotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": "Donation not found",
            })),
        )
            .into_response(),
        Err(ReceiptError::NotReady { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Receipt is not available until the payment completes",
            })),
        )
            .into_response(),
        Err(e) => {
            error!(reference = %reference, error = %e, "Receipt download failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Receipt download failed. Please try again later",
                })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub reference: Option<String>,
}

/// POST /api/receipts/resend
pub async fn resend_receipt(
    State(state): State<Arc<ReceiptApiState>>,
    Json(request): Json<ResendRequest>,
) -> impl IntoResponse {
    let Some(reference) = request
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Missing payment reference",
            })),
        )
            .into_response();
    };

    match state.receipts.resend_by_reference(reference).await {
        Ok(email) => {
            info!(reference = %reference, to = %email, "Receipt resent");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "email": email,
                })),
            )
                .into_response()
        }
        Err(ReceiptError::NotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": "Donation not found",
            })),
        )
            .into_response(),
        Err(ReceiptError::NotReady { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Receipt is not available until the payment completes",
            })),
        )
            .into_response(),
        Err(ReceiptError::EmailMissing { .. }) => {
            warn!(reference = %reference, "Resend refused: no donor email on file");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": "This donation has no donor email on file",
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(reference = %reference, error = %e, "Receipt resend failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": format!("Failed to resend receipt: {}", e),
                })),
            )
                .into_response()
        }
    }
}
