//! Payment gateway callback endpoints
//!
//! The gateway posts payment outcomes here. Responses follow the gateway's
//! expectations: 200 for anything processed (including duplicates), 4xx for
//! deliveries we can never act on, 5xx when processing failed and the
//! delivery should be repeated.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{client_ip, user_agent};
use crate::services::reconciliation::{ReconciliationError, ReconciliationService};

pub struct CallbackState {
    pub reconciliation: Arc<ReconciliationService>,
}

/// POST /api/payments/callback
pub async fn handle_payment_callback(
    State(state): State<Arc<CallbackState>>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let ip = client_ip(&headers);
    let ua = user_agent(&headers);

    info!(bytes = body.len(), "Received payment callback");

    match state
        .reconciliation
        .process_callback(content_type.as_deref(), &body, ip.as_deref(), ua.as_deref())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": outcome.message,
                "status": outcome.status,
            })),
        )
            .into_response(),
        Err(ReconciliationError::MissingReference) => {
            warn!("Callback without a payment reference");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": "Missing payment reference",
                })),
            )
                .into_response()
        }
        Err(ReconciliationError::UnknownDonation { reference }) => {
            warn!(reference = %reference, "Callback for unknown donation");
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "success": false,
                    "message": "Donation not found",
                })),
            )
                .into_response()
        }
        // 5xx so the gateway redelivers once the fault clears.
        Err(e) => {
            error!(error = %e, "Callback processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Callback processing failed",
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/payments/callback
///
/// Gateway endpoint verification: echo a challenge verbatim when one is
/// given, otherwise answer with a liveness payload.
pub async fn callback_probe(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if let Some(challenge) = params.get("challenge").or_else(|| params.get("hub.challenge")) {
        return (StatusCode::OK, challenge.clone()).into_response();
    }

    Json(json!({
        "status": "ok",
        "endpoint": "payment-callback",
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}
