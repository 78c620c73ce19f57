//! Donor-facing donation endpoints: intake and payment retry

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{client_ip, user_agent};
use crate::error::AppError;
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::origin::is_trusted_origin;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::intent::{DonationIntent, IntentService};
use crate::services::retry::{RetryError, RetryService};

pub struct DonationApiState {
    pub intent: Arc<IntentService>,
    pub retry: Arc<RetryService>,
    pub rate_limiter: RateLimiter,
    pub trusted_origins: Vec<String>,
}

/// POST /api/donations
pub async fn create_donation(
    State(state): State<Arc<DonationApiState>>,
    headers: axum::http::HeaderMap,
    Json(intent): Json<DonationIntent>,
) -> impl IntoResponse {
    let ip = client_ip(&headers);
    let ua = user_agent(&headers);

    match state
        .intent
        .create_donation(intent, ip.as_deref(), ua.as_deref())
        .await
    {
        Ok(outcome) => {
            info!(reference = %outcome.reference, "Donation created");
            (
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "reference": outcome.reference,
                    "billCode": outcome.bill_code,
                    "redirectUrl": outcome.redirect_url,
                })),
            )
                .into_response()
        }
        Err(e) => {
            let mut app_error = AppError::from(e);
            if let Some(request_id) = get_request_id_from_headers(&headers) {
                app_error = app_error.with_request_id(request_id);
            }
            app_error.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub reference: Option<String>,
}

/// POST /api/donations/retry
pub async fn retry_donation(
    State(state): State<Arc<DonationApiState>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<RetryRequest>,
) -> impl IntoResponse {
    if !is_trusted_origin(&headers, &state.trusted_origins) {
        warn!("Retry refused: untrusted origin");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "message": "Origin not allowed",
            })),
        )
            .into_response();
    }

    let ip = client_ip(&headers);
    let rate_key = format!("retry:{}", ip.as_deref().unwrap_or("unknown"));
    if let Err(exceeded) = state.rate_limiter.check(&rate_key).await {
        warn!(
            retry_after_secs = exceeded.retry_after_secs,
            "Retry refused: rate limited"
        );
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "message": "Too many retry attempts. Please wait before trying again",
            })),
        )
            .into_response();
        if let Ok(value) = exceeded.retry_after_secs.to_string().parse() {
            response.headers_mut().insert("Retry-After", value);
        }
        return response;
    }

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

    info!(reference = %reference, "Payment retry requested");

    match state
        .retry
        .initiate_retry(reference, ip.as_deref(), user_agent(&headers).as_deref())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "redirectUrl": outcome.redirect_url,
                "attemptNumber": outcome.attempt_number,
                "reference": outcome.reference,
            })),
        )
            .into_response(),
        Err(RetryError::NotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": "Donation not found",
            })),
        )
            .into_response(),
        Err(
            e @ (RetryError::AlreadyCompleted { .. }
            | RetryError::AlreadyRefunded { .. }
            | RetryError::MaxAttemptsExceeded { .. }),
        ) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": AppError::from(e).user_message(),
            })),
        )
            .into_response(),
        Err(RetryError::GatewayNotConfigured) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Payment gateway is not configured. Please contact the foundation",
            })),
        )
            .into_response(),
        Err(RetryError::Gateway(gateway)) => {
            error!(reference = %reference, error = %gateway, "Retry failed at the gateway");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": format!("Payment retry failed: {}", gateway),
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(reference = %reference, error = %e, "Retry failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Payment retry failed. Please try again later",
                })),
            )
                .into_response()
        }
    }
}
