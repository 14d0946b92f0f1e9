//! HTTP endpoints of the sponsor service.
//!
//! This is the server-side half of the system: it holds the sponsor key
//! and the rate provider's API key, and exposes
//!
//! - `POST /sponsor/payment-transaction` – assemble and co-sign a
//!   gas-sponsored payment transaction,
//! - `POST /conversion` – proxy to the backend's conversion endpoint,
//! - `POST /exchange-rate`, `POST /validation` – proxies to the rate
//!   provider, keeping its key out of clients,
//! - `GET /health`, `GET /version` – liveness and build info.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, instrument};

use crate::backend::{BackendClient, BackendError};
use crate::rates::{PretiumClient, RateError};
use crate::sponsor::{SponsorError, SponsorRequest, SponsorService, SponsoredTransactionFrame};
use crate::types::{ConversionQuote, ConversionRequest, ExchangeRate, ValidationResult};

/// Shared state of the sponsor service.
#[derive(Clone)]
pub struct AppState {
    pub sponsor: Arc<SponsorService>,
    pub backend: Arc<BackendClient>,
    pub pretium: Arc<PretiumClient>,
}

/// All routes of the sponsor service.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sponsor/payment-transaction", post(post_sponsor_payment_transaction))
        .route("/conversion", post(post_conversion))
        .route("/exchange-rate", post(post_exchange_rate))
        .route("/validation", post(post_validation))
        .route("/health", get(get_health))
        .route("/version", get(get_version))
}

/// Error envelope returned by every endpoint.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn bad_gateway(error: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            error: error.to_string(),
        }
    }

    fn bad_request(error: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.error }))).into_response()
    }
}

impl From<SponsorError> for ApiError {
    fn from(error: SponsorError) -> Self {
        match &error {
            SponsorError::InvalidAmount(_) | SponsorError::Frame(_) => Self::bad_request(error),
            _ => Self::bad_gateway(error),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(error: BackendError) -> Self {
        Self::bad_gateway(error)
    }
}

impl From<RateError> for ApiError {
    fn from(error: RateError) -> Self {
        match &error {
            RateError::NonPositiveAmount(_) => Self::bad_request(error),
            _ => Self::bad_gateway(error),
        }
    }
}

/// `POST /sponsor/payment-transaction`: assemble a fee-payer payment
/// transaction for the requesting sender and co-sign it with the sponsor
/// key. The private key never leaves this process; only the serialized
/// transaction and the sponsor's authenticator go out.
#[instrument(skip_all, fields(sender = %request.address))]
async fn post_sponsor_payment_transaction(
    State(state): State<AppState>,
    Json(request): Json<SponsorRequest>,
) -> Result<Json<SponsoredTransactionFrame>, ApiError> {
    let frame = state
        .sponsor
        .build_payment_transaction(&request)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to assemble sponsored transaction");
            ApiError::from(e)
        })?;
    Ok(Json(frame))
}

/// `POST /conversion`: proxy the asset-specific conversion quote.
#[instrument(skip_all, fields(from = %request.from, to = %request.to))]
async fn post_conversion(
    State(state): State<AppState>,
    Json(request): Json<ConversionRequest>,
) -> Result<Json<ConversionQuote>, ApiError> {
    let quote = state.backend.conversion(&request).await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
struct ExchangeRateRequest {
    currency_code: String,
}

/// `POST /exchange-rate`: proxy the fixed fiat/USD rate lookup.
#[instrument(skip_all, fields(currency = %request.currency_code))]
async fn post_exchange_rate(
    State(state): State<AppState>,
    Json(request): Json<ExchangeRateRequest>,
) -> Result<Json<ExchangeRate>, ApiError> {
    if request.currency_code.trim().is_empty() {
        return Err(ApiError::bad_request("currency_code is required"));
    }
    let rate = state.pretium.exchange_rate(&request.currency_code).await?;
    Ok(Json(rate))
}

#[derive(Debug, Deserialize)]
struct ValidationRequest {
    #[serde(rename = "type")]
    kind: String,
    shortcode: String,
    mobile_network: String,
    #[serde(default)]
    currency_code: Option<String>,
}

/// `POST /validation`: proxy recipient identity validation.
#[instrument(skip_all, fields(kind = %request.kind))]
async fn post_validation(
    State(state): State<AppState>,
    Json(request): Json<ValidationRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    let result = state
        .pretium
        .validate_identity(
            &request.kind,
            &request.shortcode,
            &request.mobile_network,
            request.currency_code.as_deref(),
        )
        .await?;
    Ok(Json(result))
}

/// `GET /health`: liveness probe.
async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /version`: crate version and sponsor account address.
async fn get_version(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "sponsor": state.sponsor.sponsor_address(),
    }))
}
