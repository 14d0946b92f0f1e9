//! Typed client for the remote payment backend.
//!
//! Every endpoint the payment flows consume is wrapped here: account
//! registration, payment methods, payment sessions, on-ramp initiation,
//! settlement status, transaction history, and the currency/provider
//! catalogs. All calls are one-shot; mutating endpoints are never retried
//! automatically, since a blind retry risks duplicate sessions or duplicate
//! method registration.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::types::{
    ConversionQuote, ConversionRequest, NewOnramp, NewPaymentMethod, NewPaymentSession,
    OnrampInitiated, OnrampTransaction, PaymentMethod, PaymentMethodCreated, PaymentSession,
    PaymentTransaction, Provider, StatusReport, SupportedCurrency, TransactionKind,
};

/// Errors surfaced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend returned {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("payment session response carried no session id")]
    MissingSessionKey,
}

/// Result of the idempotent account registration.
///
/// The backend signals "this address is already registered" with HTTP 500;
/// that convention is the idempotency contract, so no client-local
/// registered-address tracking exists anywhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountCreation {
    Created,
    AlreadyExists,
}

/// HTTP client for the payment backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl BackendClient {
    /// Create a client against the given base URL.
    pub fn new(base_url: Url, api_key: Option<String>) -> Self {
        Self {
            base_url,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// The backend base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of the server-push settlement stream for a code.
    pub fn status_stream_url(&self, code: &str) -> Result<Url, BackendError> {
        self.endpoint(&["status", code])
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::Decode("backend base URL cannot be a base".into()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "backend GET");
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        Self::read_json(request.send().await?).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "backend POST");
        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        Self::read_json(request.send().await?).await
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Http { status, body });
        }
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    /// `POST /account` – idempotent account registration.
    ///
    /// HTTP 500 means the address is already registered and is not an error.
    #[instrument(skip(self))]
    pub async fn create_account(&self, address: &str) -> Result<AccountCreation, BackendError> {
        let url = self.endpoint(&["account"])?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "address": address }))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            debug!(address, "account registered");
            return Ok(AccountCreation::Created);
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            debug!(address, "account already registered");
            return Ok(AccountCreation::AlreadyExists);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Http { status, body })
    }

    /// `POST /payment-method` – register a mobile-money identity for reuse.
    #[instrument(skip(self, method), fields(provider = %method.provider_id))]
    pub async fn add_payment_method(
        &self,
        method: &NewPaymentMethod,
    ) -> Result<PaymentMethodCreated, BackendError> {
        self.post_json(&["payment-method"], method).await
    }

    /// `GET /payment-methods/{address}` – stored methods for an owner,
    /// de-duplicated by identity with the most recently created entry
    /// winning.
    #[instrument(skip(self))]
    pub async fn payment_methods(&self, address: &str) -> Result<Vec<PaymentMethod>, BackendError> {
        let raw: Vec<PaymentMethod> = self.get_json(&["payment-methods", address]).await?;
        Ok(dedup_latest_by_identity(raw))
    }

    /// `POST /create-payment-session` – one session per payment attempt,
    /// never reused across attempts.
    #[instrument(skip(self, session), fields(provider = %session.provider))]
    pub async fn create_payment_session(
        &self,
        session: &NewPaymentSession,
    ) -> Result<PaymentSession, BackendError> {
        let created: PaymentSession = self.post_json(&["create-payment-session"], session).await?;
        if created.key().is_none() {
            warn!("payment session created without a key");
            return Err(BackendError::MissingSessionKey);
        }
        Ok(created)
    }

    /// `POST /on-ramp` – initiate a fiat-to-crypto purchase; returns the
    /// settlement tracking code.
    #[instrument(skip(self, onramp))]
    pub async fn initiate_onramp(&self, onramp: &NewOnramp) -> Result<OnrampInitiated, BackendError> {
        self.post_json(&["on-ramp"], onramp).await
    }

    /// `GET /status/onramp/{code}` – one on-ramp settlement status probe.
    pub async fn onramp_status(&self, code: &str) -> Result<StatusReport, BackendError> {
        self.get_json(&["status", "onramp", code]).await
    }

    /// `GET /transaction/payment/{code}` – one pay-flow settlement status
    /// probe.
    pub async fn payment_status(&self, code: &str) -> Result<StatusReport, BackendError> {
        self.get_json(&["transaction", "payment", code]).await
    }

    /// `GET /transactions/onramp/{address}` – on-ramp history.
    #[instrument(skip(self))]
    pub async fn onramp_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<OnrampTransaction>, BackendError> {
        self.get_json(&["transactions", &TransactionKind::Onramp.to_string(), address])
            .await
    }

    /// `GET /transactions/{payment|offramp}/{address}` – pay-flow history.
    #[instrument(skip(self))]
    pub async fn payment_transactions(
        &self,
        kind: TransactionKind,
        address: &str,
    ) -> Result<Vec<PaymentTransaction>, BackendError> {
        self.get_json(&["transactions", &kind.to_string(), address])
            .await
    }

    /// `GET /providers` – mobile-money provider catalog.
    pub async fn providers(&self) -> Result<Vec<Provider>, BackendError> {
        self.get_json(&["providers"]).await
    }

    /// `GET /currencies` – supported fiat and crypto currency catalog.
    pub async fn currencies(&self) -> Result<Vec<SupportedCurrency>, BackendError> {
        self.get_json(&["currencies"]).await
    }

    /// `POST /conversion` – asset-specific conversion quote.
    #[instrument(skip(self), fields(from = %request.from, to = %request.to))]
    pub async fn conversion(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionQuote, BackendError> {
        self.post_json(&["conversion"], request).await
    }
}

/// Collapse a method list to one entry per identity, keeping the most
/// recently created duplicate.
///
/// `created_at` is RFC 3339 in UTC, which orders lexicographically.
fn dedup_latest_by_identity(methods: Vec<PaymentMethod>) -> Vec<PaymentMethod> {
    let mut unique: Vec<PaymentMethod> = Vec::with_capacity(methods.len());
    for method in methods {
        match unique.iter_mut().find(|m| m.identity == method.identity) {
            Some(existing) => {
                if method.created_at > existing.created_at {
                    *existing = method;
                }
            }
            None => unique.push(method),
        }
    }
    unique
}
