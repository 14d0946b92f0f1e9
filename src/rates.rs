//! Conversion-rate resolution.
//!
//! Two independent rate paths exist and must never be conflated:
//!
//! 1. The asset-specific conversion quote (`POST /conversion`), which is the
//!    only path allowed to size an on-chain payment. No quote means no
//!    submission, and the flow blocks rather than substituting a default.
//! 2. The fixed fiat/USD exchange rate from the rate provider, a fallback
//!    used for generic display math only.
//!
//! [`RateQuote`] keeps the distinction in the type system: the required
//! asset amount is derivable only from the asset-specific variant.

use rust_decimal::Decimal;
use tracing::instrument;
use url::Url;

use crate::backend::{BackendClient, BackendError};
use crate::types::{ConversionQuote, ConversionRequest, ExchangeRate, ValidationResult};

/// Errors raised while resolving rates.
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("conversion amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("no asset-specific quote available; refusing to size a payment from a display rate")]
    QuoteUnavailable,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("rate provider returned {status}: {body}")]
    Provider { status: reqwest::StatusCode, body: String },

    #[error("rate provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate provider response carried no buying rate for {0}")]
    MissingRate(String),
}

/// A resolved rate, tagged by which path produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RateQuote {
    /// Asset-specific quote; authoritative for payment sizing.
    Asset(ConversionQuote),
    /// Fixed fiat/USD rate; display fallback only.
    FixedUsd(ExchangeRate),
}

impl RateQuote {
    /// The exact asset amount a payment of the quoted fiat amount requires.
    ///
    /// Only an asset-specific quote can answer this; a fixed USD rate is
    /// not a substitute and yields [`RateError::QuoteUnavailable`].
    pub fn required_asset_amount(&self) -> Result<Decimal, RateError> {
        match self {
            RateQuote::Asset(quote) => Ok(quote.converted),
            RateQuote::FixedUsd(_) => Err(RateError::QuoteUnavailable),
        }
    }

    /// Whether this quote came from the fallback path.
    pub fn is_fallback(&self) -> bool {
        matches!(self, RateQuote::FixedUsd(_))
    }
}

/// Resolves conversion rates against the payment backend, with the fixed
/// exchange-rate provider as display fallback.
#[derive(Debug, Clone)]
pub struct RateResolver {
    backend: BackendClient,
    pretium: Option<PretiumClient>,
}

impl RateResolver {
    /// Resolver over the backend conversion endpoint only.
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            pretium: None,
        }
    }

    /// Attach the fixed exchange-rate fallback.
    pub fn with_fallback(mut self, pretium: PretiumClient) -> Self {
        self.pretium = Some(pretium);
        self
    }

    /// Fetch an asset-specific conversion quote.
    ///
    /// Identifiers are lower-cased for the backend. The quote is ephemeral:
    /// callers must re-fetch whenever `from`, `to`, or `amount` changes.
    #[instrument(skip(self))]
    pub async fn conversion(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<ConversionQuote, RateError> {
        if amount <= Decimal::ZERO {
            return Err(RateError::NonPositiveAmount(amount));
        }
        let request = ConversionRequest {
            from: from.to_ascii_lowercase(),
            to: to.to_ascii_lowercase(),
            amount,
        };
        Ok(self.backend.conversion(&request).await?)
    }

    /// Resolve a display rate: the asset-specific quote when available,
    /// falling back to the fixed USD rate when the conversion endpoint
    /// cannot serve one and a fallback provider is configured.
    #[instrument(skip(self))]
    pub async fn display_quote(
        &self,
        fiat_currency: &str,
        asset_symbol: &str,
        amount: Decimal,
    ) -> Result<RateQuote, RateError> {
        match self.conversion(fiat_currency, asset_symbol, amount).await {
            Ok(quote) => Ok(RateQuote::Asset(quote)),
            Err(RateError::NonPositiveAmount(a)) => Err(RateError::NonPositiveAmount(a)),
            Err(primary) => match &self.pretium {
                Some(pretium) => {
                    tracing::warn!(error = %primary, "conversion unavailable, using fixed-rate fallback for display");
                    let rate = pretium.exchange_rate(fiat_currency).await?;
                    Ok(RateQuote::FixedUsd(rate))
                }
                None => Err(primary),
            },
        }
    }
}

/// Client for the fixed exchange-rate and identity-validation provider.
#[derive(Debug, Clone)]
pub struct PretiumClient {
    base_url: Url,
    api_key: String,
    http: reqwest::Client,
}

/// Envelope the rate provider wraps every response in.
#[derive(Debug, serde::Deserialize)]
struct ProviderEnvelope<T> {
    data: Option<T>,
}

impl PretiumClient {
    /// Create a client with the provider base URL and API key.
    pub fn new(base_url: Url, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn v1(&self, segments: &[&str]) -> Result<Url, RateError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                RateError::Provider {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "rate provider base URL cannot be a base".to_string(),
                }
            })?;
            path.pop_if_empty();
            path.push("v1");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        body: serde_json::Value,
    ) -> Result<T, RateError> {
        let url = self.v1(segments)?;
        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RateError::Provider { status, body: text });
        }
        serde_json::from_str(&text).map_err(|e| RateError::Provider {
            status,
            body: e.to_string(),
        })
    }

    /// `POST /v1/exchange-rate` – fixed fiat/USD rate for a currency code.
    #[instrument(skip(self))]
    pub async fn exchange_rate(&self, currency_code: &str) -> Result<ExchangeRate, RateError> {
        let envelope: ProviderEnvelope<ExchangeRate> = self
            .post(
                &["exchange-rate"],
                serde_json::json!({ "currency_code": currency_code }),
            )
            .await?;
        envelope
            .data
            .ok_or_else(|| RateError::MissingRate(currency_code.to_string()))
    }

    /// `POST /v1/validation[/{currency}]` – validate a recipient identity.
    ///
    /// The provider routes the home market at the bare endpoint and other
    /// markets under a currency suffix.
    #[instrument(skip(self))]
    pub async fn validate_identity(
        &self,
        kind: &str,
        shortcode: &str,
        mobile_network: &str,
        currency_code: Option<&str>,
    ) -> Result<ValidationResult, RateError> {
        let body = serde_json::json!({
            "type": kind,
            "shortcode": shortcode,
            "mobile_network": mobile_network,
        });
        match currency_code.filter(|c| !c.eq_ignore_ascii_case("KES")) {
            Some(currency) => self.post(&["validation", currency], body).await,
            None => self.post(&["validation"], body).await,
        }
    }
}
