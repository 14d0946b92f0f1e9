//! Core domain types shared across the payment flows.
//!
//! Everything the backend speaks JSON about lives here: the currency and
//! provider catalogs, payment methods and sessions, settlement records, and
//! the closed [`SettlementStatus`] enum that raw backend status strings are
//! normalized into at the settlement boundary.
//!
//! Amounts are [`rust_decimal::Decimal`] end to end. Raw on-chain balances
//! are integer base units carried as strings on the wire; the conversion
//! helpers live in [`crate::balances`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

// ============================================================================
// Catalog types
// ============================================================================

/// Whether a catalog entry denominates fiat money or an on-chain asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrencyType {
    Fiat,
    Crypto,
}

/// One entry of the backend's supported-currencies catalog (`GET /currencies`).
///
/// Fiat entries carry a country and no chain data; crypto entries carry the
/// on-chain address and decimals of the fungible asset. The gas coin is the
/// one crypto entry whose `address` is a placeholder rather than its live
/// resource type, see [`crate::network::GAS_COIN_TYPE_TAG`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedCurrency {
    pub currency_type: CurrencyType,
    pub name: String,
    pub symbol: String,
    pub id: String,
    pub country: Option<String>,
    #[serde(default)]
    pub description: String,
    pub chain: Option<String>,
    pub address: Option<String>,
    pub is_fungible_asset: Option<bool>,
    pub decimals: Option<u32>,
}

/// A mobile-money provider as returned by `GET /providers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub provider_type: String,
    pub supported_currency: SupportedCurrency,
}

/// Filter a raw catalog down to unique crypto entries, first occurrence wins.
pub fn crypto_currencies(catalog: &[SupportedCurrency]) -> Vec<SupportedCurrency> {
    dedup_by_id(catalog, CurrencyType::Crypto)
}

/// Filter a raw catalog down to unique fiat entries, first occurrence wins.
pub fn fiat_currencies(catalog: &[SupportedCurrency]) -> Vec<SupportedCurrency> {
    dedup_by_id(catalog, CurrencyType::Fiat)
}

fn dedup_by_id(catalog: &[SupportedCurrency], kind: CurrencyType) -> Vec<SupportedCurrency> {
    let mut seen = std::collections::HashSet::new();
    catalog
        .iter()
        .filter(|c| c.currency_type == kind)
        .filter(|c| seen.insert(c.id.clone()))
        .cloned()
        .collect()
}

// ============================================================================
// Payment methods and sessions
// ============================================================================

/// Payment method type understood by the backend. Mobile money is the only
/// kind in production today.
pub const PAYMENT_METHOD_TYPE_MOBILE_MONEY: &str = "mobile-money";

/// A stored mobile-money identity, reusable across payment sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub owner: String,
    pub payment_method_type: String,
    /// Phone number or paybill/till shortcode.
    pub identity: String,
    pub provider_id: String,
    /// RFC 3339 creation timestamp. Used for latest-wins de-duplication.
    #[serde(default)]
    pub created_at: String,
}

/// Request body for `POST /payment-method`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentMethod {
    pub owner: String,
    pub payment_method_type: String,
    pub identity: String,
    pub provider_id: String,
}

/// Response of `POST /payment-method`.
///
/// The backend has returned the fresh method's key under both `id` and
/// `address` over time; accept either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodCreated {
    #[serde(alias = "address")]
    pub id: String,
}

/// Request body for `POST /create-payment-session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentSession {
    pub payer: String,
    pub provider: String,
    pub receiver_id: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_buy_goods: Option<bool>,
}

/// A backend-tracked payment session. Immutable once created; its key is
/// both the memo argument of the on-chain transaction and the settlement
/// polling handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Session key under its current name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Session key under its legacy name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub payer: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_buy_goods: Option<bool>,
}

impl PaymentSession {
    /// The session key, whichever field the backend populated.
    pub fn key(&self) -> Option<&str> {
        self.session_id.as_deref().or(self.id.as_deref())
    }
}

// ============================================================================
// On-ramp
// ============================================================================

/// Request body for `POST /on-ramp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOnramp {
    pub payment_method_id: String,
    pub amount: Decimal,
    pub target_token: String,
}

/// Response of `POST /on-ramp`: the settlement tracking code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnrampInitiated {
    pub code: String,
}

// ============================================================================
// Settlement records
// ============================================================================

/// A settlement status report, as polled from the status endpoints or
/// framed over the server-push stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusData>,
}

/// Optional receipt payload attached to a terminal status report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StatusReport {
    /// Normalized view of the raw status string.
    pub fn settlement_status(&self) -> SettlementStatus {
        SettlementStatus::parse(&self.status)
    }

    /// Receipt reference, if the backend attached one.
    pub fn receipt(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.receipt.as_deref())
    }
}

/// Closed settlement status.
///
/// The backend reports status strings with inconsistent casing
/// (`Completed`/`completed`/`Success`/`success`); every comparison in this
/// crate goes through [`SettlementStatus::parse`] at the settlement
/// boundary, and raw strings never travel further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// Off-chain leg not started or awaiting the provider.
    Pending,
    /// In flight; also the bucket for status strings we do not recognize,
    /// which keeps a poll alive rather than inventing a terminal meaning.
    Processing,
    /// Off-chain leg confirmed complete.
    Completed,
    /// Off-chain leg reported failed by the provider.
    Failed,
}

impl SettlementStatus {
    /// Normalize a raw backend status string, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" | "success" => SettlementStatus::Completed,
            "failed" | "error" => SettlementStatus::Failed,
            "pending" => SettlementStatus::Pending,
            _ => SettlementStatus::Processing,
        }
    }

    /// Whether this status ends a settlement watch.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementStatus::Completed | SettlementStatus::Failed)
    }
}

impl Display for SettlementStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementStatus::Pending => write!(f, "pending"),
            SettlementStatus::Processing => write!(f, "processing"),
            SettlementStatus::Completed => write!(f, "completed"),
            SettlementStatus::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Transaction history
// ============================================================================

/// History endpoint selector for `GET /transactions/{type}/{address}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Onramp,
    Offramp,
    Payment,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Onramp => write!(f, "onramp"),
            TransactionKind::Offramp => write!(f, "offramp"),
            TransactionKind::Payment => write!(f, "payment"),
        }
    }
}

/// A settled or in-flight on-ramp record from the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnrampTransaction {
    pub id: String,
    pub status: String,
    pub requester: String,
    pub payment_method_id: String,
    pub transaction_ref: String,
    pub amount: String,
    pub target_token: String,
    #[serde(default)]
    pub final_token_quote: Option<String>,
    #[serde(default)]
    pub on_chain_transaction_hash: Option<String>,
    #[serde(default)]
    pub requested_at: String,
    #[serde(default)]
    pub finalized_at: Option<String>,
    #[serde(default)]
    pub data: Option<StatusData>,
}

/// A pay/off-ramp record from the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub status: String,
    pub payment_provider_id: String,
    pub payment_identity: String,
    #[serde(default)]
    pub account_identity: Option<String>,
    pub payer: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    pub transferred_amount: String,
    pub transferred_token: String,
    #[serde(default)]
    pub final_fiat_value: Option<String>,
    #[serde(default)]
    pub transaction_code: Option<String>,
    #[serde(default)]
    pub requested_at: String,
    #[serde(default)]
    pub finalized_at: Option<String>,
    #[serde(default)]
    pub data: Option<StatusData>,
}

// ============================================================================
// Rates
// ============================================================================

/// An asset-specific conversion quote from `POST /conversion`.
///
/// `converted` is denominated in the `to` asset; the two `usd_quote` fields
/// are the USD prices of the respective denominations at quote time. A quote
/// is ephemeral and must be re-fetched whenever `from`, `to`, or the amount
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub converted: Decimal,
    pub from_usd_quote: Decimal,
    pub to_usd_quote: Decimal,
}

/// Request body for `POST /conversion`. Identifiers are lower-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

/// Fixed fiat/USD exchange rate from the rate provider, the fallback
/// display path when an asset-specific quote is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub buying_rate: Decimal,
    #[serde(default)]
    pub selling_rate: Option<Decimal>,
    #[serde(default)]
    pub quoted_rate: Option<Decimal>,
}

// ============================================================================
// Payment kinds
// ============================================================================

/// The shape of the fiat leg's recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    /// Direct transfer to a phone number.
    Mobile,
    /// Paybill payment; requires a separate account number and never
    /// registers a stored payment method.
    Paybill,
    /// Merchant till ("buy goods") payment.
    BuyGoods,
}

impl PaymentKind {
    /// Paybill payments carry the target account separately from the
    /// shortcode and cannot submit without it.
    pub fn requires_account_number(&self) -> bool {
        matches!(self, PaymentKind::Paybill)
    }

    /// Whether this kind may persist a reusable payment method. Paybill is
    /// always a fresh manual entry.
    pub fn supports_stored_method(&self) -> bool {
        !matches!(self, PaymentKind::Paybill)
    }
}

/// Recipient identity validation response from the rate provider's
/// validation endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(default)]
    pub data: Option<ValidationData>,
}

/// Payload of a successful identity validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationData {
    #[serde(default)]
    pub public_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_status_normalizes_known_casings() {
        for raw in ["Completed", "completed", "Success", "success", " COMPLETED "] {
            assert_eq!(SettlementStatus::parse(raw), SettlementStatus::Completed);
        }
        for raw in ["Failed", "failed", "error", "Error"] {
            assert_eq!(SettlementStatus::parse(raw), SettlementStatus::Failed);
        }
        assert_eq!(SettlementStatus::parse("Pending"), SettlementStatus::Pending);
    }

    #[test]
    fn unknown_status_is_non_terminal() {
        let status = SettlementStatus::parse("reconciling");
        assert_eq!(status, SettlementStatus::Processing);
        assert!(!status.is_terminal());
    }

    #[test]
    fn session_key_prefers_session_id() {
        let session = PaymentSession {
            session_id: Some("s-1".into()),
            id: Some("legacy".into()),
            ..empty_session()
        };
        assert_eq!(session.key(), Some("s-1"));

        let legacy_only = PaymentSession {
            session_id: None,
            id: Some("legacy".into()),
            ..empty_session()
        };
        assert_eq!(legacy_only.key(), Some("legacy"));
    }

    #[test]
    fn payment_method_created_accepts_either_key_name() {
        let by_id: PaymentMethodCreated = serde_json::from_str(r#"{"id":"pm-1"}"#).unwrap();
        assert_eq!(by_id.id, "pm-1");
        let by_address: PaymentMethodCreated =
            serde_json::from_str(r#"{"address":"pm-2"}"#).unwrap();
        assert_eq!(by_address.id, "pm-2");
    }

    #[test]
    fn catalog_dedup_keeps_first_occurrence_per_id() {
        let catalog = vec![
            currency("apt", "APT", CurrencyType::Crypto),
            currency("apt", "APT", CurrencyType::Crypto),
            currency("usdc", "USDC", CurrencyType::Crypto),
            currency("kes", "KES", CurrencyType::Fiat),
        ];
        let crypto = crypto_currencies(&catalog);
        assert_eq!(crypto.len(), 2);
        assert_eq!(fiat_currencies(&catalog).len(), 1);
    }

    #[test]
    fn paybill_rules() {
        assert!(PaymentKind::Paybill.requires_account_number());
        assert!(!PaymentKind::Paybill.supports_stored_method());
        assert!(PaymentKind::Mobile.supports_stored_method());
        assert!(!PaymentKind::BuyGoods.requires_account_number());
    }

    fn empty_session() -> PaymentSession {
        PaymentSession {
            session_id: None,
            id: None,
            payer: String::new(),
            provider: String::new(),
            receiver_id: String::new(),
            token: String::new(),
            account_identity: None,
            is_buy_goods: None,
        }
    }

    fn currency(id: &str, symbol: &str, kind: CurrencyType) -> SupportedCurrency {
        SupportedCurrency {
            currency_type: kind,
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            id: id.to_string(),
            country: None,
            description: String::new(),
            chain: None,
            address: None,
            is_fungible_asset: None,
            decimals: None,
        }
    }
}
