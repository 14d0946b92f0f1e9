//! Gas-sponsorship protocol.
//!
//! A two-step protocol between the client and the sponsor service:
//!
//! 1. The client asks the service for a payment transaction. The service
//!    builds a fee-payer transaction with the client as sender and the
//!    sponsor account as fee payer, signs it with the sponsor key, and
//!    returns both the unsigned transaction and the sponsor's
//!    authenticator as a base64-framed BCS blob pair.
//! 2. The client decodes the frame, signs the same message as sender, and
//!    submits with both authenticators via
//!    [`crate::chain::TransactionComposer::submit_sponsored`].
//!
//! The sponsor private key lives exclusively in the service process; no
//! client code path can reach it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use crate::chain::{
    AccountAuthenticator, EntryFunction, FeePayerTransaction, FullnodeClient, GasConfig,
    LocalSigner, TransactionPayload, TransactionSigner,
};
use crate::chain::{expiration_from_now, ChainError};
use crate::network::Network;

/// Errors raised by the sponsorship protocol.
#[derive(Debug, thiserror::Error)]
pub enum SponsorError {
    #[error("sponsor request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sponsor service returned {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed sponsored transaction frame: {0}")]
    Frame(String),

    #[error("invalid amount {0}: expected integer base units")]
    InvalidAmount(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Request for a sponsored payment transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SponsorRequest {
    /// Sender account (the payer; signs but does not pay gas).
    pub address: String,
    /// Fungible-asset metadata address being paid.
    pub metadata_address: String,
    /// Payment amount in integer base units.
    pub amount: String,
    /// Backend payment-session key bound into the transaction.
    pub payment_session_id: String,
}

/// The serialized transaction handoff: BCS bytes, base64-transported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsoredTransactionFrame {
    pub transaction: String,
    pub authenticator: String,
}

impl SponsoredTransactionFrame {
    /// Frame a fee-payer transaction and the sponsor's authenticator.
    pub fn encode(
        transaction: &FeePayerTransaction,
        authenticator: &AccountAuthenticator,
    ) -> Result<Self, SponsorError> {
        let transaction_bytes =
            bcs::to_bytes(transaction).map_err(|e| SponsorError::Frame(e.to_string()))?;
        let authenticator_bytes =
            bcs::to_bytes(authenticator).map_err(|e| SponsorError::Frame(e.to_string()))?;
        Ok(Self {
            transaction: BASE64.encode(transaction_bytes),
            authenticator: BASE64.encode(authenticator_bytes),
        })
    }

    /// Decode the frame back into the transaction and the sponsor's
    /// authenticator.
    pub fn decode(&self) -> Result<(FeePayerTransaction, AccountAuthenticator), SponsorError> {
        let transaction_bytes = BASE64
            .decode(&self.transaction)
            .map_err(|e| SponsorError::Frame(format!("transaction base64: {e}")))?;
        let authenticator_bytes = BASE64
            .decode(&self.authenticator)
            .map_err(|e| SponsorError::Frame(format!("authenticator base64: {e}")))?;
        let transaction: FeePayerTransaction = bcs::from_bytes(&transaction_bytes)
            .map_err(|e| SponsorError::Frame(format!("transaction bcs: {e}")))?;
        let authenticator: AccountAuthenticator = bcs::from_bytes(&authenticator_bytes)
            .map_err(|e| SponsorError::Frame(format!("authenticator bcs: {e}")))?;
        Ok((transaction, authenticator))
    }
}

// ============================================================================
// Server side
// ============================================================================

/// Assembles and co-signs sponsored payment transactions. Server-side only.
pub struct SponsorService {
    signer: LocalSigner,
    fullnode: FullnodeClient,
    gas: GasConfig,
    chain_id: u8,
}

impl std::fmt::Debug for SponsorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SponsorService")
            .field("sponsor_address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl SponsorService {
    /// Service holding the sponsor key, against a fullnode for a network.
    pub fn new(sponsor_key: SigningKey, fullnode: FullnodeClient, network: Network) -> Self {
        Self {
            signer: LocalSigner::new(sponsor_key),
            fullnode,
            gas: GasConfig::default(),
            chain_id: network.chain_id(),
        }
    }

    /// Address of the sponsor account paying gas.
    pub fn sponsor_address(&self) -> String {
        self.signer.address()
    }

    /// Build a fee-payer payment transaction for the requesting sender and
    /// co-sign it with the sponsor key.
    #[instrument(skip(self), fields(sender = %request.address))]
    pub async fn build_payment_transaction(
        &self,
        request: &SponsorRequest,
    ) -> Result<SponsoredTransactionFrame, SponsorError> {
        let amount: u64 = request
            .amount
            .parse()
            .map_err(|_| SponsorError::InvalidAmount(request.amount.clone()))?;

        let sequence_number = self.fullnode.sequence_number(&request.address).await?;
        let transaction = FeePayerTransaction {
            raw: crate::chain::RawTransaction {
                sender: request.address.clone(),
                sequence_number,
                payload: TransactionPayload::EntryFunction(EntryFunction::make_payment_fungible(
                    &request.metadata_address,
                    amount,
                    &request.payment_session_id,
                )),
                max_gas_amount: self.gas.max_gas_amount,
                gas_unit_price: self.gas.gas_unit_price,
                expiration_timestamp_secs: expiration_from_now(self.gas.expiration),
                chain_id: self.chain_id,
            },
            fee_payer: self.signer.address(),
        };

        let message = transaction.signing_message()?;
        let authenticator = self.signer.sign_message(&message)?;
        info!(
            session = %request.payment_session_id,
            "assembled sponsored payment transaction"
        );
        SponsoredTransactionFrame::encode(&transaction, &authenticator)
    }
}

// ============================================================================
// Client side
// ============================================================================

/// Client for the sponsor service.
#[derive(Debug, Clone)]
pub struct SponsorClient {
    base_url: Url,
    http: reqwest::Client,
}

impl SponsorClient {
    /// Client against the sponsor service base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// `POST /sponsor/payment-transaction` – fetch a co-signed frame for
    /// the given payment.
    #[instrument(skip(self), fields(sender = %request.address))]
    pub async fn payment_transaction(
        &self,
        request: &SponsorRequest,
    ) -> Result<SponsoredTransactionFrame, SponsorError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SponsorError::Frame("sponsor base URL cannot be a base".into()))?;
            path.pop_if_empty();
            path.push("sponsor");
            path.push("payment-transaction");
        }
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SponsorError::Http { status, body });
        }
        serde_json::from_str(&body).map_err(|e| SponsorError::Frame(e.to_string()))
    }
}
