//! On-chain transaction composition and submission.
//!
//! Two mutually exclusive gas modes exist:
//!
//! - **Self-paid**: the sender signs a single-signer transaction and pays
//!   its own gas ([`TransactionComposer::submit_self_paid`]).
//! - **Sponsored**: the sponsor service assembles a fee-payer transaction
//!   and co-signs it; the sender adds its own authenticator and submits
//!   with both ([`TransactionComposer::submit_sponsored`]).
//!
//! Both modes block on finality and fail hard when the contract rejects a
//! committed transaction.

mod fullnode;
mod transaction;

pub use fullnode::{
    AccountInfo, CommitPollConfig, CommittedTransaction, FullnodeClient, FungibleAssetBalance,
};
pub use transaction::{
    address_from_public_key, AccountAuthenticator, EntryFunction, FeePayerTransaction, LocalSigner,
    RawTransaction, SignedTransaction, TransactionPayload, TransactionSigner,
};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, instrument};

use crate::network::Network;

/// Chain-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid authenticator: {0}")]
    InvalidAuthenticator(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("fullnode request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("fullnode returned {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("account {0} not found on chain")]
    AccountNotFound(String),

    #[error("transaction submission rejected ({status}): {body}")]
    SubmissionRejected {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The transaction landed on-chain but the contract rejected it. Funds
    /// state may have changed; never retried automatically.
    #[error("transaction {hash} committed but execution failed: {vm_status}")]
    ExecutionFailed { hash: String, vm_status: String },

    #[error("transaction {hash} not committed after {attempts} attempts")]
    CommitTimeout { hash: String, attempts: u32 },

    #[error("sponsored transaction sender mismatch: frame carries {frame}, signer is {signer}")]
    SenderMismatch { frame: String, signer: String },
}

/// Gas parameters for composed transactions.
#[derive(Debug, Clone, Copy)]
pub struct GasConfig {
    pub max_gas_amount: u64,
    pub gas_unit_price: u64,
    /// Transaction lifetime from composition to expiry.
    pub expiration: Duration,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            max_gas_amount: 200_000,
            gas_unit_price: 100,
            expiration: Duration::from_secs(600),
        }
    }
}

/// Expiration timestamp for a transaction composed now.
pub fn expiration_from_now(lifetime: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.saturating_add(lifetime).as_secs()
}

/// Builds, signs, submits, and finalizes payment transactions.
#[derive(Debug, Clone)]
pub struct TransactionComposer {
    fullnode: FullnodeClient,
    gas: GasConfig,
    chain_id: u8,
}

impl TransactionComposer {
    /// Composer over a fullnode for a network.
    pub fn new(fullnode: FullnodeClient, network: Network) -> Self {
        Self {
            fullnode,
            gas: GasConfig::default(),
            chain_id: network.chain_id(),
        }
    }

    /// Override the default gas parameters.
    pub fn with_gas(mut self, gas: GasConfig) -> Self {
        self.gas = gas;
        self
    }

    /// The fullnode this composer submits through.
    pub fn fullnode(&self) -> &FullnodeClient {
        &self.fullnode
    }

    /// Build an unsigned transaction for the signer's account, fetching the
    /// live sequence number.
    pub async fn build_raw(
        &self,
        sender: &str,
        payload: TransactionPayload,
    ) -> Result<RawTransaction, ChainError> {
        let sequence_number = self.fullnode.sequence_number(sender).await?;
        Ok(RawTransaction {
            sender: sender.to_string(),
            sequence_number,
            payload,
            max_gas_amount: self.gas.max_gas_amount,
            gas_unit_price: self.gas.gas_unit_price,
            expiration_timestamp_secs: expiration_from_now(self.gas.expiration),
            chain_id: self.chain_id,
        })
    }

    /// Self-paid mode: sign as the sole signer, submit, and block on
    /// finality.
    #[instrument(skip_all, fields(sender = %signer.address()))]
    pub async fn submit_self_paid<S: TransactionSigner>(
        &self,
        signer: &S,
        payload: TransactionPayload,
    ) -> Result<CommittedTransaction, ChainError> {
        let raw = self.build_raw(&signer.address(), payload).await?;
        let message = raw.signing_message()?;
        let authenticator = signer.sign_message(&message)?;
        let hash = self
            .fullnode
            .submit(&SignedTransaction::SingleSigner { raw, authenticator })
            .await?;
        let committed = self.fullnode.wait_for_commit(&hash).await?;
        info!(hash = %committed.hash, "self-paid transaction committed");
        Ok(committed)
    }

    /// Sponsored mode: countersign a server-assembled fee-payer transaction
    /// and submit with the sponsor's authenticator as fee payer.
    ///
    /// The frame's sender must match the signing account, and the sponsor
    /// authenticator must actually cover the transaction being signed;
    /// both are checked before anything touches the chain.
    #[instrument(skip_all, fields(sender = %signer.address()))]
    pub async fn submit_sponsored<S: TransactionSigner>(
        &self,
        signer: &S,
        transaction: FeePayerTransaction,
        fee_payer_authenticator: AccountAuthenticator,
    ) -> Result<CommittedTransaction, ChainError> {
        let sender = signer.address();
        if transaction.raw.sender != sender {
            return Err(ChainError::SenderMismatch {
                frame: transaction.raw.sender,
                signer: sender,
            });
        }
        let message = transaction.signing_message()?;
        fee_payer_authenticator.verify(&message)?;
        let sender_authenticator = signer.sign_message(&message)?;

        let FeePayerTransaction { raw, fee_payer } = transaction;
        let hash = self
            .fullnode
            .submit(&SignedTransaction::FeePayer {
                raw,
                fee_payer,
                sender_authenticator,
                fee_payer_authenticator,
            })
            .await?;
        let committed = self.fullnode.wait_for_commit(&hash).await?;
        info!(hash = %committed.hash, "sponsored transaction committed");
        Ok(committed)
    }
}
