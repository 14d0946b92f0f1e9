//! Fullnode REST client.
//!
//! Thin client over the chain's HTTP API: account state, fungible-asset
//! balances, transaction submission, and the wait-for-commit poll. Commit
//! polling distinguishes three terminal outcomes a caller must not
//! conflate: committed-and-succeeded, committed-but-rejected by the
//! contract ([`ChainError::ExecutionFailed`]), and never-seen within the
//! attempt budget ([`ChainError::CommitTimeout`]).

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{ChainError, SignedTransaction};

/// One fungible-asset balance record for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleAssetBalance {
    /// On-chain asset type: a metadata address or a coin-type tag.
    pub asset_type: String,
    /// Raw amount in base units, stringly on the wire.
    pub amount: String,
}

impl FungibleAssetBalance {
    /// Raw amount as an integer; malformed amounts read as zero.
    pub fn amount_base_units(&self) -> u64 {
        self.amount.parse().unwrap_or(0)
    }
}

/// Account resource returned by `GET /accounts/{address}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub sequence_number: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitResponse {
    hash: String,
}

/// Transaction record returned by `GET /transactions/by_hash/{hash}`.
#[derive(Debug, Clone, Deserialize)]
struct TransactionRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    vm_status: Option<String>,
    hash: String,
}

/// A transaction the chain committed and executed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    pub hash: String,
    pub vm_status: Option<String>,
}

/// Attempt budget for the wait-for-commit poll.
#[derive(Debug, Clone, Copy)]
pub struct CommitPollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for CommitPollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// HTTP client for a chain fullnode.
#[derive(Debug, Clone)]
pub struct FullnodeClient {
    base_url: Url,
    http: reqwest::Client,
    commit_poll: CommitPollConfig,
}

impl FullnodeClient {
    /// Client against a fullnode base URL (including the API version path).
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
            commit_poll: CommitPollConfig::default(),
        }
    }

    /// Override the wait-for-commit attempt budget.
    pub fn with_commit_poll(mut self, commit_poll: CommitPollConfig) -> Self {
        self.commit_poll = commit_poll;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChainError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ChainError::Encoding("fullnode base URL cannot be a base".into()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Current sequence number of an account.
    #[instrument(skip(self))]
    pub async fn sequence_number(&self, address: &str) -> Result<u64, ChainError> {
        let url = self.endpoint(&["accounts", address])?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ChainError::AccountNotFound(address.to_string()));
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChainError::Http { status, body });
        }
        let info: AccountInfo =
            serde_json::from_str(&body).map_err(|e| ChainError::Encoding(e.to_string()))?;
        info.sequence_number
            .parse()
            .map_err(|_| ChainError::Encoding("malformed sequence number".to_string()))
    }

    /// All fungible-asset balances held by an account. An account the chain
    /// has never seen holds nothing.
    #[instrument(skip(self))]
    pub async fn fungible_asset_balances(
        &self,
        address: &str,
    ) -> Result<Vec<FungibleAssetBalance>, ChainError> {
        let url = self.endpoint(&["accounts", address, "balances"])?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChainError::Http { status, body });
        }
        serde_json::from_str(&body).map_err(|e| ChainError::Encoding(e.to_string()))
    }

    /// Submit a signed transaction; returns its hash without waiting for
    /// execution.
    #[instrument(skip_all)]
    pub async fn submit(&self, transaction: &SignedTransaction) -> Result<String, ChainError> {
        let url = self.endpoint(&["transactions"])?;
        let response = self.http.post(url).json(transaction).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChainError::SubmissionRejected { status, body });
        }
        let submitted: SubmitResponse =
            serde_json::from_str(&body).map_err(|e| ChainError::Encoding(e.to_string()))?;
        debug!(hash = %submitted.hash, "transaction submitted");
        Ok(submitted.hash)
    }

    /// Block until a submitted transaction commits.
    ///
    /// A transaction that commits with `success == false` landed on-chain
    /// but was rejected by the contract; that is a hard failure distinct
    /// from any network or submission error.
    #[instrument(skip(self))]
    pub async fn wait_for_commit(&self, hash: &str) -> Result<CommittedTransaction, ChainError> {
        let url = self.endpoint(&["transactions", "by_hash", hash])?;
        for attempt in 1..=self.commit_poll.max_attempts {
            tokio::time::sleep(self.commit_poll.interval).await;

            let response = self.http.get(url.clone()).send().await?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                debug!(hash, attempt, "transaction not yet seen, polling");
                continue;
            }
            let body = response.text().await?;
            if !status.is_success() {
                return Err(ChainError::Http { status, body });
            }
            let record: TransactionRecord =
                serde_json::from_str(&body).map_err(|e| ChainError::Encoding(e.to_string()))?;

            if record.kind == "pending_transaction" {
                debug!(hash, attempt, "transaction pending, polling");
                continue;
            }
            return match record.success {
                Some(true) => Ok(CommittedTransaction {
                    hash: record.hash,
                    vm_status: record.vm_status,
                }),
                _ => Err(ChainError::ExecutionFailed {
                    hash: record.hash,
                    vm_status: record
                        .vm_status
                        .unwrap_or_else(|| "execution failed".to_string()),
                }),
            };
        }
        Err(ChainError::CommitTimeout {
            hash: hash.to_string(),
            attempts: self.commit_poll.max_attempts,
        })
    }
}
