//! Settlement tracking for the off-chain mobile-money leg.
//!
//! After the on-chain leg commits, the backend is watched until the
//! mobile-money transfer reaches a terminal status or the attempt budget
//! runs out. Two transports expose the same terminal contract: repeated
//! polling of the status endpoints, or one server-push event stream per
//! code.
//!
//! Raw status strings are normalized into [`SettlementStatus`] here and
//! nowhere else. Exhausting the budget is [`SettlementError::Timeout`],
//! which by contract is NOT a payment failure: the on-chain leg already
//! committed, only visibility into the off-chain leg is unresolved.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendClient, BackendError};
use crate::types::{SettlementStatus, StatusReport};

/// Attempt budget for settlement polling.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

impl PollConfig {
    /// Wall-clock budget equivalent to the attempt budget, used to bound
    /// the stream transport.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Which status endpoint a code is tracked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEndpoint {
    /// `GET /status/onramp/{code}`.
    Onramp,
    /// `GET /transaction/payment/{code}`. Poll-based only.
    Payment,
}

/// How settlement status reaches us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementTransport {
    /// Repeated polling of the status endpoint.
    #[default]
    Poll,
    /// One server-push event stream per code.
    Stream,
}

/// Terminal result of a settlement watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The off-chain leg completed.
    Completed { receipt: Option<String> },
    /// The backend reported the off-chain leg failed. The caller decides
    /// how to surface this; the on-chain leg has already committed.
    Failed { reason: String },
}

/// Non-outcome terminations of a settlement watch.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// The attempt budget ran out without a terminal status. Not a payment
    /// failure.
    #[error("settlement status not terminal after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// The event stream ended before a terminal status arrived.
    #[error("settlement stream ended before a terminal status")]
    StreamEnded,

    /// The watch was torn down by its consumer.
    #[error("settlement watch cancelled")]
    Cancelled,
}

/// Watches a settlement code until terminal status, budget exhaustion, or
/// cancellation.
#[derive(Debug, Clone)]
pub struct SettlementWatcher {
    backend: BackendClient,
    config: PollConfig,
    cancel: CancellationToken,
}

impl SettlementWatcher {
    /// Watcher over a backend with the default budget.
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            config: PollConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the attempt budget.
    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    /// Tie this watcher to an external cancellation token; cancelling it
    /// tears down any in-flight poll loop or stream connection.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this watcher.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch a code over the given transport. Both transports return the
    /// same terminal contract.
    pub async fn watch(
        &self,
        endpoint: StatusEndpoint,
        transport: SettlementTransport,
        code: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        match transport {
            SettlementTransport::Poll => self.poll(endpoint, code).await,
            SettlementTransport::Stream => self.stream(code).await,
        }
    }

    /// Poll the status endpoint until a terminal status.
    ///
    /// A transient fetch or parse error consumes an attempt and the loop
    /// continues; only exhausting the budget is terminal. Returns on the
    /// first response whose status normalizes to a terminal value.
    #[instrument(skip(self), fields(attempts = self.config.max_attempts))]
    pub async fn poll(
        &self,
        endpoint: StatusEndpoint,
        code: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        for attempt in 1..=self.config.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(SettlementError::Cancelled);
            }
            match self.fetch(endpoint, code).await {
                Ok(report) => {
                    let status = report.settlement_status();
                    debug!(code, attempt, %status, "settlement status probe");
                    match status {
                        SettlementStatus::Completed => {
                            return Ok(SettlementOutcome::Completed {
                                receipt: report.receipt().map(str::to_string),
                            });
                        }
                        SettlementStatus::Failed => {
                            return Ok(SettlementOutcome::Failed {
                                reason: report
                                    .message
                                    .unwrap_or_else(|| "settlement failed".to_string()),
                            });
                        }
                        SettlementStatus::Pending | SettlementStatus::Processing => {}
                    }
                }
                Err(error) => {
                    warn!(code, attempt, %error, "settlement status probe failed, retrying");
                }
            }
            if attempt < self.config.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.interval) => {}
                    _ = self.cancel.cancelled() => return Err(SettlementError::Cancelled),
                }
            }
        }
        Err(SettlementError::Timeout {
            attempts: self.config.max_attempts,
        })
    }

    async fn fetch(&self, endpoint: StatusEndpoint, code: &str) -> Result<StatusReport, BackendError> {
        match endpoint {
            StatusEndpoint::Onramp => self.backend.onramp_status(code).await,
            StatusEndpoint::Payment => self.backend.payment_status(code).await,
        }
    }

    /// Consume the server-push status stream for a code.
    ///
    /// One connection per code; closed on terminal status, cancellation, or
    /// connection end. Bounded by the same wall-clock budget as the poll
    /// transport so both expose one timeout contract.
    #[instrument(skip(self))]
    pub async fn stream(&self, code: &str) -> Result<SettlementOutcome, SettlementError> {
        let consume = self.consume_stream(code);
        tokio::select! {
            outcome = tokio::time::timeout(self.config.budget(), consume) => match outcome {
                Ok(result) => result,
                Err(_elapsed) => Err(SettlementError::Timeout {
                    attempts: self.config.max_attempts,
                }),
            },
            _ = self.cancel.cancelled() => Err(SettlementError::Cancelled),
        }
    }

    async fn consume_stream(&self, code: &str) -> Result<SettlementOutcome, SettlementError> {
        let url = match self.backend.status_stream_url(code) {
            Ok(url) => url,
            Err(error) => {
                warn!(code, %error, "cannot build stream URL");
                return Err(SettlementError::StreamEnded);
            }
        };
        let response = match reqwest::Client::new()
            .get(url)
            .header("accept", "text/event-stream")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(code, status = %response.status(), "stream connection refused");
                return Err(SettlementError::StreamEnded);
            }
            Err(error) => {
                warn!(code, %error, "stream connection failed");
                return Err(SettlementError::StreamEnded);
            }
        };

        let mut response = response;
        let mut parser = SseParser::default();
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                // Clean end of stream or a dropped connection: either way
                // no terminal status arrived.
                Ok(None) => return Err(SettlementError::StreamEnded),
                Err(error) => {
                    warn!(code, %error, "stream read failed");
                    return Err(SettlementError::StreamEnded);
                }
            };
            for data in parser.push(&String::from_utf8_lossy(&chunk)) {
                let report: StatusReport = match serde_json::from_str(&data) {
                    Ok(report) => report,
                    Err(error) => {
                        warn!(code, %error, "unparseable stream event, skipping");
                        continue;
                    }
                };
                let status = report.settlement_status();
                debug!(code, %status, "settlement stream event");
                match status {
                    SettlementStatus::Completed => {
                        return Ok(SettlementOutcome::Completed {
                            receipt: report.receipt().map(str::to_string),
                        });
                    }
                    SettlementStatus::Failed => {
                        return Ok(SettlementOutcome::Failed {
                            reason: report
                                .message
                                .unwrap_or_else(|| "settlement failed".to_string()),
                        });
                    }
                    SettlementStatus::Pending | SettlementStatus::Processing => {}
                }
            }
        }
    }
}

/// Incremental `text/event-stream` frame parser.
///
/// Accumulates raw chunks and yields the `data:` payload of each completed
/// event (events are separated by a blank line). `event:` names and
/// comments are ignored; multi-line data is joined with newlines per the
/// SSE framing rules.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Feed a chunk; returns the data payloads of every event completed by
    /// it.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        // Normalize CRLF framing before splitting on blank lines.
        while let Some(boundary) = find_event_boundary(&self.buffer) {
            let (head, sep) = boundary;
            let event_text: String = self.buffer.drain(..head + sep).collect();
            let data_lines: Vec<&str> = event_text
                .lines()
                .filter_map(|line| {
                    line.strip_prefix("data:")
                        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                })
                .collect();
            if !data_lines.is_empty() {
                events.push(data_lines.join("\n"));
            }
        }
        events
    }
}

/// Locate the first blank-line event separator; returns (offset, length).
fn find_event_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|i| (i, 2));
    let crlf = buffer.find("\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
