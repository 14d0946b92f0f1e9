//! The payment orchestration state machine.
//!
//! One parameterized orchestrator runs both user-initiated flows:
//!
//! - **On-ramp**: register (or reuse) a mobile-money payment method,
//!   initiate the purchase, and monitor settlement.
//! - **Pay**: create a payment session, conditionally register a payment
//!   method, deposit to the payment contract on-chain, and monitor the
//!   off-chain settlement leg.
//!
//! The transport and gas-mode variants that used to be copy-pasted flows
//! are a [`FlowStrategy`] chosen at construction. Steps run strictly
//! sequentially; every transition is one-way and published through a watch
//! channel; a failed attempt restarts from idle with a brand-new session.
//! Double submission is structurally impossible: an atomic in-flight flag
//! admits one flow at a time, independent of any UI disablement.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backend::{BackendClient, BackendError};
use crate::balances::{to_base_units, AmountError, BalanceSheet, DEFAULT_DECIMALS};
use crate::chain::{
    ChainError, EntryFunction, TransactionComposer, TransactionPayload, TransactionSigner,
};
use crate::network::GAS_COIN_METADATA_ADDRESS;
use crate::rates::{RateError, RateResolver};
use crate::settlement::{
    PollConfig, SettlementError, SettlementOutcome, SettlementTransport, SettlementWatcher,
    StatusEndpoint,
};
use crate::sponsor::{SponsorClient, SponsorError, SponsorRequest};
use crate::types::{
    crypto_currencies, NewOnramp, NewPaymentMethod, NewPaymentSession, PaymentKind,
    SupportedCurrency, PAYMENT_METHOD_TYPE_MOBILE_MONEY,
};

/// Minimum accepted fiat amount, in units of the local currency.
pub static MIN_FIAT_AMOUNT: Lazy<Decimal> = Lazy::new(|| Decimal::from(20));

static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\d{9,15}$").expect("phone pattern"));
static SHORTCODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5,8}$").expect("shortcode pattern"));

// ============================================================================
// Strategy
// ============================================================================

/// Who pays gas for the on-chain leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasMode {
    /// The sender signs alone and pays its own gas.
    #[default]
    SelfPaid,
    /// The sponsor service co-signs and pays gas.
    Sponsored,
}

/// Flow variants selected once at construction instead of per-copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowStrategy {
    pub settlement_transport: SettlementTransport,
    pub gas_mode: GasMode,
}

// ============================================================================
// Observable state
// ============================================================================

/// On-ramp flow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnrampStatus {
    #[default]
    Idle,
    AddingPaymentMethod,
    InitiatingOnramp,
    MonitoringPayment,
    Success,
    Error,
}

/// Pay flow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayStatus {
    #[default]
    Idle,
    CreatingPaymentSession,
    CreatingPaymentMethod,
    DepositingToContract,
    CheckingStatus,
    Success,
    Error,
}

/// Observable on-ramp flow state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnrampState {
    pub status: OnrampStatus,
    pub error: Option<String>,
    pub payment_method_id: Option<String>,
    pub transaction_code: Option<String>,
}

/// Observable pay flow state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayState {
    pub status: PayStatus,
    pub error: Option<String>,
    pub session_id: Option<String>,
    pub transaction_hash: Option<String>,
    pub receipt: Option<String>,
}

impl OnrampState {
    /// Whether a flow is between start and terminal state.
    pub fn is_processing(&self) -> bool {
        !matches!(
            self.status,
            OnrampStatus::Idle | OnrampStatus::Success | OnrampStatus::Error
        )
    }
}

impl PayState {
    /// Whether a flow is between start and terminal state.
    pub fn is_processing(&self) -> bool {
        !matches!(
            self.status,
            PayStatus::Idle | PayStatus::Success | PayStatus::Error
        )
    }
}

// ============================================================================
// Parameters and completions
// ============================================================================

/// User input for the on-ramp flow.
#[derive(Debug, Clone)]
pub struct OnrampParams {
    pub phone_number: String,
    pub mobile_network: String,
    /// Country code the provider mapping keys on, e.g. `KES`.
    pub country: String,
    /// Fiat amount in the local currency.
    pub amount: Decimal,
    /// Crypto asset to purchase, lower-cased backend id, e.g. `apt`.
    pub target_token: String,
    /// Reuse a stored payment method instead of registering a new one.
    pub existing_payment_method_id: Option<String>,
}

/// User input for the pay flow.
#[derive(Debug, Clone)]
pub struct PaymentParams {
    /// Phone number or paybill/till shortcode of the recipient.
    pub identity: String,
    /// Target account, required for paybill payments.
    pub account_number: Option<String>,
    pub payment_kind: PaymentKind,
    pub mobile_network: String,
    /// Country code, e.g. `KES`.
    pub country: String,
    /// Fiat currency the amount is entered in, e.g. `KES`.
    pub fiat_currency: String,
    /// Fiat amount in the local currency.
    pub amount: Decimal,
    /// Catalog id of the crypto asset to spend.
    pub asset_id: String,
    /// Reuse a stored payment method instead of registering a new one.
    pub existing_payment_method_id: Option<String>,
}

/// Terminal result of a successful on-ramp flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnrampCompletion {
    pub transaction_code: String,
    pub receipt: Option<String>,
}

/// Terminal result of a pay flow whose on-chain leg committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCompletion {
    /// Off-chain settlement confirmed.
    Confirmed {
        transaction_hash: String,
        receipt: Option<String>,
    },
    /// The on-chain leg committed but settlement visibility ran out.
    /// Present to the user as "completed but unverified"; never reclassify
    /// as plain success or failure.
    UnverifiedSuccess { transaction_hash: String },
}

// ============================================================================
// Errors
// ============================================================================

/// Input validation failures, caught before any network call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("wallet not connected")]
    MissingPayer,
    #[error("recipient identity is required")]
    MissingIdentity,
    #[error("mobile network is required")]
    MissingNetwork,
    #[error("minimum amount is {minimum}")]
    BelowMinimum { minimum: Decimal },
    #[error("account number is required for paybill payments")]
    MissingAccountNumber,
    #[error("{identity:?} is not a valid recipient identity")]
    InvalidIdentity { identity: String },
    #[error("asset {0} is not in the supported-currencies catalog")]
    UnknownAsset(String),
    #[error("asset {0} has no on-chain address")]
    AssetNotOnChain(String),
}

/// Orchestration failures.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("another payment flow is already in flight")]
    FlowInFlight,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("insufficient balance: need {required} {symbol}, have {available}")]
    InsufficientBalance {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Sponsor(#[from] SponsorError),

    #[error("sponsored gas mode requires a sponsor service client")]
    SponsorUnavailable,

    /// The on-chain leg committed but the backend reported the off-chain
    /// leg failed. Funds have moved; surface with the transaction hash.
    #[error("settlement reported failure after on-chain commit (tx {hash}): {reason}")]
    SettlementReportedFailure { hash: String, reason: String },

    /// On-ramp settlement reported failed.
    #[error("settlement failed: {reason}")]
    SettlementFailed { reason: String },

    /// On-ramp settlement monitoring exhausted its budget.
    #[error("settlement status unknown: monitoring timed out")]
    SettlementTimeout,

    #[error("flow cancelled")]
    Cancelled,
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Map a user-facing mobile network name to the backend provider id.
pub fn provider_id_for(country: &str, network: &str) -> String {
    match (country.to_ascii_uppercase().as_str(), network) {
        ("KES", "Safaricom") => "mpesa".to_string(),
        ("KES", "Airtel") => "airtel-ke".to_string(),
        ("UGX", "MTN") => "mtn-ug".to_string(),
        ("UGX", "Airtel") => "airtel-ug".to_string(),
        ("GHS", "MTN") => "mtn-gh".to_string(),
        ("GHS", "AirtelTigo") => "airteltigo-gh".to_string(),
        ("CDF", "Airtel Money") => "airtel-cd".to_string(),
        ("CDF", "Orange Money") => "orange-cd".to_string(),
        ("ETB", "Telebirr") => "telebirr".to_string(),
        ("ETB", "Cbe Birr") => "cbe-et".to_string(),
        _ => network.to_ascii_lowercase(),
    }
}

fn validate_identity(kind: PaymentKind, identity: &str) -> Result<(), ValidationError> {
    let pattern = match kind {
        PaymentKind::Mobile => &*PHONE_NUMBER,
        PaymentKind::Paybill | PaymentKind::BuyGoods => &*SHORTCODE,
    };
    if pattern.is_match(identity) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentity {
            identity: identity.to_string(),
        })
    }
}

fn validate_common(
    payer: &str,
    identity: &str,
    network: &str,
    amount: Decimal,
) -> Result<(), ValidationError> {
    if payer.trim().is_empty() {
        return Err(ValidationError::MissingPayer);
    }
    if identity.trim().is_empty() {
        return Err(ValidationError::MissingIdentity);
    }
    if network.trim().is_empty() {
        return Err(ValidationError::MissingNetwork);
    }
    if amount < *MIN_FIAT_AMOUNT {
        return Err(ValidationError::BelowMinimum {
            minimum: *MIN_FIAT_AMOUNT,
        });
    }
    Ok(())
}

/// Validate pay-flow input. Pure; no network access.
pub fn validate_payment(payer: &str, params: &PaymentParams) -> Result<(), ValidationError> {
    validate_common(payer, &params.identity, &params.mobile_network, params.amount)?;
    if params.payment_kind.requires_account_number()
        && params
            .account_number
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
    {
        return Err(ValidationError::MissingAccountNumber);
    }
    validate_identity(params.payment_kind, &params.identity)
}

/// Validate on-ramp input. Pure; no network access.
pub fn validate_onramp(payer: &str, params: &OnrampParams) -> Result<(), ValidationError> {
    validate_common(
        payer,
        &params.phone_number,
        &params.mobile_network,
        params.amount,
    )?;
    validate_identity(PaymentKind::Mobile, &params.phone_number)
}

/// On-chain fungible-asset metadata address for a catalog entry.
///
/// The gas coin's catalog address is a placeholder; its real metadata
/// address is fixed.
fn metadata_address(asset: &SupportedCurrency) -> Result<String, ValidationError> {
    if asset.symbol == "APT" {
        return Ok(GAS_COIN_METADATA_ADDRESS.to_string());
    }
    asset
        .address
        .clone()
        .ok_or_else(|| ValidationError::AssetNotOnChain(asset.id.clone()))
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs the on-ramp and pay flows against the backend, the chain, and the
/// settlement watcher.
pub struct Orchestrator {
    backend: BackendClient,
    composer: TransactionComposer,
    rates: RateResolver,
    watcher: SettlementWatcher,
    sponsor: Option<SponsorClient>,
    strategy: FlowStrategy,
    in_flight: AtomicBool,
    cancel: CancellationToken,
    onramp_state: watch::Sender<OnrampState>,
    pay_state: watch::Sender<PayState>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("strategy", &self.strategy)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator over a backend and transaction composer with the given
    /// flow strategy.
    pub fn new(backend: BackendClient, composer: TransactionComposer, strategy: FlowStrategy) -> Self {
        let cancel = CancellationToken::new();
        let watcher = SettlementWatcher::new(backend.clone()).with_cancellation(cancel.clone());
        let rates = RateResolver::new(backend.clone());
        let (onramp_state, _) = watch::channel(OnrampState::default());
        let (pay_state, _) = watch::channel(PayState::default());
        Self {
            backend,
            composer,
            rates,
            watcher,
            sponsor: None,
            strategy,
            in_flight: AtomicBool::new(false),
            cancel,
            onramp_state,
            pay_state,
        }
    }

    /// Attach the sponsor service client; required for [`GasMode::Sponsored`].
    pub fn with_sponsor(mut self, sponsor: SponsorClient) -> Self {
        self.sponsor = Some(sponsor);
        self
    }

    /// Override the settlement attempt budget.
    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.watcher = self.watcher.with_config(config);
        self
    }

    /// Token tearing down any in-flight settlement watch, e.g. when the
    /// consumer goes away.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to on-ramp flow state changes.
    pub fn subscribe_onramp(&self) -> watch::Receiver<OnrampState> {
        self.onramp_state.subscribe()
    }

    /// Subscribe to pay flow state changes.
    pub fn subscribe_pay(&self) -> watch::Receiver<PayState> {
        self.pay_state.subscribe()
    }

    /// Return both flows to idle. Refused while a flow is in flight.
    pub fn reset(&self) -> Result<(), OrchestratorError> {
        if self.in_flight.load(Ordering::SeqCst) {
            return Err(OrchestratorError::FlowInFlight);
        }
        self.onramp_state.send_replace(OnrampState::default());
        self.pay_state.send_replace(PayState::default());
        Ok(())
    }

    fn acquire_flight(&self) -> Result<FlightGuard<'_>, OrchestratorError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| OrchestratorError::FlowInFlight)?;
        Ok(FlightGuard(&self.in_flight))
    }

    // ------------------------------------------------------------------
    // On-ramp flow
    // ------------------------------------------------------------------

    /// Run the on-ramp flow for a payer address.
    ///
    /// Sequence: (conditionally) register payment method → initiate
    /// on-ramp → monitor settlement. Validation failures return before any
    /// network call and leave the observable state idle.
    #[instrument(skip(self, params), fields(network = %params.mobile_network))]
    pub async fn start_onramp(
        &self,
        payer: &str,
        params: OnrampParams,
    ) -> Result<OnrampCompletion, OrchestratorError> {
        let _flight = self.acquire_flight()?;
        validate_onramp(payer, &params)?;

        let result = self.run_onramp(payer, &params).await;
        if let Err(error) = &result {
            warn!(%error, "onramp flow failed");
            self.onramp_state.send_modify(|state| {
                state.status = OnrampStatus::Error;
                state.error = Some(error.to_string());
            });
        }
        result
    }

    async fn run_onramp(
        &self,
        payer: &str,
        params: &OnrampParams,
    ) -> Result<OnrampCompletion, OrchestratorError> {
        let payment_method_id = match &params.existing_payment_method_id {
            Some(id) => {
                info!(payment_method_id = %id, "reusing stored payment method");
                self.onramp_state.send_replace(OnrampState {
                    status: OnrampStatus::InitiatingOnramp,
                    payment_method_id: Some(id.clone()),
                    ..OnrampState::default()
                });
                id.clone()
            }
            None => {
                self.onramp_state.send_replace(OnrampState {
                    status: OnrampStatus::AddingPaymentMethod,
                    ..OnrampState::default()
                });
                let created = self
                    .backend
                    .add_payment_method(&NewPaymentMethod {
                        owner: payer.to_string(),
                        payment_method_type: PAYMENT_METHOD_TYPE_MOBILE_MONEY.to_string(),
                        identity: params.phone_number.clone(),
                        provider_id: provider_id_for(&params.country, &params.mobile_network),
                    })
                    .await?;
                self.onramp_state.send_modify(|state| {
                    state.status = OnrampStatus::InitiatingOnramp;
                    state.payment_method_id = Some(created.id.clone());
                });
                created.id
            }
        };

        let initiated = self
            .backend
            .initiate_onramp(&NewOnramp {
                payment_method_id,
                amount: params.amount,
                target_token: params.target_token.to_ascii_lowercase(),
            })
            .await?;
        info!(code = %initiated.code, "onramp initiated");
        self.onramp_state.send_modify(|state| {
            state.status = OnrampStatus::MonitoringPayment;
            state.transaction_code = Some(initiated.code.clone());
        });

        let outcome = self
            .watcher
            .watch(
                StatusEndpoint::Onramp,
                self.strategy.settlement_transport,
                &initiated.code,
            )
            .await;
        match outcome {
            Ok(SettlementOutcome::Completed { receipt }) => {
                self.onramp_state.send_modify(|state| {
                    state.status = OnrampStatus::Success;
                });
                Ok(OnrampCompletion {
                    transaction_code: initiated.code,
                    receipt,
                })
            }
            Ok(SettlementOutcome::Failed { reason }) => {
                Err(OrchestratorError::SettlementFailed { reason })
            }
            Err(SettlementError::Timeout { .. }) | Err(SettlementError::StreamEnded) => {
                Err(OrchestratorError::SettlementTimeout)
            }
            Err(SettlementError::Cancelled) => Err(OrchestratorError::Cancelled),
        }
    }

    // ------------------------------------------------------------------
    // Pay flow
    // ------------------------------------------------------------------

    /// Run the pay flow: convert the fiat amount to the selected asset,
    /// verify balance, then session → method (conditional) → on-chain
    /// deposit → settlement watch.
    ///
    /// The amount shown to the user and the amount submitted on-chain come
    /// from the same quote; there is no second conversion.
    #[instrument(skip(self, signer, params), fields(kind = ?params.payment_kind, network = %params.mobile_network))]
    pub async fn handle_payment<S: TransactionSigner>(
        &self,
        signer: &S,
        params: PaymentParams,
    ) -> Result<PaymentCompletion, OrchestratorError> {
        let _flight = self.acquire_flight()?;
        let payer = signer.address();
        validate_payment(&payer, &params)?;

        let result = self.run_payment(signer, &payer, &params).await;
        if let Err(error) = &result {
            warn!(%error, "payment flow failed");
            self.pay_state.send_modify(|state| {
                state.status = PayStatus::Error;
                state.error = Some(error.to_string());
            });
        }
        result
    }

    async fn run_payment<S: TransactionSigner>(
        &self,
        signer: &S,
        payer: &str,
        params: &PaymentParams,
    ) -> Result<PaymentCompletion, OrchestratorError> {
        // Preconditions that need the network: quote and balance. Failures
        // here block the flow before any mutating call.
        let catalog = self.backend.currencies().await?;
        let asset = crypto_currencies(&catalog)
            .into_iter()
            .find(|c| c.id == params.asset_id)
            .ok_or_else(|| ValidationError::UnknownAsset(params.asset_id.clone()))?;
        let asset_metadata = metadata_address(&asset)?;

        let quote = self
            .rates
            .conversion(&params.fiat_currency, &asset.symbol, params.amount)
            .await?;
        let required = quote.converted;

        let onchain = self.composer.fullnode().fungible_asset_balances(payer).await?;
        let sheet = BalanceSheet::join(&catalog, &onchain);
        if !sheet.has_sufficient_balance(&asset.id, required) {
            let available = sheet
                .by_id(&asset.id)
                .map(|b| b.formatted)
                .unwrap_or(Decimal::ZERO);
            return Err(OrchestratorError::InsufficientBalance {
                symbol: asset.symbol.clone(),
                required,
                available,
            });
        }

        // Session creation always precedes method registration, which
        // always precedes the on-chain submission.
        self.pay_state.send_replace(PayState {
            status: PayStatus::CreatingPaymentSession,
            ..PayState::default()
        });
        let session = self
            .backend
            .create_payment_session(&NewPaymentSession {
                payer: payer.to_string(),
                provider: params.mobile_network.to_ascii_lowercase(),
                receiver_id: params.identity.clone(),
                token: asset_metadata.clone(),
                account_identity: params.account_number.clone(),
                is_buy_goods: matches!(params.payment_kind, PaymentKind::BuyGoods).then_some(true),
            })
            .await?;
        let session_key = session
            .key()
            .ok_or(BackendError::MissingSessionKey)?
            .to_string();
        info!(session = %session_key, "payment session created");
        self.pay_state.send_modify(|state| {
            state.session_id = Some(session_key.clone());
        });

        let reuse_stored = params.existing_payment_method_id.is_some();
        if !reuse_stored && params.payment_kind.supports_stored_method() {
            self.pay_state.send_modify(|state| {
                state.status = PayStatus::CreatingPaymentMethod;
            });
            self.backend
                .add_payment_method(&NewPaymentMethod {
                    owner: payer.to_string(),
                    payment_method_type: PAYMENT_METHOD_TYPE_MOBILE_MONEY.to_string(),
                    identity: params.identity.clone(),
                    provider_id: provider_id_for(&params.country, &params.mobile_network),
                })
                .await?;
        }

        self.pay_state.send_modify(|state| {
            state.status = PayStatus::DepositingToContract;
        });
        let decimals = asset.decimals.unwrap_or(DEFAULT_DECIMALS);
        let amount_base_units = to_base_units(required, decimals)?;
        let committed = match self.strategy.gas_mode {
            GasMode::SelfPaid => {
                let payload = TransactionPayload::EntryFunction(
                    EntryFunction::make_payment_fungible(
                        &asset_metadata,
                        amount_base_units,
                        &session_key,
                    ),
                );
                self.composer.submit_self_paid(signer, payload).await?
            }
            GasMode::Sponsored => {
                let sponsor = self
                    .sponsor
                    .as_ref()
                    .ok_or(OrchestratorError::SponsorUnavailable)?;
                let frame = sponsor
                    .payment_transaction(&SponsorRequest {
                        address: payer.to_string(),
                        metadata_address: asset_metadata.clone(),
                        amount: amount_base_units.to_string(),
                        payment_session_id: session_key.clone(),
                    })
                    .await?;
                let (transaction, fee_payer_authenticator) = frame.decode()?;
                self.composer
                    .submit_sponsored(signer, transaction, fee_payer_authenticator)
                    .await?
            }
        };
        self.pay_state.send_modify(|state| {
            state.status = PayStatus::CheckingStatus;
            state.transaction_hash = Some(committed.hash.clone());
        });

        let outcome = self
            .watcher
            .watch(
                StatusEndpoint::Payment,
                self.strategy.settlement_transport,
                &session_key,
            )
            .await;
        match outcome {
            Ok(SettlementOutcome::Completed { receipt }) => {
                self.pay_state.send_modify(|state| {
                    state.status = PayStatus::Success;
                    state.receipt = receipt.clone();
                });
                Ok(PaymentCompletion::Confirmed {
                    transaction_hash: committed.hash,
                    receipt,
                })
            }
            Ok(SettlementOutcome::Failed { reason }) => {
                Err(OrchestratorError::SettlementReportedFailure {
                    hash: committed.hash,
                    reason,
                })
            }
            // The on-chain leg committed; loss of settlement visibility is
            // not failure and must not be reported as one.
            Err(SettlementError::Timeout { .. }) | Err(SettlementError::StreamEnded) => {
                self.pay_state.send_modify(|state| {
                    state.status = PayStatus::Success;
                });
                Ok(PaymentCompletion::UnverifiedSuccess {
                    transaction_hash: committed.hash,
                })
            }
            Err(SettlementError::Cancelled) => Err(OrchestratorError::Cancelled),
        }
    }
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
