//! End-to-end orchestration tests against in-process mock servers.
//!
//! A small Axum app stands in for the payment backend and another for the
//! chain fullnode, so the flows run over real HTTP with scripted
//! responses.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde_json::json;
use url::Url;

use tooma_rs::backend::BackendClient;
use tooma_rs::chain::{
    CommitPollConfig, FullnodeClient, LocalSigner, TransactionComposer, TransactionSigner,
};
use tooma_rs::handlers::{self, AppState};
use tooma_rs::network::Network;
use tooma_rs::orchestrator::{
    FlowStrategy, GasMode, OnrampParams, Orchestrator, OrchestratorError, PayStatus,
    PaymentCompletion, PaymentParams,
};
use tooma_rs::rates::PretiumClient;
use tooma_rs::settlement::{PollConfig, SettlementTransport};
use tooma_rs::sponsor::{SponsorClient, SponsorService};
use tooma_rs::types::{ConversionQuote, PaymentKind};

// ============================================================================
// Mock servers
// ============================================================================

#[derive(Default)]
struct MockState {
    // Backend counters.
    payment_method_calls: AtomicU32,
    session_calls: AtomicU32,
    payment_status_calls: AtomicU32,
    onramp_status_calls: AtomicU32,
    /// Number of non-terminal reports before `Completed`; u32::MAX keeps
    /// the status pending forever.
    pending_before_complete: AtomicU32,
    last_session_request: Mutex<Option<serde_json::Value>>,
    // Fullnode state.
    submitted: Mutex<Vec<serde_json::Value>>,
    commit_probes: AtomicU32,
    balances: Mutex<serde_json::Value>,
}

impl MockState {
    fn with_apt_balance(raw: u64) -> Arc<Self> {
        let state = Self::default();
        *state.balances.lock().unwrap() = json!([
            { "asset_type": "0x1::aptos_coin::AptosCoin", "amount": raw.to_string() }
        ]);
        Arc::new(state)
    }
}

fn quote_5_2_apt() -> ConversionQuote {
    ConversionQuote {
        converted: Decimal::new(52, 1),
        from_usd_quote: Decimal::new(1295, 1),
        to_usd_quote: Decimal::new(85, 1),
    }
}

fn catalog() -> serde_json::Value {
    json!([
        {
            "currency_type": "Fiat",
            "name": "Kenyan Shilling",
            "symbol": "KES",
            "id": "kes",
            "country": "Kenya",
            "description": "",
            "chain": null,
            "address": null,
            "is_fungible_asset": null,
            "decimals": null
        },
        {
            "currency_type": "Crypto",
            "name": "Gas Coin",
            "symbol": "APT",
            "id": "apt",
            "country": null,
            "description": "",
            "chain": "tooma",
            "address": "0xa",
            "is_fungible_asset": true,
            "decimals": 8
        },
        {
            "currency_type": "Crypto",
            "name": "USD Coin",
            "symbol": "USDC",
            "id": "usdc",
            "country": null,
            "description": "",
            "chain": "tooma",
            "address": "0xbb1",
            "is_fungible_asset": true,
            "decimals": 6
        }
    ])
}

fn scripted_status(state: &MockState, calls: &AtomicU32) -> Json<serde_json::Value> {
    let call = calls.fetch_add(1, Ordering::SeqCst);
    let pending = state.pending_before_complete.load(Ordering::SeqCst);
    if call < pending {
        // Mixed casing on purpose; the client must normalize.
        Json(json!({ "status": if call % 2 == 0 { "Pending" } else { "processing" } }))
    } else {
        Json(json!({ "status": "Completed", "data": { "receipt": "R123" } }))
    }
}

async fn spawn_backend(state: Arc<MockState>) -> SocketAddr {
    let app = Router::new()
        .route("/currencies", get(|| async { Json(catalog()) }))
        .route(
            "/conversion",
            post(|| async { Json(serde_json::to_value(quote_5_2_apt()).unwrap()) }),
        )
        .route(
            "/create-payment-session",
            post(
                |State(state): State<Arc<MockState>>, Json(body): Json<serde_json::Value>| async move {
                    state.session_calls.fetch_add(1, Ordering::SeqCst);
                    *state.last_session_request.lock().unwrap() = Some(body);
                    Json(json!({ "session_id": "sess-1" }))
                },
            ),
        )
        .route(
            "/payment-method",
            post(|State(state): State<Arc<MockState>>| async move {
                state.payment_method_calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "id": "pm-1" }))
            }),
        )
        .route(
            "/on-ramp",
            post(|| async { Json(json!({ "code": "code-1" })) }),
        )
        .route(
            "/transaction/payment/{code}",
            get(|State(state): State<Arc<MockState>>, Path(_code): Path<String>| async move {
                scripted_status(&state, &state.payment_status_calls)
            }),
        )
        .route(
            "/status/onramp/{code}",
            get(|State(state): State<Arc<MockState>>, Path(_code): Path<String>| async move {
                scripted_status(&state, &state.onramp_status_calls)
            }),
        )
        .route(
            "/status/{code}",
            get(|Path(_code): Path<String>| async move {
                let body = concat!(
                    "event: status\n",
                    "data: {\"status\":\"Pending\"}\n",
                    "\n",
                    "data: {\"status\":\"Success\",\"data\":{\"receipt\":\"R123\"}}\n",
                    "\n",
                );
                ([(header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        )
        .with_state(state);
    spawn(app).await
}

async fn spawn_fullnode(state: Arc<MockState>) -> SocketAddr {
    let app = Router::new()
        .route(
            "/accounts/{address}",
            get(|Path(_address): Path<String>| async move {
                Json(json!({ "sequence_number": "5" }))
            }),
        )
        .route(
            "/accounts/{address}/balances",
            get(|State(state): State<Arc<MockState>>, Path(_address): Path<String>| async move {
                Json(state.balances.lock().unwrap().clone())
            }),
        )
        .route(
            "/transactions",
            post(
                |State(state): State<Arc<MockState>>, Json(body): Json<serde_json::Value>| async move {
                    state.submitted.lock().unwrap().push(body);
                    Json(json!({ "hash": "0xhash1" }))
                },
            ),
        )
        .route(
            "/transactions/by_hash/{hash}",
            get(|State(state): State<Arc<MockState>>, Path(hash): Path<String>| async move {
                if state.commit_probes.fetch_add(1, Ordering::SeqCst) == 0 {
                    Json(json!({ "type": "pending_transaction", "hash": hash })).into_response()
                } else {
                    Json(json!({ "type": "user_transaction", "success": true, "hash": hash }))
                        .into_response()
                }
            }),
        )
        .with_state(state);
    spawn(app).await
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn http_url(addr: SocketAddr) -> Url {
    Url::parse(&format!("http://{addr}")).unwrap()
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    state: Arc<MockState>,
    orchestrator: Orchestrator,
    signer: LocalSigner,
}

async fn harness(strategy: FlowStrategy, state: Arc<MockState>) -> Harness {
    let backend_addr = spawn_backend(Arc::clone(&state)).await;
    let fullnode_addr = spawn_fullnode(Arc::clone(&state)).await;

    let backend = BackendClient::new(http_url(backend_addr), None);
    let fullnode = FullnodeClient::new(http_url(fullnode_addr)).with_commit_poll(CommitPollConfig {
        max_attempts: 5,
        interval: Duration::from_millis(5),
    });
    let composer = TransactionComposer::new(fullnode, Network::Testnet);

    let orchestrator = Orchestrator::new(backend, composer, strategy).with_poll_config(PollConfig {
        max_attempts: 30,
        interval: Duration::from_millis(5),
    });

    Harness {
        state,
        orchestrator,
        signer: LocalSigner::generate(),
    }
}

fn payment_params() -> PaymentParams {
    PaymentParams {
        identity: "0712345678".to_string(),
        account_number: None,
        payment_kind: PaymentKind::Mobile,
        mobile_network: "Safaricom".to_string(),
        country: "KES".to_string(),
        fiat_currency: "KES".to_string(),
        amount: Decimal::from(1000),
        asset_id: "apt".to_string(),
        existing_payment_method_id: None,
    }
}

fn onramp_params() -> OnrampParams {
    OnrampParams {
        phone_number: "0712345678".to_string(),
        mobile_network: "Safaricom".to_string(),
        country: "KES".to_string(),
        amount: Decimal::from(100),
        target_token: "apt".to_string(),
        existing_payment_method_id: None,
    }
}

// ============================================================================
// Pay flow
// ============================================================================

#[tokio::test]
async fn pay_flow_confirms_settlement_and_submits_exact_quote() {
    let state = MockState::with_apt_balance(520_000_000);
    state.pending_before_complete.store(2, Ordering::SeqCst);
    let h = harness(FlowStrategy::default(), state).await;

    let completion = h
        .orchestrator
        .handle_payment(&h.signer, payment_params())
        .await
        .unwrap();

    assert_eq!(
        completion,
        PaymentCompletion::Confirmed {
            transaction_hash: "0xhash1".to_string(),
            receipt: Some("R123".to_string()),
        }
    );
    assert_eq!(h.state.session_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.state.payment_method_calls.load(Ordering::SeqCst), 1);

    // The submitted transaction spends exactly the quoted amount in base
    // units: 5.2 APT at 8 decimals.
    let submitted = h.state.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    let txn = &submitted[0];
    assert_eq!(txn["type"], "single_signer");
    let entry = &txn["raw"]["payload"]["EntryFunction"];
    assert_eq!(entry["function"], "make_payment_fungible");
    assert_eq!(
        entry["args"],
        json!(["0xa", "520000000", "sess-1"])
    );

    let pay_state = h.orchestrator.subscribe_pay().borrow().clone();
    assert_eq!(pay_state.status, PayStatus::Success);
    assert_eq!(pay_state.receipt.as_deref(), Some("R123"));
}

#[tokio::test]
async fn pay_flow_skips_method_registration_for_existing_method() {
    let state = MockState::with_apt_balance(520_000_000);
    let h = harness(FlowStrategy::default(), state).await;

    let mut params = payment_params();
    params.existing_payment_method_id = Some("pm-stored".to_string());
    h.orchestrator
        .handle_payment(&h.signer, params)
        .await
        .unwrap();

    assert_eq!(h.state.payment_method_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.state.session_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pay_flow_never_registers_method_for_paybill() {
    let state = MockState::with_apt_balance(520_000_000);
    let h = harness(FlowStrategy::default(), state).await;

    let mut params = payment_params();
    params.payment_kind = PaymentKind::Paybill;
    params.identity = "112233".to_string();
    params.account_number = Some("445566".to_string());
    h.orchestrator
        .handle_payment(&h.signer, params)
        .await
        .unwrap();

    assert_eq!(h.state.payment_method_calls.load(Ordering::SeqCst), 0);
    let session = h.state.last_session_request.lock().unwrap().clone().unwrap();
    assert_eq!(session["receiver_id"], "112233");
    assert_eq!(session["account_identity"], "445566");
}

#[tokio::test]
async fn pay_flow_paybill_blocks_without_account_number() {
    let state = MockState::with_apt_balance(520_000_000);
    let h = harness(FlowStrategy::default(), state).await;

    let mut params = payment_params();
    params.payment_kind = PaymentKind::Paybill;
    params.identity = "112233".to_string();
    params.account_number = None;
    let error = h
        .orchestrator
        .handle_payment(&h.signer, params)
        .await
        .unwrap_err();

    assert!(matches!(error, OrchestratorError::Validation(_)));
    // Blocked before any network call.
    assert_eq!(h.state.session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pay_flow_insufficient_balance_blocks_before_session() {
    // Balance 0.05 APT, required 5.2 APT.
    let state = MockState::with_apt_balance(5_000_000);
    let h = harness(FlowStrategy::default(), state).await;

    let error = h
        .orchestrator
        .handle_payment(&h.signer, payment_params())
        .await
        .unwrap_err();

    match error {
        OrchestratorError::InsufficientBalance { required, available, .. } => {
            assert_eq!(required, Decimal::new(52, 1));
            assert_eq!(available, Decimal::new(5_000_000, 8));
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert_eq!(h.state.session_calls.load(Ordering::SeqCst), 0);
    assert!(h.state.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn pay_flow_settlement_timeout_is_unverified_success() {
    let state = MockState::with_apt_balance(520_000_000);
    state.pending_before_complete.store(u32::MAX, Ordering::SeqCst);
    let h = harness(FlowStrategy::default(), state).await;

    let completion = h
        .orchestrator
        .handle_payment(&h.signer, payment_params())
        .await
        .unwrap();

    assert_eq!(
        completion,
        PaymentCompletion::UnverifiedSuccess {
            transaction_hash: "0xhash1".to_string(),
        }
    );
    // Exactly the attempt budget was spent.
    assert_eq!(h.state.payment_status_calls.load(Ordering::SeqCst), 30);
    assert_eq!(
        h.orchestrator.subscribe_pay().borrow().status,
        PayStatus::Success
    );
}

#[tokio::test]
async fn pay_flow_terminal_on_attempt_thirty() {
    let state = MockState::with_apt_balance(520_000_000);
    state.pending_before_complete.store(29, Ordering::SeqCst);
    let h = harness(FlowStrategy::default(), state).await;

    let completion = h
        .orchestrator
        .handle_payment(&h.signer, payment_params())
        .await
        .unwrap();

    assert!(matches!(
        completion,
        PaymentCompletion::Confirmed { receipt: Some(ref r), .. } if r == "R123"
    ));
    assert_eq!(h.state.payment_status_calls.load(Ordering::SeqCst), 30);
}

#[tokio::test]
async fn pay_flow_rejects_concurrent_submission() {
    let state = MockState::with_apt_balance(520_000_000);
    state.pending_before_complete.store(10, Ordering::SeqCst);
    let h = harness(FlowStrategy::default(), state).await;
    let orchestrator = Arc::new(h.orchestrator);
    let signer = Arc::new(h.signer);

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        let signer = Arc::clone(&signer);
        tokio::spawn(async move { orchestrator.handle_payment(&*signer, payment_params()).await })
    };
    // Wait until the first flow has observably entered the state machine.
    let mut pay_state = orchestrator.subscribe_pay();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !pay_state.borrow().is_processing() {
            pay_state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let second = orchestrator.handle_payment(&*signer, payment_params()).await;
    assert!(matches!(second, Err(OrchestratorError::FlowInFlight)));

    first.await.unwrap().unwrap();
    // After the first flow completes the orchestrator accepts work again.
    orchestrator.reset().unwrap();
}

// ============================================================================
// Sponsored gas mode
// ============================================================================

#[tokio::test]
async fn sponsored_pay_flow_submits_fee_payer_transaction() {
    let state = MockState::with_apt_balance(520_000_000);
    let backend_addr = spawn_backend(Arc::clone(&state)).await;
    let fullnode_addr = spawn_fullnode(Arc::clone(&state)).await;

    // Sponsor service over the same mock fullnode, mounted as a real HTTP
    // server the orchestrator reaches through SponsorClient.
    let sponsor_key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
    let sponsor_address = LocalSigner::new(sponsor_key.clone()).address();
    let service = SponsorService::new(
        sponsor_key,
        FullnodeClient::new(http_url(fullnode_addr)),
        Network::Testnet,
    );
    let sponsor_app = Router::new()
        .merge(handlers::routes())
        .with_state(AppState {
            sponsor: Arc::new(service),
            backend: Arc::new(BackendClient::new(http_url(backend_addr), None)),
            pretium: Arc::new(PretiumClient::new(
                http_url(backend_addr),
                "unused".to_string(),
            )),
        });
    let sponsor_addr = spawn(sponsor_app).await;

    let backend = BackendClient::new(http_url(backend_addr), None);
    let fullnode = FullnodeClient::new(http_url(fullnode_addr)).with_commit_poll(CommitPollConfig {
        max_attempts: 5,
        interval: Duration::from_millis(5),
    });
    let orchestrator = Orchestrator::new(
        backend,
        TransactionComposer::new(fullnode, Network::Testnet),
        FlowStrategy {
            settlement_transport: SettlementTransport::Poll,
            gas_mode: GasMode::Sponsored,
        },
    )
    .with_sponsor(SponsorClient::new(http_url(sponsor_addr)))
    .with_poll_config(PollConfig {
        max_attempts: 5,
        interval: Duration::from_millis(5),
    });

    let signer = LocalSigner::generate();
    let completion = orchestrator
        .handle_payment(&signer, payment_params())
        .await
        .unwrap();
    assert!(matches!(completion, PaymentCompletion::Confirmed { .. }));

    let submitted = state.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    let txn = &submitted[0];
    assert_eq!(txn["type"], "fee_payer");
    assert_eq!(txn["fee_payer"], sponsor_address.as_str());
    assert_eq!(txn["raw"]["sender"], signer.address().as_str());
    assert_eq!(
        txn["raw"]["payload"]["EntryFunction"]["args"],
        json!(["0xa", "520000000", "sess-1"])
    );
    // Both authenticators are present and distinct.
    assert_ne!(
        txn["sender_authenticator"]["public_key"],
        txn["fee_payer_authenticator"]["public_key"]
    );
}

#[tokio::test]
async fn sponsored_mode_without_client_fails_fast() {
    let state = MockState::with_apt_balance(520_000_000);
    let h = harness(
        FlowStrategy {
            settlement_transport: SettlementTransport::Poll,
            gas_mode: GasMode::Sponsored,
        },
        state,
    )
    .await;

    let error = h
        .orchestrator
        .handle_payment(&h.signer, payment_params())
        .await
        .unwrap_err();
    assert!(matches!(error, OrchestratorError::SponsorUnavailable));
    // Session was created before the gas step; nothing reached the chain.
    assert!(h.state.submitted.lock().unwrap().is_empty());
}

// ============================================================================
// On-ramp flow
// ============================================================================

#[tokio::test]
async fn onramp_flow_registers_method_and_completes() {
    let state = MockState::with_apt_balance(0);
    state.pending_before_complete.store(3, Ordering::SeqCst);
    let h = harness(FlowStrategy::default(), state).await;

    let completion = h
        .orchestrator
        .start_onramp("0xpayer", onramp_params())
        .await
        .unwrap();

    assert_eq!(completion.transaction_code, "code-1");
    assert_eq!(completion.receipt.as_deref(), Some("R123"));
    assert_eq!(h.state.payment_method_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn onramp_flow_reuses_existing_method() {
    let state = MockState::with_apt_balance(0);
    let h = harness(FlowStrategy::default(), state).await;

    let mut params = onramp_params();
    params.existing_payment_method_id = Some("pm-stored".to_string());
    h.orchestrator
        .start_onramp("0xpayer", params)
        .await
        .unwrap();

    assert_eq!(h.state.payment_method_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn onramp_flow_over_stream_transport() {
    let state = MockState::with_apt_balance(0);
    let h = harness(
        FlowStrategy {
            settlement_transport: SettlementTransport::Stream,
            gas_mode: GasMode::SelfPaid,
        },
        state,
    )
    .await;

    let completion = h
        .orchestrator
        .start_onramp("0xpayer", onramp_params())
        .await
        .unwrap();

    // The stream scripts Pending then Success with a receipt.
    assert_eq!(completion.receipt.as_deref(), Some("R123"));
    // The poll endpoint was never touched.
    assert_eq!(h.state.onramp_status_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Backend contract details
// ============================================================================

#[tokio::test]
async fn account_registration_treats_500_as_already_exists() {
    use tooma_rs::backend::AccountCreation;

    let calls = Arc::new(AtomicU32::new(0));
    let app = Router::new().route(
        "/account",
        post({
            let calls = Arc::clone(&calls);
            move || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Json(json!({ "address": "0xpayer" })).into_response()
                    } else {
                        (
                            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                            "already exists",
                        )
                            .into_response()
                    }
                }
            }
        }),
    );
    let addr = spawn(app).await;
    let backend = BackendClient::new(http_url(addr), None);

    assert_eq!(
        backend.create_account("0xpayer").await.unwrap(),
        AccountCreation::Created
    );
    // Re-registering is not an error; the backend's 500 means it already
    // exists.
    assert_eq!(
        backend.create_account("0xpayer").await.unwrap(),
        AccountCreation::AlreadyExists
    );
}

#[tokio::test]
async fn settlement_poll_retries_transient_errors_within_budget() {
    use tooma_rs::settlement::{SettlementOutcome, SettlementWatcher, StatusEndpoint};

    let calls = Arc::new(AtomicU32::new(0));
    let app = Router::new().route(
        "/status/onramp/{code}",
        get({
            let calls = Arc::clone(&calls);
            move |Path(_code): Path<String>| {
                let calls = Arc::clone(&calls);
                async move {
                    // Two transient server errors, then a terminal status.
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
                    } else {
                        Json(json!({ "status": "success" })).into_response()
                    }
                }
            }
        }),
    );
    let addr = spawn(app).await;

    let watcher = SettlementWatcher::new(BackendClient::new(http_url(addr), None)).with_config(
        PollConfig {
            max_attempts: 5,
            interval: Duration::from_millis(5),
        },
    );
    let outcome = watcher
        .poll(StatusEndpoint::Onramp, "code-1")
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::Completed { receipt: None });
    // The transient failures consumed attempts from the same budget.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn onramp_flow_rejects_below_minimum_amount() {
    let state = MockState::with_apt_balance(0);
    let h = harness(FlowStrategy::default(), state).await;

    let mut params = onramp_params();
    params.amount = Decimal::from(19);
    let error = h
        .orchestrator
        .start_onramp("0xpayer", params)
        .await
        .unwrap_err();
    assert!(matches!(error, OrchestratorError::Validation(_)));
    assert_eq!(h.state.payment_method_calls.load(Ordering::SeqCst), 0);
}
