//! Sponsor service HTTP entrypoint.
//!
//! Launches the Axum server exposing sponsored-transaction assembly and
//! the rate-provider proxies. This process is the only holder of the
//! sponsor private key and the rate provider's API key.
//!
//! Endpoints:
//! - `POST /sponsor/payment-transaction` – assemble and co-sign a
//!   gas-sponsored payment transaction
//! - `POST /conversion` – proxy an asset-specific conversion quote
//! - `POST /exchange-rate` – proxy the fixed fiat/USD rate
//! - `POST /validation` – proxy recipient identity validation
//! - `GET /health`, `GET /version` – liveness and build info
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `SPONSOR_PRIVATE_KEY`, `PRETIUM_API_KEY` are required
//! - `TOOMA_NETWORK`, `TOOMA_BACKEND_URL`, `FULLNODE_URL_*` select the
//!   chain and backend environments

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::Router;
use dotenvy::dotenv;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use tooma_rs::backend::BackendClient;
use tooma_rs::chain::FullnodeClient;
use tooma_rs::handlers::{self, AppState};
use tooma_rs::rates::PretiumClient;
use tooma_rs::sponsor::SponsorService;
use tooma_rs::{from_env, shutdown, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    telemetry::init();

    let network = from_env::network()?;
    let fullnode = FullnodeClient::new(from_env::fullnode_url(network)?);
    let backend = BackendClient::new(from_env::backend_url()?, from_env::backend_api_key());
    let pretium = PretiumClient::new(from_env::pretium_base_url()?, from_env::pretium_api_key()?);

    let sponsor_key = match from_env::sponsor_signing_key() {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("failed to load sponsor key: {e}");
            std::process::exit(1);
        }
    };
    let sponsor = SponsorService::new(sponsor_key, fullnode, network);
    tracing::info!(
        network = %network,
        sponsor = %sponsor.sponsor_address(),
        "sponsor service configured"
    );

    let state = AppState {
        sponsor: Arc::new(sponsor),
        backend: Arc::new(backend),
        pretium: Arc::new(pretium),
    };

    let app = Router::new()
        .merge(handlers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let (host, port) = from_env::listen_addr();
    let addr = SocketAddr::new(host.parse().expect("HOST must be a valid IP address"), port);
    tracing::info!("starting sponsor service at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("failed to bind to {addr}: {e}");
        std::process::exit(1);
    });

    let shutdown_token = shutdown::shutdown_token()?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    Ok(())
}
