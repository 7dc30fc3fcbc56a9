//! Faucet HTTP API: token minting, health checks and metrics

use crate::client::MarketClient;
use crate::config::FaucetConfig;
use crate::contracts::parse_address;
use crate::metrics;
use crate::tx::AgentSigner;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Minting backend; absent when the client failed to initialise
pub struct Faucet {
    pub client: Arc<MarketClient>,
    pub signer: AgentSigner,
    pub mint_amount_units: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub faucet: Option<Arc<Faucet>>,
    /// Serve the Prometheus exposition at `/metrics`
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(faucet: Option<Faucet>) -> Self {
        Self {
            faucet: faucet.map(Arc::new),
            metrics_enabled: true,
        }
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}

/// Build the faucet router
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(home))
        .route("/health", get(health_check));
    if state.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .route("/request-tokens", post(request_tokens))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run_server(
    config: &FaucetConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting faucet API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn home() -> &'static str {
    "Auraweave faucet is running. POST {\"address\": \"0x...\"} to /request-tokens."
}

/// Health check endpoint - basic liveness plus backend readiness
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        minting: state.faucet.is_some(),
    })
}

async fn metrics_handler() -> String {
    metrics::render()
}

async fn request_tokens(
    State(state): State<AppState>,
    payload: Result<Json<MintRequest>, JsonRejection>,
) -> Response {
    let response = mint(state, payload).await;
    metrics::record_faucet_request(response.status().as_u16());
    response
}

async fn mint(state: AppState, payload: Result<Json<MintRequest>, JsonRejection>) -> Response {
    let Some(faucet) = state.faucet else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Faucet service not initialized. Check server logs.",
        );
    };

    let recipient = match payload {
        Ok(Json(MintRequest {
            address: Some(address),
        })) => address,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Missing 'address' in request body"),
        Err(rejection) => {
            warn!("Rejected faucet request body: {}", rejection);
            return error_response(StatusCode::BAD_REQUEST, "Missing 'address' in request body");
        }
    };

    let recipient = match parse_address(&recipient) {
        Ok(address) => address,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid recipient Ethereum address"),
    };
    let checksummed = to_checksum(&recipient, None);

    match faucet
        .client
        .mint_tokens(&faucet.signer, &checksummed, &faucet.mint_amount_units)
        .await
    {
        Ok(submitted) => {
            let tx_hash = format!("{:?}", submitted.tx_hash);
            info!(
                "Minted {} tokens to {}: {}",
                faucet.mint_amount_units, checksummed, tx_hash
            );
            (
                StatusCode::OK,
                Json(MintResponse {
                    message: format!(
                        "{} MockUSDC mint transaction sent to {}.",
                        faucet.mint_amount_units, checksummed
                    ),
                    transaction_hash: tx_hash,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Faucet mint failed in {}: {}", e.phase(), e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to send mint transaction: {}", e),
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// Request and response types

#[derive(Deserialize)]
struct MintRequest {
    address: Option<String>,
}

#[derive(Serialize)]
struct MintResponse {
    message: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    minting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn post_json(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/request-tokens")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_uninitialized_faucet_returns_503() {
        let app = router(AppState::new(None));
        let (status, body) = post_json(
            app,
            r#"{"address":"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("not initialized"));
    }

    #[tokio::test]
    async fn test_metrics_route_follows_setting() {
        let get_metrics = |state: AppState| async move {
            router(state)
                .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
                .await
                .unwrap()
                .status()
        };

        assert_eq!(get_metrics(AppState::new(None)).await, StatusCode::OK);
        assert_eq!(
            get_metrics(AppState::new(None).with_metrics(false)).await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_health_reports_minting_state() {
        let app = router(AppState::new(None));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["minting"], false);
    }
}
