//! cabal-relayer
//!
//! Axum-based HTTP service that pays gas for anonymous Cabal members. A
//! member submits a call carrying a Semaphore proof; the relayer validates
//! the request, checks the proof is bound to the requested action, simulates
//! the call against the target chain and, when submission is enabled, sends
//! it from its own account. Authorization itself happens on chain.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cabal_common::intent::check_intent;
use cabal_common::request::parse_chain_id;
use cabal_common::units::{format_ether, truncate_address};
use cabal_common::{args::token_to_json, CabalError, LegacyExecuteRequest, RelayCall, TxRequest};
use ethers::types::{Address, U256};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod client;
pub mod config;
pub mod error;

pub use client::{ChainClient, EvmClient};
pub use config::RelayerConfig;
pub use error::{ApiError, RelayError};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// A configured chain.
#[derive(Clone)]
pub struct ChainEntry {
    pub client: Arc<dyn ChainClient>,
    /// Balance below which the relayer reports itself as not ready.
    pub min_balance: U256,
}

/// Application state. Read-only once the server is running.
#[derive(Clone, Default)]
pub struct AppState {
    pub chains: Arc<HashMap<u64, ChainEntry>>,
    /// Chain served by the standalone `GET /` readiness route.
    pub default_chain_id: Option<u64>,
    /// Cabal used by `POST /` legacy bodies that omit `cabal`.
    pub default_cabal: Option<Address>,
    /// Send transactions after a successful simulation.
    pub submit: bool,
}

impl AppState {
    pub fn new(submit: bool) -> Self {
        Self {
            submit,
            ..Default::default()
        }
    }

    pub fn with_chain(mut self, client: Arc<dyn ChainClient>, min_balance: U256) -> Self {
        let mut chains = (*self.chains).clone();
        chains.insert(client.chain_id(), ChainEntry { client, min_balance });
        self.chains = Arc::new(chains);
        self
    }

    pub fn with_default_chain(mut self, chain_id: u64) -> Self {
        self.default_chain_id = Some(chain_id);
        self
    }

    pub fn with_default_cabal(mut self, cabal: Address) -> Self {
        self.default_cabal = Some(cabal);
        self
    }

    fn chain(&self, chain_id: u64) -> Result<&ChainEntry, RelayError> {
        self.chains
            .get(&chain_id)
            .ok_or(RelayError::UnsupportedChain(chain_id))
    }

    /// The relayer account, identical across chains since one key signs for all.
    pub fn relayer_address(&self) -> Option<Address> {
        self.chains.values().next().map(|c| c.client.relayer_address())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the router
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Standalone relayer
        .route("/", get(default_readiness).post(relay_default))
        // Web API
        .route("/api/v1/relay/:chain_id", get(readiness).post(relay_on_chain))
        // Legacy execute route
        .route("/execute", post(relay_execute))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayQuery {
    /// Simulate only, even when submission is enabled.
    #[serde(default)]
    dry_run: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS - HEALTH & READINESS
// ═══════════════════════════════════════════════════════════════════════════════

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut chain_ids: Vec<u64> = state.chains.keys().copied().collect();
    chain_ids.sort_unstable();

    Json(serde_json::json!({
        "status": "ok",
        "relayer": state.relayer_address(),
        "chains": chain_ids,
        "submit": state.submit,
    }))
}

async fn readiness(State(state): State<AppState>, Path(raw): Path<String>) -> impl IntoResponse {
    match parse_chain_id(&raw) {
        Ok(chain_id) => chain_readiness(&state, chain_id).await,
        Err(err) => not_ready(
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "ready": false,
                "message": "Invalid Chain ID",
                "error": err.to_string(),
            }),
        ),
    }
}

async fn default_readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.default_chain_id {
        Some(chain_id) => chain_readiness(&state, chain_id).await,
        None => not_ready(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "ready": false, "message": "Unsupported Chain ID" }),
        ),
    }
}

async fn chain_readiness(state: &AppState, chain_id: u64) -> axum::response::Response {
    let Ok(entry) = state.chain(chain_id) else {
        return not_ready(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "ready": false, "message": "Unsupported Chain ID" }),
        );
    };

    let balance = match entry.client.balance().await {
        Ok(balance) => balance,
        Err(err) => {
            warn!(chain_id, "Balance lookup failed: {}", err);
            return not_ready(
                StatusCode::BAD_GATEWAY,
                serde_json::json!({
                    "ready": false,
                    "message": "Failed to fetch balance",
                    "error": err.to_string(),
                }),
            );
        }
    };

    if balance < entry.min_balance {
        warn!(
            chain_id,
            balance = %format_ether(balance),
            min_balance = %format_ether(entry.min_balance),
            "Relayer balance below minimum"
        );
        return not_ready(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "ready": false, "message": "Insufficient ETH balance" }),
        );
    }

    Json(serde_json::json!({ "ready": true, "chainId": chain_id })).into_response()
}

fn not_ready(status: StatusCode, body: Value) -> axum::response::Response {
    (status, Json(body)).into_response()
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS - RELAY
// ═══════════════════════════════════════════════════════════════════════════════

/// `POST /`: a generic call when the body names a `function`, otherwise a
/// legacy execute body against the configured default Cabal.
async fn relay_default(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_body(&body)?;
    let call = if body.get("function").is_some() {
        resolve_call(&state, &TxRequest::from_json(body)?)?
    } else {
        resolve_legacy(&state, &LegacyExecuteRequest::from_json(body)?, state.default_cabal)?
    };
    relay(&state, call, query.dry_run).await
}

async fn relay_on_chain(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<RelayQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let path_chain_id = parse_chain_id(&raw).map_err(|err| {
        ApiError::bad_request("Invalid Chain ID", "INVALID_CHAIN_ID")
            .with_details(serde_json::json!(err.to_string()))
    })?;

    let request = TxRequest::from_json(parse_body(&body)?)?;
    if request.chain_id != path_chain_id {
        return Err(RelayError::ChainMismatch {
            path: path_chain_id,
            body: request.chain_id,
        }
        .into());
    }

    let call = resolve_call(&state, &request)?;
    relay(&state, call, query.dry_run).await
}

async fn relay_execute(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request = LegacyExecuteRequest::from_json(parse_body(&body)?)?;
    let call = resolve_legacy(&state, &request, None)?;
    relay(&state, call, query.dry_run).await
}

/// Target address, then chain, then function and arguments. A request for an
/// unconfigured chain fails as such whatever its function.
fn resolve_call(state: &AppState, request: &TxRequest) -> Result<RelayCall, ApiError> {
    request.target_address()?;
    state.chain(request.chain_id)?;
    Ok(request.into_call()?)
}

fn resolve_legacy(
    state: &AppState,
    request: &LegacyExecuteRequest,
    default_cabal: Option<Address>,
) -> Result<RelayCall, ApiError> {
    state.chain(request.chain_id)?;
    Ok(request.into_call(default_cabal)?)
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| CabalError::Schema(format!("body is not valid JSON: {}", e)).into())
}

/// Intent pre-check, simulation and optional submission.
async fn relay(state: &AppState, call: RelayCall, dry_run: bool) -> Result<Json<Value>, ApiError> {
    let entry = state.chain(call.chain_id)?;
    check_intent(&call)?;

    info!(
        chain_id = call.chain_id,
        target = ?call.target,
        function = %call.descriptor.signature,
        "Relaying call"
    );

    let return_data = entry.client.simulate(&call).await.map_err(|err| {
        warn!(chain_id = call.chain_id, "Simulation failed: {}", err);
        ApiError::from(err)
    })?;

    let outputs = call
        .descriptor
        .function
        .decode_output(&return_data)
        .map(|tokens| tokens.iter().map(token_to_json).collect::<Vec<_>>())
        .ok();

    let mut data = serde_json::json!({
        "request": call.describe(),
        "result": {
            "returnData": return_data,
            "outputs": outputs,
        },
        "submitted": false,
    });

    if state.submit && !dry_run {
        let tx_hash = entry.client.submit(&call).await.map_err(|err| {
            warn!(chain_id = call.chain_id, "Submission failed: {}", err);
            ApiError::from(err)
        })?;
        data["submitted"] = Value::Bool(true);
        data["txHash"] = serde_json::json!(tx_hash);
    }

    Ok(Json(serde_json::json!({ "message": "ok", "data": data })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

pub mod main_entry {
    use super::*;
    use crate::config::LogFormat;
    use anyhow::Context;
    use std::net::SocketAddr;
    use tracing_subscriber::EnvFilter;

    fn init_tracing(format: LogFormat) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "cabal_relayer=info,tower_http=info".into());
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        match format {
            LogFormat::Json => builder.json().init(),
            LogFormat::Text => builder.init(),
        }
    }

    /// Connect a client per configured chain and assemble the state.
    pub async fn build_state(config: &RelayerConfig) -> anyhow::Result<AppState> {
        let mut state = AppState::new(config.submit);

        for chain in &config.chains {
            let client = EvmClient::new(&chain.rpc_url, &config.private_key, chain.id)
                .with_context(|| format!("Failed to configure chain {}", chain.id))?;
            info!("Enabling {} ({})", chain.name(), chain.id);
            state = state.with_chain(Arc::new(client), chain.min_balance);
        }

        if let Some(rpc_url) = &config.default_rpc_url {
            let already = config
                .default_chain_id
                .map_or(false, |id| state.chains.contains_key(&id));
            if already {
                warn!("RPC_URL ignored: RPC_URL_<chainId> already configures the default chain");
            } else {
                let client =
                    EvmClient::discover(rpc_url, &config.private_key, config.default_chain_id)
                        .await?;
                let chain_id = client.chain_id();
                if state.chains.contains_key(&chain_id) {
                    warn!("RPC_URL ignored: chain {} is already configured", chain_id);
                } else {
                    state = state.with_chain(Arc::new(client), config.min_balance);
                }
                state = state.with_default_chain(chain_id);
            }
        }

        if state.default_chain_id.is_none() {
            if let Some(chain_id) = config.default_chain_id {
                state = state.with_default_chain(chain_id);
            } else if state.chains.len() == 1 {
                if let Some(chain_id) = state.chains.keys().next().copied() {
                    state = state.with_default_chain(chain_id);
                }
            }
        }

        if let Some(cabal) = config.default_cabal {
            state = state.with_default_cabal(cabal);
        }

        Ok(state)
    }

    pub async fn run_server() -> anyhow::Result<()> {
        dotenvy::dotenv().ok();
        let config = RelayerConfig::from_env()?;
        init_tracing(config.log_format);

        info!("Starting cabal-relayer");
        info!("Configuration: {:?}", config);

        let state = build_state(&config).await?;
        if state.chains.is_empty() {
            warn!("No chains configured; set RPC_URL_<chainId> or RPC_URL");
        }
        if let Some(relayer) = state.relayer_address() {
            info!("Relayer account: {}", truncate_address(&ethers::utils::to_checksum(&relayer, None)));
        }
        if !state.submit {
            info!("Submission disabled; calls are simulated only");
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        info!("Cabal relayer listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app_router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Shutting down relayer...");
        Ok(())
    }

    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
