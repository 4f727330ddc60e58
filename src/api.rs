// Relay HTTP API implementation
// This file provides HTTP endpoints for swap path decoding, fee estimation,
// submissions and transport administration
//
// Numan Thabit 2025 Nov

use crate::chain::{ChainDirectory, FeeEstimate, TokenRef, Transfer};
use crate::errors::RelayError;
use crate::fees::FeeEstimator;
use crate::pipeline::{Operation, SubmissionPipeline, SubmissionStats};
use crate::swap::{
    decode_swap_path, decode_swap_path_strict, render_route, TextDirection, TokenDirectory,
};
use crate::wallet::WalletStore;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handles behind every endpoint
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<SubmissionPipeline>,
    pub chains: Arc<ChainDirectory>,
    pub wallets: Arc<dyn WalletStore>,
    pub tokens: Arc<TokenDirectory>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            correlation_id: None,
        }),
    )
}

fn relay_status(err: &RelayError) -> StatusCode {
    match err {
        RelayError::UnsupportedCustody(_) | RelayError::CustodyDataUnavailable(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RelayError::DeviceNotConnected | RelayError::DeviceLocked => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::EstimationFailed(_) | RelayError::BroadcastRejected { .. } => {
            StatusCode::BAD_GATEWAY
        }
        RelayError::Cancelled => StatusCode::CONFLICT,
        RelayError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Create the HTTP router with API endpoints
pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/swap/decode", post(decode_path))
        .route("/api/v1/fees/estimate", post(estimate_fee))
        .route("/api/v1/fees/max", get(max_fee))
        .route("/api/v1/submissions", post(submit))
        .route("/api/v1/staking/unbonding", get(unbonding))
        .route("/api/v1/transports", get(list_transports))
        .route("/api/v1/transports/:address", delete(abort_transport))
        .route("/api/v1/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn metrics() -> Response {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buf) {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e).into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    pub path: String,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub direction: TextDirection,
}

#[derive(Debug, Serialize)]
pub struct DecodeResponse {
    pub tokens: Vec<String>,
    pub hops: usize,
    pub route: String,
}

async fn decode_path(
    State(state): State<ApiState>,
    Json(req): Json<DecodeRequest>,
) -> Result<Json<DecodeResponse>, ApiError> {
    let decoded = if req.strict {
        decode_swap_path_strict(&req.path)
    } else {
        decode_swap_path(&req.path)
    }
    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let hops = decoded.hops();
    let tokens = decoded.into_tokens();
    let route = render_route(&tokens, &state.tokens, req.direction);
    Ok(Json(DecodeResponse { tokens, hops, route }))
}

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub chain_id: u64,
    pub from: String,
    pub to: String,
    pub amount: u128,
    #[serde(default)]
    pub token_contract: Option<String>,
}

async fn estimate_fee(
    State(state): State<ApiState>,
    Json(req): Json<EstimateRequest>,
) -> Result<Json<FeeEstimate>, ApiError> {
    let chain = state
        .chains
        .get_by_eth_chain_id(req.chain_id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))?;
    let transfer = Transfer {
        from: req.from,
        to: req.to,
        amount: req.amount,
        token: req.token_contract.map(|contract| TokenRef {
            contract,
            chain_id: req.chain_id,
        }),
    };
    state
        .pipeline
        .fees()
        .estimate_accepted(&transfer, chain)
        .await
        .map(Json)
        .map_err(|e| api_error(relay_status(&e), e))
}

#[derive(Debug, Deserialize)]
pub struct MaxFeeQuery {
    pub chain_id: u64,
    pub from: String,
    pub to: String,
}

async fn max_fee(
    State(state): State<ApiState>,
    Query(q): Query<MaxFeeQuery>,
) -> Result<Json<FeeEstimate>, ApiError> {
    let chain = state
        .chains
        .get_by_eth_chain_id(q.chain_id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))?;
    let estimate = state
        .pipeline
        .fees()
        .preview_max_fee(state.wallets.as_ref(), &q.from, &q.to, chain)
        .await;
    FeeEstimator::accept(estimate, chain)
        .map(Json)
        .map_err(|e| api_error(relay_status(&e), e))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub wallet_id: String,
    pub chain_id: u64,
    pub operation: Operation,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub txhash: String,
    pub fee: FeeEstimate,
}

async fn submit(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let wallet = state
        .wallets
        .get_by_id(&req.wallet_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown wallet {}", req.wallet_id)))?;
    let chain = state
        .chains
        .get_by_eth_chain_id(req.chain_id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))?
        .clone();

    // One request is one flow; the transport is released when it ends.
    let flow = state.pipeline.begin(wallet, chain);
    let result = flow.submit(req.operation).await;
    flow.leave().await;

    match result {
        Ok(receipt) => Ok(Json(SubmitResponse {
            txhash: receipt.txhash,
            fee: receipt.fee,
        })),
        Err(failure) => Err((
            relay_status(&failure.error),
            Json(ErrorResponse {
                error: failure.message,
                correlation_id: Some(failure.correlation_id),
            }),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChainQuery {
    pub chain_id: u64,
}

#[derive(Debug, Serialize)]
pub struct UnbondingResponse {
    pub unbonding_ms: u64,
}

async fn unbonding(
    State(state): State<ApiState>,
    Query(q): Query<ChainQuery>,
) -> Result<Json<UnbondingResponse>, ApiError> {
    let chain = state
        .chains
        .get_by_eth_chain_id(q.chain_id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))?;
    let period = state.pipeline.unbonding_period(chain).await;
    Ok(Json(UnbondingResponse {
        unbonding_ms: period.as_millis() as u64,
    }))
}

#[derive(Debug, Serialize)]
pub struct TransportsResponse {
    pub addresses: Vec<String>,
}

async fn list_transports(State(state): State<ApiState>) -> Json<TransportsResponse> {
    Json(TransportsResponse {
        addresses: state.pipeline.registry().addresses().await,
    })
}

async fn abort_transport(State(state): State<ApiState>, Path(address): Path<String>) -> StatusCode {
    if state.pipeline.registry().abort_address(&address).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub submissions: SubmissionStats,
    pub live_transports: usize,
}

async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        submissions: state.pipeline.get_stats(),
        live_transports: state.pipeline.registry().len().await,
    })
}
