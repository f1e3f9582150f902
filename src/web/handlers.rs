use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

use super::AppState;
use super::params::{extract_param, extract_str};
use crate::error::{ReceiptError, RpcError};
use crate::metadata::resolve_symbol;
use crate::models::{Chain, Depth};
use crate::validation::{
    is_native_ticker, validate_address, validate_chain, validate_depth, validate_token,
};

const READY_TIMEOUT: Duration = Duration::from_secs(3);
const ECHO_LIMIT: usize = 200;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: &'static str,
    message: String,
    received_body: Map<String, Value>,
}

impl ApiError {
    /// Echoes the request body back with every value stringified and cut to 200 chars.
    pub fn new(
        status: StatusCode,
        error: &'static str,
        message: impl Into<String>,
        body: Option<&Map<String, Value>>,
    ) -> Self {
        let received_body = body
            .map(|body| {
                body.iter()
                    .map(|(k, v)| (k.clone(), Value::String(echo(v))))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            status,
            error,
            message: message.into(),
            received_body,
        }
    }

    fn bad_request(error: &'static str, message: impl Into<String>, body: &Map<String, Value>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, message, Some(body))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

fn echo(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(ECHO_LIMIT).collect()
}

fn title_case(chain: Chain) -> String {
    let name = chain.as_str();
    let mut chars = name.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn check_upstream<F>(call: F) -> &'static str
where
    F: Future<Output = Result<Value, RpcError>>,
{
    match timeout(READY_TIMEOUT, call).await {
        Ok(Ok(_)) => "ok",
        Ok(Err(RpcError::Rpc { .. } | RpcError::Decode(_))) => "error",
        Ok(Err(_)) | Err(_) => "unreachable",
    }
}

pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (base, solana) = tokio::join!(
        check_upstream(state.base_rpc.call("eth_blockNumber", json!([]))),
        check_upstream(state.solana_rpc.get_health()),
    );

    let all_ok = base == "ok" && solana == "ok";
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if all_ok { "ok" } else { "degraded" },
            "checks": {"base_rpc": base, "solana_rpc": solana},
        })),
    )
}

pub async fn describe_endpoint(Path(chain): Path<String>) -> Response {
    let chain = match validate_chain(&chain) {
        Ok(chain) => chain,
        Err(message) => {
            return ApiError::new(StatusCode::BAD_REQUEST, "invalid_chain", message, None)
                .into_response();
        }
    };

    Json(json!({
        "endpoint": format!("/v1/position-receipt/{chain}"),
        "method": "POST",
        "description": format!(
            "Verify a wallet's current position in any token on {}: single-token verification \
             with holding duration estimates and confidence levels",
            title_case(chain)
        ),
        "chain": chain,
        "parameters": {
            "address": "Wallet address (required)",
            "token": "Token contract address or mint address (required)",
            "depth": "fast | standard | deep (optional, default: standard), controls scan window size",
        },
    }))
    .into_response()
}

pub async fn position_receipt(
    State(state): State<AppState>,
    Path(chain): Path<String>,
    raw: Bytes,
) -> Response {
    match build_receipt(&state, &chain, &raw).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn build_receipt(state: &AppState, chain: &str, raw: &[u8]) -> Result<Response, ApiError> {
    let body: Value = serde_json::from_slice(raw).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_body",
            "Request body must be valid JSON",
            None,
        )
    })?;
    let body = match body {
        Value::Object(body) => body,
        other => {
            let mut raw_echo = Map::new();
            raw_echo.insert("raw".into(), other);
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                "Request body must be a JSON object",
                Some(&raw_echo),
            ));
        }
    };

    let chain = validate_chain(chain).map_err(|m| ApiError::bad_request("invalid_chain", m, &body))?;

    let address = extract_str(&body, "address", &["wallet", "addr"], true);
    // Tickers such as "USDC" resolve through the local registry.
    let token = match extract_str(&body, "token", &["mint", "contract", "token_address"], false) {
        Some(symbol) if validate_token(chain, symbol).is_err() && !is_native_ticker(symbol) => {
            Some(resolve_symbol(chain, symbol).ok_or_else(|| {
                ApiError::bad_request(
                    "unknown_symbol",
                    format!("Could not resolve token symbol '{symbol}' to an address on {chain}"),
                    &body,
                )
            })?)
        }
        other => other,
    };

    let address = address
        .ok_or_else(|| ApiError::bad_request("missing_address", "address is required", &body))?;
    let token =
        token.ok_or_else(|| ApiError::bad_request("missing_token", "token is required", &body))?;

    validate_address(chain, address).map_err(|m| ApiError::bad_request("invalid_address", m, &body))?;
    validate_token(chain, token).map_err(|m| ApiError::bad_request("invalid_token", m, &body))?;
    let depth = match extract_param(&body, "depth", &[], false).and_then(Value::as_str) {
        Some(depth) => {
            validate_depth(depth).map_err(|m| ApiError::bad_request("invalid_depth", m, &body))?
        }
        None => Depth::default(),
    };

    info!(%chain, address, token, %depth, "position receipt requested");

    match state.receipts.build(chain, address, token, depth).await {
        Ok(receipt) => Ok(Json(receipt).into_response()),
        Err(e) => {
            error!(%chain, address, token, error = %e, "receipt failed");
            if e.is_not_found() {
                return Err(ApiError::new(
                    StatusCode::NOT_FOUND,
                    "token_not_found",
                    format!("Token not found on {chain}: {token}"),
                    Some(&body),
                ));
            }
            let detail = match &e {
                ReceiptError::Upstream(inner) => inner.to_string(),
                other => other.to_string(),
            };
            Err(ApiError::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("Failed to fetch data: {detail}"),
                Some(&body),
            ))
        }
    }
}
