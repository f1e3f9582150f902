pub mod evm;
pub mod solana;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::budget::ScanBudget;
use crate::error::RpcError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_DELAYS_MS: [u64; 3] = [150, 300, 600];

/// One JSON-RPC attempt against one endpoint. Retry and rotation live in [`RpcClient`].
#[async_trait]
pub trait RpcTransport: Send + Sync {
    fn endpoints(&self) -> &[String];

    async fn send(&self, index: usize, method: &str, params: &Value) -> Result<Value, RpcError>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
pub struct ErrorObj {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObj>,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpTransport {
    pub fn new(urls: &[String]) -> Result<Self> {
        if urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            urls: urls.to_vec(),
        })
    }
}

fn classify(url: &str, e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        RpcError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        }
    } else {
        RpcError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    fn endpoints(&self) -> &[String] {
        &self.urls
    }

    async fn send(&self, index: usize, method: &str, params: &Value) -> Result<Value, RpcError> {
        let url = &self.urls[index % self.urls.len()];
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))?;
        body.into_result()
    }
}

/// JSON-RPC client with bounded retries and sticky round-robin fallback.
///
/// The endpoint cursor is shared between clones, so once a provider fails
/// every later call starts on the one that answered.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    label: String,
    current: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(urls: &[String], label: &str) -> Result<Self> {
        let transport = HttpTransport::new(urls)
            .with_context(|| format!("Failed to create {label} RPC transport"))?;
        Ok(Self::with_transport(Arc::new(transport), label))
    }

    pub fn with_transport(transport: Arc<dyn RpcTransport>, label: &str) -> Self {
        Self {
            transport,
            label: label.to_string(),
            current: Arc::new(AtomicUsize::new(0)),
            max_retries: RETRY_DELAYS_MS.len(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn current_target(&self) -> &str {
        let urls = self.transport.endpoints();
        urls.get(self.current_index())
            .map(String::as_str)
            .unwrap_or("")
    }

    fn current_index(&self) -> usize {
        let len = self.transport.endpoints().len().max(1);
        self.current.load(Ordering::Relaxed) % len
    }

    fn rotate(&self) -> usize {
        let len = self.transport.endpoints().len().max(1);
        let next = (self.current.load(Ordering::Relaxed) + 1) % len;
        self.current.store(next, Ordering::Relaxed);
        next
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.call_within(method, params, None).await
    }

    /// Like [`call`](Self::call), but every attempt is charged to `budget`. A
    /// retry is only scheduled when its backoff still ends inside the deadline.
    pub async fn call_within(
        &self,
        method: &str,
        params: Value,
        budget: Option<&ScanBudget>,
    ) -> Result<Value, RpcError> {
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;
        let params = &params;
        let delays = RETRY_DELAYS_MS
            .iter()
            .take(self.max_retries)
            .map(|ms| Duration::from_millis(*ms));

        RetryIf::spawn(
            delays,
            move || async move {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed);
                self.attempt(method, params, budget, attempt).await
            },
            |e: &RpcError| {
                let made = attempts.load(Ordering::Relaxed);
                let backoff = RETRY_DELAYS_MS
                    .get(made.saturating_sub(1))
                    .map_or(Duration::ZERO, |ms| Duration::from_millis(*ms));
                e.is_retryable() && budget.is_none_or(|b| b.can_retry_after(backoff))
            },
        )
        .await
    }

    async fn attempt(
        &self,
        method: &str,
        params: &Value,
        budget: Option<&ScanBudget>,
        attempt: usize,
    ) -> Result<Value, RpcError> {
        if let Some(budget) = budget {
            if attempt > 0 && budget.is_exhausted() {
                debug!(label = %self.label, method, attempt, "budget spent before retry");
                return Err(RpcError::BudgetExhausted);
            }
            budget.record_call();
        }

        let index = self.current_index();
        let result = self.transport.send(index, method, params).await;

        match &result {
            Err(e) if e.is_retryable() => {
                let target = self.current_target().to_string();
                let next = self.rotate();
                let next_target = self
                    .transport
                    .endpoints()
                    .get(next)
                    .cloned()
                    .unwrap_or_default();
                if attempt < self.max_retries {
                    warn!(
                        label = %self.label,
                        method,
                        target = %target,
                        next_target = %next_target,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        wait_ms = RETRY_DELAYS_MS[attempt],
                        error = %e,
                        "retryable RPC failure"
                    );
                } else {
                    warn!(
                        label = %self.label,
                        method,
                        target = %target,
                        attempt = attempt + 1,
                        error = %e,
                        "RPC retries exhausted"
                    );
                }
            }
            Err(e) => debug!(label = %self.label, method, error = %e, "RPC call failed"),
            Ok(_) => {}
        }

        result
    }
}
