use thiserror::Error;

use crate::models::Chain;

const RETRYABLE_STATUS: [u16; 3] = [429, 502, 503];

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed RPC response: {0}")]
    Decode(String),

    #[error("scan budget exhausted")]
    BudgetExhausted,
}

impl RpcError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Status { status, .. } => RETRYABLE_STATUS.contains(status),
            RpcError::Timeout { .. } | RpcError::Connect { .. } => true,
            _ => false,
        }
    }

    /// Providers phrase this differently ("block range too large", "range exceeds limit", ...).
    pub fn is_range_too_large(&self) -> bool {
        let text = self.to_string().to_lowercase();
        text.contains("range")
            && (text.contains("large") || text.contains("exceed") || text.contains("limit"))
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Token not found on {chain}: {token}")]
    TokenNotFound { chain: Chain, token: String },

    #[error("Failed to fetch data: {0}")]
    Upstream(#[from] RpcError),

    #[error("{0}")]
    Metadata(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl ReceiptError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ReceiptError::TokenNotFound { .. } => true,
            other => other.to_string().to_lowercase().contains("not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_and_network_failures() {
        let url = "http://rpc".to_string();
        for status in [429, 502, 503] {
            assert!(RpcError::Status { status, url: url.clone() }.is_retryable());
        }
        assert!(!RpcError::Status { status: 500, url: url.clone() }.is_retryable());
        assert!(!RpcError::Status { status: 400, url: url.clone() }.is_retryable());
        assert!(RpcError::Timeout { url: url.clone() }.is_retryable());
        assert!(
            RpcError::Connect {
                url,
                reason: "refused".into()
            }
            .is_retryable()
        );
        assert!(
            !RpcError::Rpc {
                code: -32000,
                message: "boom".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn detects_range_errors() {
        let err = RpcError::Rpc {
            code: -32005,
            message: "query returned more than 10000 results. Block range too large".into(),
        };
        assert!(err.is_range_too_large());

        let err = RpcError::Rpc {
            code: -32602,
            message: "eth_getLogs range exceeds maximum allowed".into(),
        };
        assert!(err.is_range_too_large());

        let err = RpcError::Rpc {
            code: -32000,
            message: "header not found".into(),
        };
        assert!(!err.is_range_too_large());
    }
}
