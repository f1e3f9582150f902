use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, Method, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::AppState;
use super::params::extract_str;

pub const WINDOW: Duration = Duration::from_secs(60);
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Limited {
    PerIp { max: usize },
    PerTarget { max: usize },
}

impl Limited {
    fn message(&self) -> String {
        let window = WINDOW.as_secs();
        match self {
            Limited::PerIp { max } => {
                format!("Too many requests. Limit: {max} per {window}s.")
            }
            Limited::PerTarget { max } => format!(
                "Too many requests for this wallet+token pair. Limit: {max} per {window}s."
            ),
        }
    }
}

/// In-memory sliding-window limiter with two buckets: one per client IP and
/// one per chain + wallet + token.
#[derive(Debug)]
pub struct RateLimiter {
    per_ip: usize,
    per_target: usize,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(per_ip: usize, per_target: usize) -> Self {
        Self {
            per_ip,
            per_target,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit on both keys unless either bucket is already full.
    pub fn check(&self, ip: &str, target: Option<&str>) -> Result<(), Limited> {
        let Ok(mut hits) = self.hits.lock() else {
            return Ok(());
        };
        let now = Instant::now();

        let ip_key = format!("ip:{ip}");
        if Self::count(&mut hits, &ip_key, now) >= self.per_ip {
            return Err(Limited::PerIp { max: self.per_ip });
        }

        let target_key = target.map(|t| format!("wt:{t}"));
        if let Some(key) = &target_key {
            if Self::count(&mut hits, key, now) >= self.per_target {
                return Err(Limited::PerTarget {
                    max: self.per_target,
                });
            }
        }

        hits.entry(ip_key).or_default().push_back(now);
        if let Some(key) = target_key {
            hits.entry(key).or_default().push_back(now);
        }
        Ok(())
    }

    fn count(hits: &mut HashMap<String, VecDeque<Instant>>, key: &str, now: Instant) -> usize {
        let Some(window) = hits.get_mut(key) else {
            return 0;
        };
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= WINDOW)
        {
            window.pop_front();
        }
        window.len()
    }
}

/// `chain:wallet:token`, lowercased, when the body names both.
fn target_key(chain: &str, body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;
    let wallet = extract_str(object, "address", &["wallet", "addr"], false)?;
    let token = extract_str(object, "token", &["mint", "contract"], false)?;
    Some(format!(
        "{chain}:{}:{}",
        wallet.to_lowercase(),
        token.to_lowercase()
    ))
}

pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let chain = request
        .uri()
        .path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "rate limiter could not buffer request body");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({"error": "invalid_body", "message": "Request body too large"})),
            )
                .into_response();
        }
    };

    let target = target_key(&chain, &bytes);
    if let Err(limited) = state.limiter.check(&ip, target.as_deref()) {
        warn!(ip, ?limited, "rate limited");
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate_limited", "message": limited.message()})),
        )
            .into_response();
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(WINDOW.as_secs()));
        return response;
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_ip_bucket_fills() {
        let limiter = RateLimiter::new(2, 10);
        assert!(limiter.check("1.2.3.4", None).is_ok());
        assert!(limiter.check("1.2.3.4", None).is_ok());
        assert_eq!(
            limiter.check("1.2.3.4", None),
            Err(Limited::PerIp { max: 2 })
        );
        assert!(limiter.check("5.6.7.8", None).is_ok());
    }

    #[test]
    fn per_target_bucket_is_independent_of_ip() {
        let limiter = RateLimiter::new(100, 1);
        assert!(limiter.check("a", Some("base:w:t")).is_ok());
        assert_eq!(
            limiter.check("b", Some("base:w:t")),
            Err(Limited::PerTarget { max: 1 })
        );
        assert!(limiter.check("b", Some("base:w:other")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.check("ip", None).is_ok());
        assert!(limiter.check("ip", None).is_err());
        tokio::time::advance(WINDOW).await;
        assert!(limiter.check("ip", None).is_ok());
    }

    #[test]
    fn target_key_reads_nested_bodies() {
        let body = br#"{"body":{"wallet":"0xABC","mint":"Tok"}}"#;
        assert_eq!(target_key("solana", body), Some("solana:0xabc:tok".into()));
        assert_eq!(target_key("base", br#"{"address":"0x1"}"#), None);
        assert_eq!(target_key("base", b"not json"), None);
    }
}
