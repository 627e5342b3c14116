mod pastel;

pub use pastel::RecentBlocks;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use http::{HeaderValue, Method, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, trace};

use crate::config::NodeSettings;

const USER_AGENT: &str = concat!("pastel-rpc-bench/", env!("CARGO_PKG_VERSION"));

/// Coarse buckets the benchmark driver counts failures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Connection,
    Authentication,
    Application,
    Protocol,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Connection => "connection",
            FailureKind::Authentication => "authentication",
            FailureKind::Application => "application",
            FailureKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("node rejected credentials ({0})")]
    Authentication(StatusCode),

    #[error("node returned error {code}: {message}")]
    Application { code: i64, message: String },

    #[error("response has no result field")]
    MissingResult,

    #[error("result has no `{0}` field")]
    MissingField(&'static str),

    #[error("unexpected HTTP status {0}")]
    Http(StatusCode),

    #[error("malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
}

impl RpcError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RpcError::Connection(_) | RpcError::Timeout(_) => FailureKind::Connection,
            RpcError::Authentication(_) => FailureKind::Authentication,
            RpcError::Application { .. } => FailureKind::Application,
            RpcError::MissingResult
            | RpcError::MissingField(_)
            | RpcError::Http(_)
            | RpcError::Decode(_)
            | RpcError::Request(_)
            | RpcError::InvalidEndpoint(_) => FailureKind::Protocol,
        }
    }

    fn from_error_object(error: &Value) -> Self {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = match error.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        };
        RpcError::Application { code, message }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub max_in_flight: usize,
    /// Open HTTP/1 connections; each carries one request at a time.
    pub max_connections: usize,
    pub max_idle_per_host: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            max_in_flight: 1000,
            max_connections: 200,
            max_idle_per_host: 10,
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    version: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: u64,
}

/// One authenticated JSON-RPC POST per [`RpcClient::call`], over a pooled client.
pub struct RpcClient {
    endpoint: Uri,
    auth_header: HeaderValue,
    client: Client<HttpConnector, Full<Bytes>>,
    next_id: AtomicU64,
    in_flight: Semaphore,
    connections: Semaphore,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(settings: &NodeSettings, options: &ClientOptions) -> Result<Self, RpcError> {
        let endpoint_str = settings.endpoint();
        let endpoint: Uri = endpoint_str
            .parse()
            .map_err(|_| RpcError::InvalidEndpoint(endpoint_str.clone()))?;

        let credentials = BASE64.encode(format!("{}:{}", settings.user, settings.password));
        let auth_header = HeaderValue::from_str(&format!("Basic {}", credentials))
            .map_err(|_| RpcError::InvalidEndpoint(endpoint_str))?;

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(options.max_idle_per_host)
            .build(HttpConnector::new());

        Ok(Self {
            endpoint,
            auth_header,
            client,
            next_id: AtomicU64::new(0),
            in_flight: Semaphore::new(options.max_in_flight.max(1)),
            connections: Semaphore::new(options.max_connections.max(1)),
            timeout: options.timeout,
        })
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Sends one request and returns the `result` member of the reply.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| RpcError::Connection(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let body = serde_json::to_vec(&RpcRequest {
            version: "1.1",
            method,
            params,
            id,
        })?;
        trace!("-> #{} {} {:?}", id, method, params);

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(header::AUTHORIZATION, self.auth_header.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .body(Full::new(Bytes::from(body)))?;

        // the legacy client has no socket limit of its own
        let _connection = self
            .connections
            .acquire()
            .await
            .map_err(|e| RpcError::Connection(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| RpcError::Connection(e.to_string()))?;
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| RpcError::Connection(e.to_string()))?
                .to_bytes();
            Ok::<_, RpcError>((status, bytes))
        };

        let (status, bytes) = match time::timeout(self.timeout, exchange).await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(RpcError::Timeout(self.timeout)),
        };

        let result = decode_response(status, &bytes);
        if let Err(e) = &result {
            debug!("<- #{} {} failed: {}", id, method, e);
        }
        result
    }
}

fn decode_response(status: StatusCode, body: &[u8]) -> Result<Value, RpcError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RpcError::Authentication(status));
    }

    let reply: Value = match serde_json::from_slice(body) {
        Ok(reply) => reply,
        Err(_) if !status.is_success() => return Err(RpcError::Http(status)),
        Err(e) => return Err(RpcError::Decode(e)),
    };

    // bitcoind-style nodes answer application errors with HTTP 500 and a
    // JSON-RPC error object, so the body decides before the status does.
    match reply.get("error") {
        Some(error) if !error.is_null() => return Err(RpcError::from_error_object(error)),
        _ => {}
    }
    if !status.is_success() {
        return Err(RpcError::Http(status));
    }

    match reply {
        Value::Object(mut fields) => fields.remove("result").ok_or(RpcError::MissingResult),
        _ => Err(RpcError::MissingResult),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(status: StatusCode, body: Value) -> Result<Value, RpcError> {
        decode_response(status, body.to_string().as_bytes())
    }

    #[test]
    fn result_is_returned_even_when_null() {
        let ok = decode(StatusCode::OK, json!({"result": "abc", "error": null, "id": 1}));
        assert_eq!(ok.unwrap(), json!("abc"));

        let null = decode(StatusCode::OK, json!({"result": null, "error": null, "id": 1}));
        assert_eq!(null.unwrap(), Value::Null);
    }

    #[test]
    fn error_object_wins_over_status() {
        let err = decode(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"result": null, "error": {"code": -5, "message": "No such tx"}, "id": 1}),
        )
        .unwrap_err();

        assert!(matches!(&err, RpcError::Application { code: -5, message } if message == "No such tx"));
        assert_eq!(err.kind(), FailureKind::Application);
    }

    #[test]
    fn missing_result_is_a_protocol_failure() {
        let err = decode(StatusCode::OK, json!({"error": null, "id": 1})).unwrap_err();
        assert!(matches!(err, RpcError::MissingResult));
        assert_eq!(err.kind(), FailureKind::Protocol);
    }

    #[test]
    fn unauthorized_maps_to_authentication() {
        let err = decode_response(StatusCode::UNAUTHORIZED, b"").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Authentication);
    }

    #[test]
    fn non_json_bodies() {
        let err = decode_response(StatusCode::SERVICE_UNAVAILABLE, b"Work queue depth exceeded")
            .unwrap_err();
        assert!(matches!(err, RpcError::Http(s) if s == StatusCode::SERVICE_UNAVAILABLE));

        let err = decode_response(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }

    #[test]
    fn request_body_uses_version_1_1_envelope() {
        let params = [json!("newkey"), json!("pass")];
        let body = serde_json::to_value(RpcRequest {
            version: "1.1",
            method: "pastelid",
            params: &params,
            id: 7,
        })
        .unwrap();

        assert_eq!(
            body,
            json!({"version": "1.1", "method": "pastelid", "params": ["newkey", "pass"], "id": 7})
        );
    }
}
