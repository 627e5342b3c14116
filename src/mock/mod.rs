use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::NodeSettings;

const RPC_INVALID_PARAMETER: i64 = -8;
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
const RPC_METHOD_NOT_FOUND: i64 = -32601;
const RPC_MISC_ERROR: i64 = -1;

#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub user: String,
    pub password: String,
    pub tip_height: u64,
    /// Delay before every reply.
    pub latency: Duration,
    /// Methods that always answer with an application error.
    pub failing_methods: HashSet<String>,
    /// Requests beyond this many in flight get `503 Work queue depth exceeded`.
    pub max_in_flight: Option<usize>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            user: "user".to_string(),
            password: "pass".to_string(),
            tip_height: 120,
            latency: Duration::ZERO,
            failing_methods: HashSet::new(),
            max_in_flight: None,
        }
    }
}

struct NodeState {
    behavior: MockBehavior,
    expected_auth: String,
    requests: AtomicU64,
    in_flight: AtomicUsize,
    keys: AtomicU64,
}

/// Stand-in node for tests and dry runs. Block `h` has hash `{h:064x}` and two txs.
pub struct MockNode {
    addr: SocketAddr,
    state: Arc<NodeState>,
    handle: JoinHandle<()>,
}

impl MockNode {
    /// Starts on an ephemeral localhost port.
    pub async fn start(behavior: MockBehavior) -> io::Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), behavior).await
    }

    pub async fn bind(addr: SocketAddr, behavior: MockBehavior) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let expected_auth = format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", behavior.user, behavior.password))
        );
        let state = Arc::new(NodeState {
            behavior,
            expected_auth,
            requests: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            keys: AtomicU64::new(0),
        });

        let serve_state = state.clone();
        let handle = tokio::spawn(async move {
            serve(listener, serve_state).await;
        });
        info!("Mock node listening on {}", addr);

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connection settings matching this node's address and credentials.
    pub fn settings(&self) -> NodeSettings {
        NodeSettings {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            user: self.state.behavior.user.clone(),
            password: self.state.behavior.password.clone(),
            other: HashMap::new(),
        }
    }

    pub fn requests(&self) -> u64 {
        self.state.requests.load(Ordering::Relaxed)
    }

    /// Serves until the accept loop ends.
    pub async fn wait(mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(listener: TcpListener, state: Arc<NodeState>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, state.clone()));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection from {} closed with error: {}", peer, e);
            }
        });
    }
}

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<NodeState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    state.requests.fetch_add(1, Ordering::Relaxed);

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value.as_bytes() == state.expected_auth.as_bytes());
    if !authorized {
        return Ok(reply(StatusCode::UNAUTHORIZED, Bytes::new()));
    }

    let depth = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    let _guard = InFlight(&state.in_flight);
    if state.behavior.max_in_flight.is_some_and(|max| depth > max) {
        return Ok(reply(
            StatusCode::SERVICE_UNAVAILABLE,
            "Work queue depth exceeded",
        ));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            return Ok(reply(StatusCode::BAD_REQUEST, Bytes::new()));
        }
    };
    let request: Value = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return Ok(reply(StatusCode::BAD_REQUEST, Bytes::new())),
    };

    if !state.behavior.latency.is_zero() {
        tokio::time::sleep(state.behavior.latency).await;
    }

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let params = request
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let outcome = if state.behavior.failing_methods.contains(method) {
        Err((RPC_MISC_ERROR, format!("{} is disabled on this node", method)))
    } else {
        dispatch(&state, method, &params)
    };

    let response = match outcome {
        Ok(result) => reply(
            StatusCode::OK,
            json!({"result": result, "error": null, "id": id}).to_string(),
        ),
        Err((code, message)) => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"result": null, "error": {"code": code, "message": message}, "id": id})
                .to_string(),
        ),
    };
    Ok(response)
}

type Outcome = Result<Value, (i64, String)>;

fn block_hash_at(height: u64) -> String {
    format!("{:064x}", height)
}

fn txid(height: u64, index: u64) -> String {
    format!("{:056x}{:08x}", height, index)
}

fn str_param(params: &[Value], i: usize) -> &str {
    params.get(i).and_then(Value::as_str).unwrap_or("")
}

fn dispatch(state: &NodeState, method: &str, params: &[Value]) -> Outcome {
    let tip = state.behavior.tip_height;
    match method {
        "pastelid" => pastelid(state, params),
        "getbestblockhash" => Ok(json!(block_hash_at(tip))),
        "getblockhash" => match params.first().and_then(Value::as_u64) {
            Some(height) if height <= tip => Ok(json!(block_hash_at(height))),
            _ => Err((RPC_INVALID_PARAMETER, "Block height out of range".to_string())),
        },
        "getblock" => match u64::from_str_radix(str_param(params, 0), 16) {
            Ok(height) if height <= tip && str_param(params, 0).len() == 64 => Ok(json!({
                "hash": block_hash_at(height),
                "height": height,
                "confirmations": tip - height + 1,
                "tx": [txid(height, 0), txid(height, 1)],
            })),
            _ => Err((RPC_INVALID_ADDRESS_OR_KEY, "Block not found".to_string())),
        },
        "getrawtransaction" => {
            let id = str_param(params, 0);
            match (id.len(), u64::from_str_radix(id.get(..56).unwrap_or(""), 16)) {
                (64, Ok(height)) if height <= tip => Ok(json!(format!("0400008085202f89{}", id))),
                _ => Err((
                    RPC_INVALID_ADDRESS_OR_KEY,
                    "No information available about transaction".to_string(),
                )),
            }
        }
        "masternode" if str_param(params, 0) == "top" => {
            let mut top = serde_json::Map::new();
            top.insert(
                tip.to_string(),
                json!([
                    {"rank": "1", "IP:port": "10.0.0.1:9933", "protocol": "170008"},
                    {"rank": "2", "IP:port": "10.0.0.2:9933", "protocol": "170008"},
                ]),
            );
            Ok(Value::Object(top))
        }
        _ => Err((RPC_METHOD_NOT_FOUND, "Method not found".to_string())),
    }
}

fn pastelid(state: &NodeState, params: &[Value]) -> Outcome {
    match str_param(params, 0) {
        "newkey" => {
            if str_param(params, 1).is_empty() {
                return Err((RPC_INVALID_PARAMETER, "passphrase is empty".to_string()));
            }
            let n = state.keys.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(json!({"pastelid": format!("jXmock{:040}", n)}))
        }
        "sign" => {
            let (message, key) = (str_param(params, 1), str_param(params, 2));
            if !key.starts_with("jXmock") {
                return Err((RPC_INVALID_ADDRESS_OR_KEY, "PastelID not found".to_string()));
            }
            Ok(json!({"signature": mock_signature(message, key)}))
        }
        "verify" => {
            let (message, signature, key) =
                (str_param(params, 1), str_param(params, 2), str_param(params, 3));
            if signature.is_empty() || key.is_empty() {
                return Err((RPC_INVALID_PARAMETER, "signature and PastelID are required".to_string()));
            }
            let verdict = if signature == mock_signature(message, key) {
                "OK"
            } else {
                "Failed"
            };
            Ok(json!({"verification": verdict}))
        }
        other => Err((RPC_INVALID_PARAMETER, format!("unknown pastelid command `{}`", other))),
    }
}

fn mock_signature(message: &str, key: &str) -> String {
    BASE64.encode(format!("{}|{}", key, message))
}
