//! HTTP front end that feeds requests into a session

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::LimitsConfig;
use crate::interaction::{split_header, Body, ServiceResponse};
use crate::interactor::{Interactor, ScriptSummary};
use crate::session::{ClientRequest, Session};
use crate::{Result, ScriptError};

use super::connection_pool::ConnectionPool;
use super::SHUTDOWN_TIMEOUT_MS;

/// Response headers the server computes itself
const SKIPPED_RESPONSE_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Serves one session over HTTP/1.1
///
/// Requests are handled one at a time: the session sits behind an async mutex
/// that each request holds until its response is ready.
pub struct ScriptServer<I: Interactor + 'static> {
    session: Arc<Mutex<Session<I>>>,
    limits: Arc<LimitsConfig>,
    connection_pool: ConnectionPool,
    shutdown_tx: broadcast::Sender<()>,
}

impl<I: Interactor + 'static> ScriptServer<I> {
    /// Create a server around a session
    ///
    /// # Errors
    ///
    /// Returns error if `limits.max_connections` is 0
    pub fn new(session: Session<I>, limits: LimitsConfig) -> Result<Self> {
        let connection_pool = ConnectionPool::new(limits.max_connections)?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            limits: Arc::new(limits),
            connection_pool,
            shutdown_tx,
        })
    }

    /// Sender that stops the server when signalled
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind `addr` and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the script cannot be finished
    pub async fn serve(self, addr: SocketAddr) -> Result<ScriptSummary> {
        let listener = TcpListener::bind(addr).await?;
        self.run(listener).await
    }

    /// Serve connections from `listener` until Ctrl-C or the shutdown handle fires,
    /// then finish the session's script
    ///
    /// # Errors
    ///
    /// Returns error if the script cannot be finished
    pub async fn run(self, listener: TcpListener) -> Result<ScriptSummary> {
        let local_addr = listener.local_addr()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        info!("Listening on {local_addr}");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let Some(guard) = self.connection_pool.try_acquire() else {
                                warn!("Connection limit reached, rejecting {peer_addr}");
                                drop(stream);
                                continue;
                            };

                            debug!("Accepted connection from {peer_addr}");
                            let session = Arc::clone(&self.session);
                            let limits = Arc::clone(&self.limits);

                            connections.spawn(async move {
                                let _guard = guard;
                                let service = service_fn(move |request| {
                                    handle_request(
                                        request,
                                        Arc::clone(&session),
                                        Arc::clone(&limits),
                                        local_addr,
                                    )
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await
                                {
                                    warn!("Connection error from {peer_addr}: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {e}");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
            }
        }

        drop(listener);

        // Let in-flight interactions land in the script
        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        if tokio::time::timeout(shutdown_timeout, async {
            while let Some(result) = connections.join_next().await {
                if let Err(e) = result {
                    warn!("Connection task failed: {e}");
                }
            }
        })
        .await
        .is_err()
        {
            warn!("Connections still open after {SHUTDOWN_TIMEOUT_MS} ms, aborting them");
            connections.abort_all();
        }

        let summary = self.session.lock().await.finish()?;
        info!(
            "Session finished: {} interaction(s){}",
            summary.interactions,
            if summary.failed { ", failed" } else { "" }
        );
        Ok(summary)
    }
}

async fn handle_request<I: Interactor>(
    request: Request<Incoming>,
    session: Arc<Mutex<Session<I>>>,
    limits: Arc<LimitsConfig>,
    local_addr: SocketAddr,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    if request.method() == Method::CONNECT {
        return Ok(create_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONNECT is not supported",
        ));
    }

    let client_request = match decode_request(request, &limits, local_addr).await {
        Ok(client_request) => client_request,
        Err(e) => return Ok(error_response(&e)),
    };

    let result = session.lock().await.handle(client_request).await;
    match result {
        Ok(response) => Ok(render_response(response)),
        Err(e) => {
            error!("Request failed: {e}");
            Ok(error_response(&e))
        }
    }
}

/// Decode a hyper request into the session's representation
async fn decode_request(
    request: Request<Incoming>,
    limits: &LimitsConfig,
    local_addr: SocketAddr,
) -> Result<ClientRequest> {
    let (parts, body) = request.into_parts();

    if parts.headers.len() > limits.max_headers {
        return Err(ScriptError::Other(format!(
            "Too many headers: {}",
            parts.headers.len()
        )));
    }

    let path = parts
        .uri
        .path_and_query()
        .map_or_else(|| "/".to_string(), ToString::to_string);

    // Absolute-form targets arrive when the server is used as a proxy
    let url = if parts.uri.scheme().is_some() {
        parts.uri.to_string()
    } else {
        let host = parts
            .headers
            .get(HOST)
            .and_then(|host| host.to_str().ok())
            .map_or_else(|| local_addr.to_string(), ToString::to_string);
        format!("http://{host}{path}")
    };

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).to_string())
        .unwrap_or_default();

    let bytes = read_body(body, limits.max_request_size).await?;

    Ok(ClientRequest {
        method: parts.method.to_string(),
        path,
        url,
        headers,
        body: Body::from_bytes(bytes.to_vec(), &content_type),
        content_type,
    })
}

/// Read request body with size limit
async fn read_body(body: Incoming, max_size: usize) -> Result<Bytes> {
    let collected = Limited::new(body, max_size).collect().await.map_err(|e| {
        if e.is::<http_body_util::LengthLimitError>() {
            ScriptError::DataTooLarge {
                size: max_size + 1,
                limit: max_size,
            }
        } else {
            ScriptError::Other(format!("Failed to read body: {e}"))
        }
    })?;

    Ok(collected.to_bytes())
}

/// Render a session response onto the wire
fn render_response(service_response: ServiceResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(service_response.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match service_response.body {
        Body::Text(text) => Bytes::from(text),
        Body::Binary(bytes) => Bytes::from(bytes),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for header in &service_response.headers {
        let (name, value) = split_header(header);
        if SKIPPED_RESPONSE_HEADERS
            .iter()
            .any(|skipped| name.eq_ignore_ascii_case(skipped))
            || (service_response.content_type.is_some()
                && name.eq_ignore_ascii_case("content-type"))
        {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Skipping unrepresentable header '{header}'"),
        }
    }

    if let Some(content_type) = &service_response.content_type {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
    }

    response
}

/// Create a plain-text response
fn create_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// Create an error response
fn error_response(error: &ScriptError) -> Response<Full<Bytes>> {
    let status = match error {
        ScriptError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    create_response(status, &format!("Error: {error}"))
}
