//! HTTP client for forwarding requests to the real service

use std::time::Duration;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::interaction::{split_header, Body, ServiceResponse};
use crate::interactor::{Upstream, UpstreamRequest};
use crate::{Result, ScriptError};

/// Request headers the client computes itself
const SKIPPED_REQUEST_HEADERS: [&str; 4] =
    ["host", "content-length", "transfer-encoding", "connection"];

/// HTTP client for forwarding requests
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client
    #[must_use]
    pub fn new(timeout: Duration, max_response_size: usize) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self {
            client,
            timeout,
            max_response_size,
        }
    }

    fn build_request(request: &UpstreamRequest) -> Result<Request<Full<Bytes>>> {
        let uri = request
            .url
            .parse::<Uri>()
            .map_err(|e| ScriptError::Upstream(format!("Invalid URI '{}': {e}", request.url)))?;

        let method = request.method.parse::<Method>().map_err(|e| {
            ScriptError::Upstream(format!("Invalid HTTP method '{}': {e}", request.method))
        })?;

        let mut request_builder = Request::builder().method(method).uri(uri);

        let mut has_content_type = false;
        for header in &request.headers {
            let (name, value) = split_header(header);
            if SKIPPED_REQUEST_HEADERS
                .iter()
                .any(|skipped| name.eq_ignore_ascii_case(skipped))
            {
                continue;
            }
            has_content_type |= name.eq_ignore_ascii_case("content-type");
            request_builder = request_builder.header(name, value);
        }
        if !has_content_type && !request.content_type.is_empty() {
            request_builder = request_builder.header(CONTENT_TYPE, request.content_type.as_str());
        }

        request_builder
            .body(Full::new(Bytes::copy_from_slice(request.body.as_bytes())))
            .map_err(|e| ScriptError::Upstream(format!("Failed to build request: {e}")))
    }
}

impl Upstream for HttpClient {
    async fn send(&self, request: UpstreamRequest) -> Result<ServiceResponse> {
        let http_request = Self::build_request(&request)?;

        debug!("Forwarding {} to {}", request.method, request.url);

        let response = tokio::time::timeout(self.timeout, self.client.request(http_request))
            .await
            .map_err(|_| {
                ScriptError::Upstream(format!(
                    "Request to {} timed out after {} ms",
                    request.url,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                warn!("Request failed: {e}");
                ScriptError::Upstream(format!("Request to {} failed: {e}", request.url))
            })?;

        let status_code = response.status().as_u16();

        let mut content_type = None;
        let mut headers = Vec::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).to_string();
            if *name == CONTENT_TYPE {
                content_type.get_or_insert(value);
            } else {
                headers.push(format!("{name}: {value}"));
            }
        }

        let body_bytes = Limited::new(response.into_body(), self.max_response_size)
            .collect()
            .await
            .map_err(|e| ScriptError::Upstream(format!("Failed to read response body: {e}")))?
            .to_bytes();

        let body = Body::from_bytes(body_bytes.to_vec(), content_type.as_deref().unwrap_or(""));

        Ok(ServiceResponse {
            status_code,
            headers,
            body,
            content_type,
        })
    }
}
