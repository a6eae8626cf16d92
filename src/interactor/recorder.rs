//! Recording interactor: live upstream calls accumulated into a script

use std::future::Future;

use tracing::{debug, info, warn};

use crate::interaction::{split_header, Body, Interaction, ServiceResponse};
use crate::script::{serialize, ScriptSink};
use crate::Result;

use super::{claim_index, Interactor, ScriptSummary};

/// Request forwarded to the real service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    /// HTTP method
    pub method: String,
    /// Absolute URL on the real service
    pub url: String,
    /// Headers as `Name: value` lines
    pub headers: Vec<String>,
    /// Request body
    pub body: Body,
    /// Declared content type (empty when absent)
    pub content_type: String,
}

/// The real service
pub trait Upstream: Send + Sync {
    /// Perform one request/response round trip
    ///
    /// Failures surface as [`crate::ScriptError::Upstream`].
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> impl Future<Output = Result<ServiceResponse>> + Send;
}

/// Records a session against the real service
pub struct Recorder<U: Upstream, S: ScriptSink> {
    upstream: U,
    base_url: String,
    sink: S,
    interactions: Vec<Interaction>,
    next_index: usize,
    front_end_authority: Option<String>,
    written: bool,
}

impl<U: Upstream, S: ScriptSink> Recorder<U, S> {
    /// Create a recorder forwarding to `base_url`
    #[must_use]
    pub fn new(upstream: U, base_url: &str, sink: S) -> Self {
        Self {
            upstream,
            base_url: base_url.trim_end_matches('/').to_string(),
            sink,
            interactions: Vec::new(),
            next_index: 0,
            front_end_authority: None,
            written: false,
        }
    }

    /// Map a front-end URL onto the real service's origin
    ///
    /// A URL whose host differs from the front end's was pointed elsewhere by a
    /// manipulation hook and is forwarded as is.
    fn upstream_url(&self, url: &str) -> String {
        if let (Some(authority), Some(front_end)) = (authority(url), &self.front_end_authority) {
            if !authority.eq_ignore_ascii_case(front_end) {
                return url.to_string();
            }
        }

        let path = match url.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("/", |slash| &rest[slash..]),
            None => url,
        };
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn write_script(&mut self) -> Result<()> {
        let script = serialize(&self.interactions);
        self.written = true;
        self.sink.write_script(&script)
    }
}

/// Host and port of an absolute URL
fn authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

impl<U: Upstream, S: ScriptSink> Interactor for Recorder<U, S> {
    fn new_interaction(
        &mut self,
        method: &str,
        path: &str,
        index: usize,
        url: &str,
        context: &str,
    ) -> Result<Interaction> {
        claim_index(&mut self.next_index, index)?;
        if let Some(authority) = authority(url) {
            self.front_end_authority = Some(authority.to_string());
        }
        debug!("Recording interaction {index}: {method} {path} ({context})");
        Ok(Interaction::new(index, method, path))
    }

    async fn get_service_response_for_request(
        &mut self,
        method: &str,
        url: &str,
        headers: &[String],
        interaction: &Interaction,
        lowercase_headers: bool,
    ) -> Result<ServiceResponse> {
        let request = UpstreamRequest {
            method: method.to_string(),
            url: self.upstream_url(url),
            headers: headers.to_vec(),
            body: interaction.request_body.clone(),
            content_type: interaction.request_content_type.clone(),
        };
        debug!("Forwarding {} {}", request.method, request.url);

        let mut response = self.upstream.send(request).await?;
        if lowercase_headers {
            response.headers = response
                .headers
                .iter()
                .map(|header| {
                    let (name, value) = split_header(header);
                    format!("{}: {value}", name.to_ascii_lowercase())
                })
                .collect();
        }
        Ok(response)
    }

    fn add_interaction(&mut self, interaction: Interaction) {
        if interaction.index != self.interactions.len() {
            warn!(
                "Interaction {} recorded at position {}",
                interaction.index,
                self.interactions.len()
            );
        }
        self.interactions.push(interaction);
    }

    fn finished_script(&mut self, count: usize, failed: bool) -> Result<ScriptSummary> {
        if !self.written {
            self.write_script()?;
            info!(
                "Recorded {} interaction(s){}",
                self.interactions.len(),
                if failed { " with failures" } else { "" }
            );
        }
        Ok(ScriptSummary {
            interactions: count,
            failed,
        })
    }
}

impl<U: Upstream, S: ScriptSink> Drop for Recorder<U, S> {
    fn drop(&mut self) {
        if !self.written && !self.interactions.is_empty() {
            warn!("Recording dropped before it finished; writing partial script");
            if let Err(e) = self.write_script() {
                warn!("Failed to write partial script: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{parse, MemorySink};
    use crate::ScriptError;
    use std::sync::Mutex;

    /// Answers with the request echoed back, failing for paths containing "fail"
    #[derive(Default)]
    struct EchoUpstream {
        seen: Mutex<Vec<UpstreamRequest>>,
    }

    impl Upstream for EchoUpstream {
        async fn send(&self, request: UpstreamRequest) -> Result<ServiceResponse> {
            self.seen.lock().unwrap().push(request.clone());
            if request.url.contains("fail") {
                return Err(ScriptError::Upstream("connection refused".to_string()));
            }
            Ok(ServiceResponse {
                status_code: 200,
                headers: vec!["X-Echo-Method: yes".to_string()],
                body: Body::Text(format!("{} {}", request.method, request.url)),
                content_type: Some("text/plain".to_string()),
            })
        }
    }

    fn recorder(sink: &MemorySink) -> Recorder<EchoUpstream, MemorySink> {
        Recorder::new(EchoUpstream::default(), "http://api.example.com/", sink.clone())
    }

    #[test]
    fn test_upstream_url() {
        let sink = MemorySink::new();
        let recorder = recorder(&sink);

        assert_eq!(
            recorder.upstream_url("http://localhost:61417/a/b?c=d"),
            "http://api.example.com/a/b?c=d"
        );
        assert_eq!(recorder.upstream_url("/x"), "http://api.example.com/x");
        assert_eq!(
            recorder.upstream_url("http://localhost:61417"),
            "http://api.example.com/"
        );
    }

    #[test]
    fn test_redirected_url_is_forwarded_unchanged() {
        let sink = MemorySink::new();
        let mut recorder = recorder(&sink);
        recorder
            .new_interaction("GET", "/x", 0, "http://localhost:61417/x", "t")
            .unwrap();

        assert_eq!(
            recorder.upstream_url("http://real.example.org:9000/x"),
            "http://real.example.org:9000/x"
        );
        assert_eq!(
            recorder.upstream_url("http://LOCALHOST:61417/x?y=1"),
            "http://api.example.com/x?y=1"
        );
    }

    #[test]
    fn test_authority() {
        assert_eq!(authority("http://a.b:1/c"), Some("a.b:1"));
        assert_eq!(authority("https://a.b?q"), Some("a.b"));
        assert_eq!(authority("/relative"), None);
    }

    #[test]
    fn test_indices_must_be_sequential() {
        let sink = MemorySink::new();
        let mut recorder = recorder(&sink);

        assert!(recorder.new_interaction("GET", "/", 0, "/", "t").is_ok());
        assert!(recorder.new_interaction("GET", "/", 2, "/", "t").is_err());
        assert!(recorder.new_interaction("GET", "/", 1, "/", "t").is_ok());
    }

    #[tokio::test]
    async fn test_records_and_writes_script() {
        let sink = MemorySink::new();
        let mut recorder = recorder(&sink);

        let mut interaction = recorder
            .new_interaction("GET", "/hello", 0, "http://localhost/hello", "t")
            .unwrap();
        interaction.note_request(vec!["Accept: text/plain".to_string()], Body::empty(), "");

        let response = recorder
            .get_service_response_for_request(
                "GET",
                "http://localhost/hello",
                &interaction.request_headers.clone(),
                &interaction,
                true,
            )
            .await
            .unwrap();
        assert_eq!(response.headers, vec!["x-echo-method: yes"]);
        assert_eq!(response.body, Body::from("GET http://api.example.com/hello"));

        interaction.note_response(&response);
        recorder.add_interaction(interaction.clone());

        let summary = recorder.finished_script(1, false).unwrap();
        assert_eq!(
            summary,
            ScriptSummary {
                interactions: 1,
                failed: false
            }
        );

        let script = sink.script().unwrap();
        assert_eq!(parse(&script).unwrap(), vec![interaction]);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let sink = MemorySink::new();
        let mut recorder = recorder(&sink);
        let interaction = recorder
            .new_interaction("GET", "/fail", 0, "/fail", "t")
            .unwrap();

        let result = recorder
            .get_service_response_for_request("GET", "/fail", &[], &interaction, false)
            .await;

        assert!(matches!(result, Err(ScriptError::Upstream(_))));
    }

    #[test]
    fn test_failed_session_still_writes_once() {
        let sink = MemorySink::new();
        let mut recorder = recorder(&sink);
        recorder.add_interaction(Interaction::new(0, "GET", "/"));

        let summary = recorder.finished_script(1, true).unwrap();
        assert!(summary.failed);
        assert!(sink.script().is_some());

        let mut other = sink.clone();
        other.write_script("overwritten").unwrap();
        recorder.finished_script(1, true).unwrap();
        assert_eq!(sink.script().as_deref(), Some("overwritten"));
    }

    #[test]
    fn test_drop_writes_partial_script() {
        let sink = MemorySink::new();
        {
            let mut recorder = recorder(&sink);
            recorder.add_interaction(Interaction::new(0, "GET", "/partial"));
        }
        let script = sink.script().unwrap();
        assert!(script.contains("## Interaction 0: GET /partial"));
    }
}
