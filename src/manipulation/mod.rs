//! Caller-supplied hooks that rewrite traffic on its way to and from the real service
//!
//! Every hook defaults to a no-op, so an implementation only overrides what it
//! needs. The same hooks run in record and playback mode, which keeps a replayed
//! script indistinguishable from a live recording. Lists are passed by value and
//! handed back; hooks must not reorder entries they do not mean to change.

mod redaction;

pub use redaction::{RedactingManipulations, REDACTED};

/// Rewrites applied to each interaction
pub trait InteractionManipulations: Send + Sync {
    /// Rewrite one request header value before it is rendered
    fn header_replacement(&self, _name: &str, value: String) -> String {
        value
    }

    /// Called after each rendered request header is appended to `headers`
    fn change_single_header_for_request_to_server(
        &self,
        _method: &str,
        _header: &str,
        headers: Vec<String>,
    ) -> Vec<String> {
        headers
    }

    /// Final pass over the complete request header list
    fn change_all_headers_for_request_to_server(&self, headers: Vec<String>) -> Vec<String> {
        headers
    }

    /// Rewrite a textual request body
    fn change_body_for_request_to_server(&self, body: String) -> String {
        body
    }

    /// Rewrite the URL the request is sent to
    fn change_url_for_request_to_server(&self, url: String) -> String {
        url
    }

    /// Rewrite or drop (`None`) one response header
    fn change_single_header_returned_back_from_server(
        &self,
        _index: usize,
        header: String,
    ) -> Option<String> {
        Some(header)
    }

    /// Final pass over the surviving response headers
    fn change_all_headers_returned_back_from_server(&self, headers: Vec<String>) -> Vec<String> {
        headers
    }

    /// Rewrite a textual response body
    fn change_body_returned_back_from_server(&self, body: String) -> String {
        body
    }
}

/// Leaves every interaction untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopManipulations;

impl InteractionManipulations for NoopManipulations {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_leaves_values_alone() {
        let hooks = NoopManipulations;
        let headers = vec!["a: 1".to_string(), "a: 2".to_string()];

        assert_eq!(hooks.header_replacement("a", "1".to_string()), "1");
        assert_eq!(
            hooks.change_single_header_for_request_to_server("GET", "a: 2", headers.clone()),
            headers
        );
        assert_eq!(
            hooks.change_all_headers_for_request_to_server(headers.clone()),
            headers
        );
        assert_eq!(hooks.change_body_for_request_to_server("b".to_string()), "b");
        assert_eq!(
            hooks.change_url_for_request_to_server("http://x/".to_string()),
            "http://x/"
        );
        assert_eq!(
            hooks.change_single_header_returned_back_from_server(0, "a: 1".to_string()),
            Some("a: 1".to_string())
        );
        assert_eq!(
            hooks.change_all_headers_returned_back_from_server(headers.clone()),
            headers
        );
        assert_eq!(hooks.change_body_returned_back_from_server("b".to_string()), "b");
    }
}
