//! Manipulation pipeline shared by record and playback
//!
//! The outbound half runs before the request reaches the real service (or the
//! script lookup); the inbound half runs on the response before it is recorded
//! and handed back. Both modes run the same steps in the same order.

use std::sync::Arc;

use tracing::debug;

use crate::interaction::{split_header, Body, Interaction, ServiceResponse};
use crate::manipulation::{InteractionManipulations, NoopManipulations};

/// Reformats textual bodies
pub trait Prettifier: Send + Sync {
    /// Return the reformatted text, or the input unchanged
    fn prettify(&self, text: &str) -> String;
}

/// Pretty-prints JSON objects and arrays, keeping key order
///
/// Only whitespace changes. A document that would not survive reformatting
/// verbatim (duplicate keys, escapes serde_json writes differently) is left as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPrettifier;

impl Prettifier for JsonPrettifier {
    fn prettify(&self, text: &str) -> String {
        let trimmed = text.trim_start();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return text.to_string();
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            return text.to_string();
        };
        let compact = serde_json::to_string(&value);
        let pretty = serde_json::to_string_pretty(&value);
        match (compact, pretty) {
            (Ok(compact), Ok(pretty)) if compact == strip_json_whitespace(text) => pretty,
            _ => {
                debug!("Leaving JSON body unformatted: reformatting would change it");
                text.to_string()
            }
        }
    }
}

/// Drop whitespace outside string literals
fn strip_json_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if !matches!(c, ' ' | '\t' | '\n' | '\r') {
            in_string = c == '"';
            out.push(c);
        }
    }
    out
}

/// Request ready to be sent on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    /// URL after the URL hook
    pub url: String,
    /// Rendered headers after the header hooks
    pub headers: Vec<String>,
}

/// Ordered set of hooks plus optional body prettifying
#[derive(Clone)]
pub struct Pipeline {
    manipulations: Arc<dyn InteractionManipulations>,
    prettifier: Option<Arc<dyn Prettifier>>,
    lowercase_headers: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Arc::new(NoopManipulations))
    }
}

impl Pipeline {
    /// Create a pipeline around caller hooks
    #[must_use]
    pub fn new(manipulations: Arc<dyn InteractionManipulations>) -> Self {
        Self {
            manipulations,
            prettifier: None,
            lowercase_headers: false,
        }
    }

    /// Reformat textual bodies with the given prettifier
    #[must_use]
    pub fn with_prettifier(mut self, prettifier: Arc<dyn Prettifier>) -> Self {
        self.prettifier = Some(prettifier);
        self
    }

    /// Render request header names in lowercase
    #[must_use]
    pub fn with_lowercase_headers(mut self, lowercase_headers: bool) -> Self {
        self.lowercase_headers = lowercase_headers;
        self
    }

    /// Whether request header names are lowercased
    #[must_use]
    pub fn lowercase_headers(&self) -> bool {
        self.lowercase_headers
    }

    /// Run the outbound hooks and note the result on `interaction`
    pub fn prepare_request(
        &self,
        method: &str,
        url: &str,
        raw_headers: &[(String, String)],
        body: Body,
        content_type: &str,
        interaction: &mut Interaction,
    ) -> PreparedRequest {
        let hooks = &self.manipulations;

        let mut headers = Vec::with_capacity(raw_headers.len());
        for (name, value) in raw_headers {
            let value = hooks.header_replacement(name, value.clone());
            let rendered = if self.lowercase_headers {
                format!("{}: {value}", name.to_ascii_lowercase())
            } else {
                format!("{name}: {value}")
            };
            headers.push(rendered.clone());
            headers = hooks.change_single_header_for_request_to_server(method, &rendered, headers);
        }
        let headers = hooks.change_all_headers_for_request_to_server(headers);

        let body = match body {
            Body::Text(text) => {
                let text = match &self.prettifier {
                    Some(prettifier) => prettifier.prettify(&text),
                    None => text,
                };
                Body::Text(hooks.change_body_for_request_to_server(text))
            }
            binary @ Body::Binary(_) => binary,
        };

        interaction.note_request(headers.clone(), body, content_type);

        PreparedRequest {
            url: hooks.change_url_for_request_to_server(url.to_string()),
            headers,
        }
    }

    /// Run the inbound hooks and note the result on `interaction`
    pub fn process_response(
        &self,
        response: ServiceResponse,
        interaction: &mut Interaction,
    ) -> ServiceResponse {
        let hooks = &self.manipulations;
        let ServiceResponse {
            status_code,
            headers: returned,
            body,
            content_type,
        } = response;

        let mut headers = Vec::with_capacity(returned.len());
        for (index, header) in returned.into_iter().enumerate() {
            if let Some(header) =
                hooks.change_single_header_returned_back_from_server(index, header)
            {
                headers.push(header);
            }
        }
        let mut headers = hooks.change_all_headers_returned_back_from_server(headers);

        let body = match body {
            Body::Text(text) => {
                let text = hooks.change_body_returned_back_from_server(text);
                match &self.prettifier {
                    Some(prettifier) => {
                        let pretty = prettifier.prettify(&text);
                        if pretty != text {
                            debug!(
                                "Reformatted response body of interaction {}",
                                interaction.index
                            );
                            headers = with_content_length(headers, pretty.len());
                        }
                        Body::Text(pretty)
                    }
                    None => Body::Text(text),
                }
            }
            binary @ Body::Binary(_) => binary,
        };

        let response = ServiceResponse {
            status_code,
            headers,
            body,
            content_type,
        };
        interaction.note_response(&response);
        response
    }
}

/// Rewrite every `Content-Length` header to `len`, keeping the name's casing
fn with_content_length(headers: Vec<String>, len: usize) -> Vec<String> {
    headers
        .into_iter()
        .map(|header| {
            let (name, _) = split_header(&header);
            if name.eq_ignore_ascii_case("content-length") {
                format!("{name}: {len}")
            } else {
                header
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropSecond;

    impl InteractionManipulations for DropSecond {
        fn change_single_header_returned_back_from_server(
            &self,
            index: usize,
            header: String,
        ) -> Option<String> {
            (index != 1).then_some(header)
        }
    }

    struct Rewriting;

    impl InteractionManipulations for Rewriting {
        fn header_replacement(&self, name: &str, value: String) -> String {
            if name == "Host" {
                "api.example.com".to_string()
            } else {
                value
            }
        }

        fn change_single_header_for_request_to_server(
            &self,
            _method: &str,
            header: &str,
            mut headers: Vec<String>,
        ) -> Vec<String> {
            if header.starts_with("Cookie") {
                headers.pop();
            }
            headers
        }

        fn change_all_headers_for_request_to_server(
            &self,
            mut headers: Vec<String>,
        ) -> Vec<String> {
            headers.push("X-Recorded: yes".to_string());
            headers
        }

        fn change_body_for_request_to_server(&self, body: String) -> String {
            body.replace("secret", "xxx")
        }

        fn change_url_for_request_to_server(&self, url: String) -> String {
            url.replace("localhost:61417", "api.example.com")
        }

        fn change_all_headers_returned_back_from_server(
            &self,
            mut headers: Vec<String>,
        ) -> Vec<String> {
            headers.retain(|h| !h.starts_with("Set-Cookie"));
            headers
        }

        fn change_body_returned_back_from_server(&self, body: String) -> String {
            body.to_uppercase()
        }
    }

    fn raw(headers: &[(&str, &str)]) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
            .collect()
    }

    fn response(headers: &[&str], body: &str) -> ServiceResponse {
        ServiceResponse {
            status_code: 200,
            headers: headers.iter().map(ToString::to_string).collect(),
            body: Body::from(body),
            content_type: Some("application/json".to_string()),
        }
    }

    #[test]
    fn test_noop_keeps_order_and_duplicates() {
        let pipeline = Pipeline::default();
        let mut interaction = Interaction::new(0, "GET", "/");

        let prepared = pipeline.prepare_request(
            "GET",
            "http://localhost/",
            &raw(&[("B", "2"), ("A", "1"), ("B", "3")]),
            Body::empty(),
            "",
            &mut interaction,
        );

        assert_eq!(prepared.headers, vec!["B: 2", "A: 1", "B: 3"]);
        assert_eq!(prepared.url, "http://localhost/");
        assert_eq!(interaction.request_headers, prepared.headers);
    }

    #[test]
    fn test_outbound_hooks_in_order() {
        let pipeline = Pipeline::new(Arc::new(Rewriting));
        let mut interaction = Interaction::new(0, "POST", "/login");

        let prepared = pipeline.prepare_request(
            "POST",
            "http://localhost:61417/login",
            &raw(&[("Host", "localhost:61417"), ("Cookie", "a=b"), ("Accept", "*/*")]),
            Body::from("user=me&pw=secret"),
            "application/x-www-form-urlencoded",
            &mut interaction,
        );

        assert_eq!(
            prepared.headers,
            vec!["Host: api.example.com", "Accept: */*", "X-Recorded: yes"]
        );
        assert_eq!(prepared.url, "http://api.example.com/login");
        assert_eq!(interaction.request_body, Body::from("user=me&pw=xxx"));
        assert_eq!(
            interaction.request_content_type,
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_lowercase_header_names() {
        let pipeline = Pipeline::default().with_lowercase_headers(true);
        let mut interaction = Interaction::new(0, "GET", "/");

        let prepared = pipeline.prepare_request(
            "GET",
            "/",
            &raw(&[("Content-Type", "Text/Plain")]),
            Body::empty(),
            "",
            &mut interaction,
        );

        assert_eq!(prepared.headers, vec!["content-type: Text/Plain"]);
    }

    #[test]
    fn test_drop_sentinel_removes_only_that_header() {
        let pipeline = Pipeline::new(Arc::new(DropSecond));
        let mut interaction = Interaction::new(0, "GET", "/");

        let processed = pipeline.process_response(
            response(&["a: 1", "b: 2", "c: 3", "b: 4"], "{}"),
            &mut interaction,
        );

        assert_eq!(processed.headers, vec!["a: 1", "c: 3", "b: 4"]);
        assert_eq!(interaction.response_headers, processed.headers);
    }

    #[test]
    fn test_inbound_hooks() {
        let pipeline = Pipeline::new(Arc::new(Rewriting));
        let mut interaction = Interaction::new(0, "GET", "/");

        let processed = pipeline.process_response(
            response(&["Set-Cookie: s=1", "X: y"], "hello"),
            &mut interaction,
        );

        assert_eq!(processed.headers, vec!["X: y"]);
        assert_eq!(processed.body, Body::from("HELLO"));
        assert_eq!(interaction.response_body, Body::from("HELLO"));
        assert_eq!(interaction.response_status, 200);
        assert_eq!(interaction.response_content_type, "application/json");
    }

    #[test]
    fn test_prettify_updates_content_length_only() {
        let pipeline = Pipeline::default().with_prettifier(Arc::new(JsonPrettifier));
        let mut interaction = Interaction::new(0, "GET", "/");
        let compact = r#"{"hello":"how-are-you","n":[1,2]}"#;

        let processed = pipeline.process_response(
            response(
                &["Content-Type: application/json", "content-length: 33", "X-Other: 33"],
                compact,
            ),
            &mut interaction,
        );

        let pretty = processed.body.as_text().unwrap().to_string();
        assert!(pretty.contains('\n'));
        assert!(pretty.find("hello").unwrap() < pretty.find("\"n\"").unwrap());
        assert_eq!(
            processed.headers,
            vec![
                "Content-Type: application/json".to_string(),
                format!("content-length: {}", pretty.len()),
                "X-Other: 33".to_string(),
            ]
        );
    }

    #[test]
    fn test_prettify_leaves_already_pretty_body_alone() {
        let prettifier = JsonPrettifier;
        let pretty = prettifier.prettify(r#"{"a":1}"#);
        let pipeline = Pipeline::default().with_prettifier(Arc::new(JsonPrettifier));
        let mut interaction = Interaction::new(0, "GET", "/");

        let processed = pipeline.process_response(
            response(&["Content-Length: 999"], &pretty),
            &mut interaction,
        );

        assert_eq!(processed.headers, vec!["Content-Length: 999"]);
    }

    #[test]
    fn test_prettifier_ignores_non_json() {
        assert_eq!(JsonPrettifier.prettify("plain text"), "plain text");
        assert_eq!(JsonPrettifier.prettify("{not json"), "{not json");
        assert_eq!(JsonPrettifier.prettify("[1,2]"), "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_prettifier_keeps_values_verbatim() {
        assert_eq!(
            JsonPrettifier.prettify(r#"{"price":10.50,"big":123456789012345678901234}"#),
            "{\n  \"price\": 10.50,\n  \"big\": 123456789012345678901234\n}"
        );

        let exponent = r#"{"e":1E2,"s":"a \"quoted\" word"}"#;
        assert_eq!(strip_json_whitespace(&JsonPrettifier.prettify(exponent)), exponent);

        let duplicate_keys = r#"{"dup":1,"dup":2}"#;
        assert_eq!(JsonPrettifier.prettify(duplicate_keys), duplicate_keys);

        let escaped = r#"{"s":"caf\u00e9"}"#;
        assert_eq!(JsonPrettifier.prettify(escaped), escaped);
    }

    #[test]
    fn test_strip_json_whitespace() {
        assert_eq!(
            strip_json_whitespace("{ \"a b\" :\n [1, \"\\\" x\"] }"),
            "{\"a b\":[1,\"\\\" x\"]}"
        );
    }

    #[test]
    fn test_binary_bodies_bypass_hooks() {
        let pipeline = Pipeline::new(Arc::new(Rewriting)).with_prettifier(Arc::new(JsonPrettifier));
        let mut interaction = Interaction::new(0, "GET", "/");
        let mut binary = response(&["Content-Length: 3"], "");
        binary.body = Body::Binary(vec![1, 2, 3]);

        let processed = pipeline.process_response(binary, &mut interaction);

        assert_eq!(processed.body, Body::Binary(vec![1, 2, 3]));
        assert_eq!(processed.headers, vec!["Content-Length: 3"]);
    }
}
