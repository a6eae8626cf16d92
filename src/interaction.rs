//! Recorded request/response exchanges

/// Request or response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Textual payload, kept verbatim
    Text(String),
    /// Opaque payload
    Binary(Vec<u8>),
}

impl Body {
    /// Empty text body
    #[must_use]
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    /// Text content, if textual
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Payload as bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode raw bytes using the declared content type
    ///
    /// Textual types that are not valid UTF-8 stay binary.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>, content_type: &str) -> Self {
        if !is_text_content_type(content_type) {
            return Self::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Binary(e.into_bytes()),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// One request/response exchange, identified by its position in a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interaction {
    /// 0-based position within the session
    pub index: usize,
    /// HTTP method
    pub method: String,
    /// Request target as received by the front end
    pub url: String,
    /// Request headers as `Name: value` lines, in order
    pub request_headers: Vec<String>,
    /// Request body
    pub request_body: Body,
    /// Declared request content type (empty when absent)
    pub request_content_type: String,
    /// Response status code
    pub response_status: u16,
    /// Response headers as `Name: value` lines, in order
    pub response_headers: Vec<String>,
    /// Response body
    pub response_body: Body,
    /// Declared response content type (empty when absent)
    pub response_content_type: String,
}

impl Interaction {
    /// Create an empty interaction for a position in the session
    #[must_use]
    pub fn new(index: usize, method: &str, url: &str) -> Self {
        Self {
            index,
            method: method.to_string(),
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Note the request as it leaves for the real service
    pub fn note_request(&mut self, headers: Vec<String>, body: Body, content_type: &str) {
        self.request_headers = headers;
        self.request_body = body;
        self.request_content_type = content_type.to_string();
    }

    /// Note the response as it is handed back to the caller
    pub fn note_response(&mut self, response: &ServiceResponse) {
        self.response_status = response.status_code;
        self.response_headers.clone_from(&response.headers);
        self.response_body = response.body.clone();
        self.response_content_type = response.content_type.clone().unwrap_or_default();
    }

    /// The recorded response
    #[must_use]
    pub fn service_response(&self) -> ServiceResponse {
        ServiceResponse {
            status_code: self.response_status,
            headers: self.response_headers.clone(),
            body: self.response_body.clone(),
            content_type: if self.response_content_type.is_empty() {
                None
            } else {
                Some(self.response_content_type.clone())
            },
        }
    }
}

/// Response handed back to the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Headers as `Name: value` lines, in order
    pub headers: Vec<String>,
    /// Response body
    pub body: Body,
    /// Declared content type
    pub content_type: Option<String>,
}

impl ServiceResponse {
    /// Plain-text response, used for error answers
    #[must_use]
    pub fn text(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: Body::Text(body.into()),
            content_type: Some("text/plain".to_string()),
        }
    }

    /// Replace the headers
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }
}

/// Split a `Name: value` line
///
/// Lines without the `": "` separator yield the whole line as the name.
#[must_use]
pub fn split_header(header: &str) -> (&str, &str) {
    header.split_once(": ").unwrap_or((header, ""))
}

/// Whether a content type carries text that can be kept verbatim in a script
#[must_use]
pub fn is_text_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if media.is_empty() {
        // Bodies without a declared type are treated as text
        return true;
    }

    media.starts_with("text/")
        || media.ends_with("json")
        || media.ends_with("xml")
        || media.ends_with("javascript")
        || media.ends_with("x-www-form-urlencoded")
        || media.ends_with("graphql")
        || media.ends_with("yaml")
        || media.ends_with("csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_types() {
        assert!(is_text_content_type("text/plain; charset=utf-8"));
        assert!(is_text_content_type("application/json"));
        assert!(is_text_content_type("application/vnd.api+json"));
        assert!(is_text_content_type("application/xml"));
        assert!(is_text_content_type(""));
        assert!(!is_text_content_type("image/png"));
        assert!(!is_text_content_type("application/octet-stream"));
    }

    #[test]
    fn test_body_from_bytes() {
        assert_eq!(
            Body::from_bytes(b"hi".to_vec(), "text/plain"),
            Body::Text("hi".to_string())
        );
        assert_eq!(
            Body::from_bytes(vec![0xff, 0xfe], "text/plain"),
            Body::Binary(vec![0xff, 0xfe])
        );
        assert_eq!(
            Body::from_bytes(b"hi".to_vec(), "image/gif"),
            Body::Binary(b"hi".to_vec())
        );
    }

    #[test]
    fn test_split_header() {
        assert_eq!(split_header("Content-Type: a: b"), ("Content-Type", "a: b"));
        assert_eq!(split_header("broken"), ("broken", ""));
    }

    #[test]
    fn test_note_response_round_trips_service_response() {
        let mut interaction = Interaction::new(0, "GET", "/x");
        let response = ServiceResponse {
            status_code: 201,
            headers: vec!["a: 1".to_string()],
            body: Body::from("ok"),
            content_type: Some("text/plain".to_string()),
        };
        interaction.note_response(&response);
        assert_eq!(interaction.service_response(), response);
    }

    #[test]
    fn test_missing_content_type_is_none() {
        let interaction = Interaction::new(0, "GET", "/x");
        assert_eq!(interaction.service_response().content_type, None);
    }
}
