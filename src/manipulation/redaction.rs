//! Config-driven redaction of secrets and noisy headers

use crate::config::RedactionConfig;
use crate::interaction::split_header;

use super::InteractionManipulations;

/// Replacement text for redacted values
pub const REDACTED: &str = "REDACTED";

/// Hooks built from the `[redaction]` config section
#[derive(Debug, Clone, Default)]
pub struct RedactingManipulations {
    secrets: Vec<String>,
    request_headers: Vec<String>,
    removed_response_headers: Vec<String>,
}

impl RedactingManipulations {
    /// Build hooks from config
    #[must_use]
    pub fn from_config(config: &RedactionConfig) -> Self {
        Self {
            secrets: config
                .secrets
                .iter()
                .filter(|secret| !secret.is_empty())
                .cloned()
                .collect(),
            request_headers: lowercased(&config.redact_request_headers),
            removed_response_headers: lowercased(&config.remove_response_headers),
        }
    }

    fn scrub(&self, mut text: String) -> String {
        for secret in &self.secrets {
            if text.contains(secret.as_str()) {
                text = text.replace(secret.as_str(), REDACTED);
            }
        }
        text
    }
}

fn lowercased(names: &[String]) -> Vec<String> {
    names.iter().map(|name| name.to_ascii_lowercase()).collect()
}

impl InteractionManipulations for RedactingManipulations {
    fn header_replacement(&self, name: &str, value: String) -> String {
        if self
            .request_headers
            .iter()
            .any(|redacted| name.eq_ignore_ascii_case(redacted))
        {
            return REDACTED.to_string();
        }
        self.scrub(value)
    }

    fn change_body_for_request_to_server(&self, body: String) -> String {
        self.scrub(body)
    }

    fn change_single_header_returned_back_from_server(
        &self,
        _index: usize,
        header: String,
    ) -> Option<String> {
        let (name, _) = split_header(&header);
        if self
            .removed_response_headers
            .iter()
            .any(|removed| name.eq_ignore_ascii_case(removed))
        {
            return None;
        }
        Some(self.scrub(header))
    }

    fn change_body_returned_back_from_server(&self, body: String) -> String {
        self.scrub(body)
    }
}
