//! Configuration types for scriptplay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Result, ScriptError};

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward to the real service and write a script
    Record,
    /// Serve responses from a recorded script
    Playback,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode
    pub mode: Mode,
    /// Markdown script read in playback and written in record mode
    pub script_path: PathBuf,
    /// Front-end settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Real service settings (record mode)
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Local port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Render request header names in lowercase
    #[serde(default)]
    pub lowercase_headers: bool,
    /// Reformat JSON bodies before they are recorded or replayed
    #[serde(default)]
    pub pretty_print_text_bodies: bool,
    /// Reject playback requests whose method or target differ from the script
    #[serde(default)]
    pub strict_playback: bool,
}

fn default_port() -> u16 {
    61417
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            lowercase_headers: false,
            pretty_print_text_bodies: false,
            strict_playback: false,
        }
    }
}

/// Real service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Origin requests are forwarded to, e.g. `http://api.example.com:8080`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Redaction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Literal secrets replaced in headers and text bodies
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Request headers whose values are replaced
    #[serde(default)]
    pub redact_request_headers: Vec<String>,
    /// Response headers dropped before they are recorded or replayed
    #[serde(default)]
    pub remove_response_headers: Vec<String>,
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request size in bytes
    pub max_request_size: usize,
    /// Maximum response size in bytes
    pub max_response_size: usize,
    /// Maximum headers per request/response
    pub max_headers: usize,
    /// Maximum concurrently open client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    256
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 16 * 1024 * 1024,  // 16 MB
            max_response_size: 64 * 1024 * 1024, // 64 MB
            max_headers: 128,
            max_connections: default_max_connections(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScriptError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ScriptError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.script_path.as_os_str().is_empty() {
            return Err(ScriptError::ConfigError(
                "script_path cannot be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ScriptError::ConfigError(
                "server.port cannot be 0".to_string(),
            ));
        }

        match self.mode {
            Mode::Record => match self.upstream.base_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(ScriptError::ConfigError(format!(
                        "upstream.base_url must be an http(s) URL: {url}"
                    )));
                }
                None => {
                    return Err(ScriptError::ConfigError(
                        "upstream.base_url is required in record mode".to_string(),
                    ));
                }
            },
            Mode::Playback => {
                if !self.script_path.exists() {
                    return Err(ScriptError::ConfigError(format!(
                        "Script file does not exist: {}",
                        self.script_path.display()
                    )));
                }
            }
        }

        if self.upstream.timeout_ms == 0 {
            return Err(ScriptError::ConfigError(
                "upstream.timeout_ms must be > 0".to_string(),
            ));
        }

        if self.limits.max_request_size == 0
            || self.limits.max_response_size == 0
            || self.limits.max_headers == 0
            || self.limits.max_connections == 0
        {
            return Err(ScriptError::ConfigError(
                "limits must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            mode = "record"
            script_path = "/tmp/hello.md"

            [upstream]
            base_url = "http://api.example.com"

            [redaction]
            redact_request_headers = ["Authorization"]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.mode, Mode::Record);
        assert_eq!(config.server.port, 61417);
        assert!(!config.server.pretty_print_text_bodies);
        assert_eq!(config.upstream.timeout_ms, 30_000);
        assert_eq!(config.redaction.redact_request_headers, vec!["Authorization"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file_playback() {
        let script = NamedTempFile::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = format!(
            r#"
            mode = "playback"
            script_path = "{}"

            [server]
            port = 8080
            strict_playback = true
        "#,
            script.path().display()
        );
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mode, Mode::Playback);
        assert!(config.server.strict_playback);
    }

    #[test]
    fn test_record_requires_upstream() {
        let config_toml = r#"
            mode = "record"
            script_path = "/tmp/hello.md"
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_playback_requires_existing_script() {
        let config_toml = r#"
            mode = "playback"
            script_path = "/definitely/not/here.md"
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_port() {
        let config_toml = r#"
            mode = "record"
            script_path = "/tmp/hello.md"

            [server]
            port = 0

            [upstream]
            base_url = "http://api.example.com"
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(config.validate().is_err());
    }
}
