//! Monitoring callbacks for session progress and failures

use tracing::{error, info, warn};

use crate::interaction::Interaction;
use crate::ScriptError;

/// Receives session events
///
/// All methods default to doing nothing.
pub trait ServerMonitor: Send + Sync {
    /// An interaction was allocated and is about to be processed
    fn interaction_started(&self, _index: usize, _interaction: &Interaction) {}

    /// An interaction completed and its response is on its way back
    fn interaction_finished(&self, _index: usize, _method: &str, _url: &str, _context: &str) {}

    /// An interaction failed in a way the session answered with an error response
    fn interaction_failed(
        &self,
        _index: usize,
        _method: &str,
        _url: &str,
        _error: &ScriptError,
        _context: &str,
    ) {
    }

    /// A failure that is not tied to a recoverable interaction error
    fn unexpected_request_error(&self, _error: &ScriptError, _context: &str) {}
}

/// Logs session events with `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl ServerMonitor for TracingMonitor {
    fn interaction_started(&self, index: usize, interaction: &Interaction) {
        info!(
            "Interaction {} started: {} {}",
            index, interaction.method, interaction.url
        );
    }

    fn interaction_finished(&self, index: usize, method: &str, url: &str, context: &str) {
        info!("Interaction {index} finished: {method} {url} ({context})");
    }

    fn interaction_failed(
        &self,
        index: usize,
        method: &str,
        url: &str,
        error: &ScriptError,
        context: &str,
    ) {
        warn!("Interaction {index} failed: {method} {url} ({context}): {error}");
    }

    fn unexpected_request_error(&self, error: &ScriptError, context: &str) {
        error!("Unexpected error ({context}): {error}");
    }
}
