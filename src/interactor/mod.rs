//! Interactors: the record and playback sides of a session
//!
//! Both implement [`Interactor`], which the session drives once per request.

mod recorder;
mod replayer;

use std::future::Future;

pub use recorder::{Recorder, Upstream, UpstreamRequest};
pub use replayer::Replayer;

use crate::interaction::{Interaction, ServiceResponse};
use crate::Result;

/// Outcome of a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSummary {
    /// Number of interactions the session processed
    pub interactions: usize,
    /// Whether any interaction hit an unrecoverable error
    pub failed: bool,
}

/// One side of a record/playback session
pub trait Interactor: Send {
    /// Allocate the interaction for position `index`
    ///
    /// Indices must increase by exactly one per call, starting at 0.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of sequence
    fn new_interaction(
        &mut self,
        method: &str,
        path: &str,
        index: usize,
        url: &str,
        context: &str,
    ) -> Result<Interaction>;

    /// Produce the response for an already-transformed request
    fn get_service_response_for_request(
        &mut self,
        method: &str,
        url: &str,
        headers: &[String],
        interaction: &Interaction,
        lowercase_headers: bool,
    ) -> impl Future<Output = Result<ServiceResponse>> + Send;

    /// Accept the completed interaction
    fn add_interaction(&mut self, interaction: Interaction);

    /// End the session
    ///
    /// # Errors
    ///
    /// Returns error if the session's script cannot be stored
    fn finished_script(&mut self, count: usize, failed: bool) -> Result<ScriptSummary>;
}

/// Check that `index` is the next position and advance the counter
pub(crate) fn claim_index(next_index: &mut usize, index: usize) -> Result<()> {
    if index != *next_index {
        return Err(crate::ScriptError::Other(format!(
            "Interaction {index} requested out of order, expected {next_index}"
        )));
    }
    *next_index += 1;
    Ok(())
}
