//! Playback interactor: responses served by position from a recorded script

use tracing::{debug, warn};

use crate::error::PlaybackError;
use crate::interaction::{Interaction, ServiceResponse};
use crate::script::parse;
use crate::{Result, ScriptError};

use super::{claim_index, Interactor, ScriptSummary};

/// Serves a previously recorded script
///
/// The N-th request of a session gets the N-th recorded response. With strict
/// verification enabled, a request whose method or target differs from the
/// recording is rejected as an assertion failure.
#[derive(Debug)]
pub struct Replayer {
    interactions: Vec<Interaction>,
    next_index: usize,
    served: usize,
    strict: bool,
}

impl Replayer {
    /// Parse a recorded script
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Format`] if the script does not parse and
    /// [`PlaybackError::NoInteractions`] if it holds no interactions
    pub fn new(script: &str) -> Result<Self> {
        let interactions = parse(script)?;
        if interactions.is_empty() {
            return Err(PlaybackError::NoInteractions {
                script: script.to_string(),
            }
            .into());
        }

        debug!("Loaded script with {} interaction(s)", interactions.len());

        Ok(Self {
            interactions,
            next_index: 0,
            served: 0,
            strict: false,
        })
    }

    /// Reject requests that do not match the recorded method and target
    #[must_use]
    pub fn with_strict_verification(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Number of recorded interactions
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether the script is empty (never true for a constructed replayer)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    fn recorded(&self, index: usize) -> Result<&Interaction> {
        self.interactions.get(index).ok_or_else(|| {
            PlaybackError::OutOfRange {
                index,
                len: self.interactions.len(),
            }
            .into()
        })
    }
}

impl Interactor for Replayer {
    fn new_interaction(
        &mut self,
        method: &str,
        path: &str,
        index: usize,
        _url: &str,
        context: &str,
    ) -> Result<Interaction> {
        claim_index(&mut self.next_index, index)?;
        debug!("Replaying interaction {index}: {method} {path} ({context})");
        Ok(Interaction::new(index, method, path))
    }

    async fn get_service_response_for_request(
        &mut self,
        _method: &str,
        _url: &str,
        _headers: &[String],
        interaction: &Interaction,
        _lowercase_headers: bool,
    ) -> Result<ServiceResponse> {
        let recorded = self.recorded(interaction.index)?;

        if self.strict
            && (recorded.method != interaction.method || recorded.url != interaction.url)
        {
            return Err(ScriptError::Assertion(format!(
                "Interaction {} was recorded as {} {} but played back as {} {}",
                interaction.index,
                recorded.method,
                recorded.url,
                interaction.method,
                interaction.url
            )));
        }

        Ok(recorded.service_response())
    }

    fn add_interaction(&mut self, _interaction: Interaction) {
        self.served += 1;
    }

    fn finished_script(&mut self, count: usize, failed: bool) -> Result<ScriptSummary> {
        if self.served < self.interactions.len() {
            warn!(
                "Only {} of {} recorded interaction(s) were played back",
                self.served,
                self.interactions.len()
            );
        }
        Ok(ScriptSummary {
            interactions: count,
            failed,
        })
    }
}
