//! One record or playback session
//!
//! The session owns the interaction counter and the sticky `failed` flag, and
//! drives each request through the interactor and the manipulation pipeline.
//! Calls take `&mut self`; a front end serving concurrent connections must
//! serialize access (see [`crate::network::ScriptServer`]).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::interaction::{Body, ServiceResponse};
use crate::interactor::{Interactor, ScriptSummary};
use crate::monitor::{ServerMonitor, TracingMonitor};
use crate::pipeline::Pipeline;
use crate::{Result, ScriptError};

/// Request as decoded by the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    /// HTTP method
    pub method: String,
    /// Request target as received (path and query)
    pub path: String,
    /// Fully-qualified request URL
    pub url: String,
    /// Header names and values in arrival order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Body,
    /// Declared content type (empty when absent)
    pub content_type: String,
}

/// Session state around an interactor
pub struct Session<I: Interactor> {
    interactor: I,
    pipeline: Pipeline,
    monitor: Arc<dyn ServerMonitor>,
    context: String,
    next_index: usize,
    failed: bool,
    summary: Option<ScriptSummary>,
}

impl<I: Interactor> Session<I> {
    /// Create a session with a no-op pipeline and the tracing monitor
    #[must_use]
    pub fn new(interactor: I) -> Self {
        Self {
            interactor,
            pipeline: Pipeline::default(),
            monitor: Arc::new(TracingMonitor),
            context: String::new(),
            next_index: 0,
            failed: false,
            summary: None,
        }
    }

    /// Use a configured manipulation pipeline
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Report events to `monitor`
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn ServerMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Label passed to the interactor and monitor, typically the test name
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Number of requests received so far
    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.next_index
    }

    /// Whether any interaction failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Process one request
    ///
    /// Upstream failures and assertion failures are answered with an error
    /// response and mark the session failed. Any other error is reported to the
    /// monitor and returned.
    ///
    /// # Errors
    ///
    /// Returns error for failures that cannot be answered on the session's behalf,
    /// such as a playback request beyond the end of the script
    pub async fn handle(&mut self, request: ClientRequest) -> Result<ServiceResponse> {
        let index = self.next_index;
        self.next_index += 1;

        let mut interaction = match self.interactor.new_interaction(
            &request.method,
            &request.path,
            index,
            &request.url,
            &self.context,
        ) {
            Ok(interaction) => interaction,
            Err(e) => {
                self.failed = true;
                self.monitor.unexpected_request_error(&e, &self.context);
                return Err(e);
            }
        };

        self.monitor.interaction_started(index, &interaction);

        let pipeline = &self.pipeline;
        let lowercase_headers = pipeline.lowercase_headers();

        let result = match guard_hooks(|| {
            pipeline.prepare_request(
                &request.method,
                &request.url,
                &request.headers,
                request.body.clone(),
                &request.content_type,
                &mut interaction,
            )
        }) {
            Ok(prepared) => {
                let response = self
                    .interactor
                    .get_service_response_for_request(
                        &request.method,
                        &prepared.url,
                        &prepared.headers,
                        &interaction,
                        lowercase_headers,
                    )
                    .await;
                response.and_then(|response| {
                    guard_hooks(|| pipeline.process_response(response, &mut interaction))
                })
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                self.interactor.add_interaction(interaction);
                self.monitor.interaction_finished(
                    index,
                    &request.method,
                    &request.url,
                    &self.context,
                );
                Ok(response)
            }
            Err(e) if e.is_recoverable() => {
                self.failed = true;
                let response = match &e {
                    ScriptError::Upstream(_) => ServiceResponse::text(502, e.to_string()),
                    _ => ServiceResponse::text(500, e.to_string()),
                };
                interaction.note_response(&response);
                self.interactor.add_interaction(interaction);
                self.monitor.interaction_failed(
                    index,
                    &request.method,
                    &request.url,
                    &e,
                    &self.context,
                );
                Ok(response)
            }
            Err(e) => {
                self.failed = true;
                interaction.note_response(&ServiceResponse::text(500, e.to_string()));
                self.interactor.add_interaction(interaction);
                self.monitor.unexpected_request_error(&e, &self.context);
                Err(e)
            }
        }
    }

    /// End the session; later calls return the first summary
    ///
    /// # Errors
    ///
    /// Returns error if the interactor cannot finish the script
    pub fn finish(&mut self) -> Result<ScriptSummary> {
        if let Some(summary) = self.summary {
            return Ok(summary);
        }

        debug!(
            "Finishing session '{}' after {} interaction(s)",
            self.context, self.next_index
        );
        let summary = self
            .interactor
            .finished_script(self.next_index, self.failed)?;
        self.summary = Some(summary);
        Ok(summary)
    }
}

/// Run hook code, turning a panic (e.g. a failed `assert!`) into an assertion error
fn guard_hooks<T>(f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        ScriptError::Assertion(panic_message(payload.as_ref()))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "manipulation hook panicked".to_string()
    }
}
