//! Scripted in-memory transport
//!
//! Records every request it is given and replays a fixed outcome, which makes
//! the upload protocol testable without a network.

use crate::transport::{EventSink, PreparedRequest, Transport, TransportEvent};
use crate::upload::types::UploadResponse;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock does once the body has been "sent"
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    Respond(UploadResponse),
    NetworkError(String),
    /// Never concludes; only an abort ends the request
    Hang,
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    outcome: MockOutcome,
    progress: Option<Vec<(u64, Option<u64>)>>,
    delay: Option<Duration>,
    credentials: bool,
    upload_progress: bool,
    requests: Arc<Mutex<Vec<PreparedRequest>>>,
}

impl MockTransport {
    pub fn new(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            progress: None,
            delay: None,
            credentials: true,
            upload_progress: true,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn respond(status: u16, body: impl Into<String>) -> Self {
        Self::new(MockOutcome::Respond(UploadResponse::new(status, body)))
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::respond(200, body)
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(MockOutcome::NetworkError(message.into()))
    }

    pub fn hang() -> Self {
        Self::new(MockOutcome::Hang)
    }

    /// Replace the default halfway/complete progress with explicit `(loaded, total)` steps
    pub fn with_progress(mut self, steps: Vec<(u64, Option<u64>)>) -> Self {
        self.progress = Some(steps);
        self
    }

    /// Wait before concluding, after progress has been reported
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_credentials_support(mut self, supported: bool) -> Self {
        self.credentials = supported;
        self
    }

    pub fn with_progress_support(mut self, supported: bool) -> Self {
        self.upload_progress = supported;
        self
    }

    /// Requests seen so far, in arrival order
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Transport for MockTransport {
    fn supports_credentials(&self) -> bool {
        self.credentials
    }

    fn supports_upload_progress(&self) -> bool {
        self.upload_progress
    }

    fn execute(&self, request: PreparedRequest, events: EventSink) -> BoxFuture<'static, ()> {
        let total = request.body.data_len();
        let steps = self
            .progress
            .clone()
            .unwrap_or_else(|| vec![(total / 2, Some(total)), (total, Some(total))]);
        let report_progress = request.report_progress;
        let outcome = self.outcome.clone();
        let delay = self.delay;

        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        async move {
            if report_progress {
                for (loaded, total) in steps {
                    events.progress(loaded, total);
                    tokio::task::yield_now().await;
                }
            }

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            match outcome {
                MockOutcome::Respond(response) => events.emit(TransportEvent::Load(response)),
                MockOutcome::NetworkError(message) => events.emit(TransportEvent::Error(message)),
                MockOutcome::Hang => futures::future::pending::<()>().await,
            }
        }
        .boxed()
    }
}
