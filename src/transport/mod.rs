//! Transport abstraction
//!
//! A [`Transport`] owns the actual I/O: it receives a fully prepared request and
//! reports what happens to it through an [`EventSink`]. Everything protocol
//! related (ordering, classification, cancellation) happens on the sink side,
//! so adapters stay small.

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

use crate::callback::CallbackContext;
use crate::upload::form::FormData;
use crate::upload::types::{Method, UploadResponse};
use futures::future::BoxFuture;
use std::sync::Arc;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use mock::{MockOutcome, MockTransport};

/// A request ready to go on the wire
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    /// Headers to send, already filtered of omitted entries
    pub headers: Vec<(String, String)>,
    /// Names the caller suppressed; adapters must not add these on their own
    pub omitted: Vec<String>,
    pub with_credentials: bool,
    pub report_progress: bool,
    pub body: FormData,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_omitted(&self, name: &str) -> bool {
        self.omitted
            .iter()
            .any(|omitted| omitted.eq_ignore_ascii_case(name))
    }

    /// Whether the caller either set or suppressed `name`
    pub fn mentions(&self, name: &str) -> bool {
        self.is_omitted(name) || self.header(name).is_some()
    }
}

/// Something that happened to an in-flight request
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Request body bytes handed to the connection so far
    Progress { loaded: u64, total: Option<u64> },
    /// The request failed before a response arrived
    Error(String),
    /// A complete response arrived, whatever its status
    Load(UploadResponse),
}

/// Receiving end of transport events for one invocation
#[derive(Clone)]
pub struct EventSink {
    context: Arc<CallbackContext>,
}

impl EventSink {
    pub(crate) fn new(context: Arc<CallbackContext>) -> Self {
        Self { context }
    }

    pub fn emit(&self, event: TransportEvent) {
        self.context.handle_event(event);
    }

    pub fn progress(&self, loaded: u64, total: Option<u64>) {
        self.emit(TransportEvent::Progress { loaded, total });
    }

    /// True once the invocation was aborted or already concluded
    pub fn is_closed(&self) -> bool {
        !self.context.is_pending()
    }
}

/// Asynchronous HTTP capability the uploader drives
pub trait Transport: Send + Sync {
    /// Whether credentialed mode can be honoured; the flag is ignored otherwise
    fn supports_credentials(&self) -> bool {
        true
    }

    /// Whether upload progress events can be produced
    fn supports_upload_progress(&self) -> bool {
        true
    }

    /// Issue the request and report its fate through `events`.
    ///
    /// The returned future may be dropped at any point when the caller aborts.
    fn execute(&self, request: PreparedRequest, events: EventSink) -> BoxFuture<'static, ()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn supports_credentials(&self) -> bool {
        (**self).supports_credentials()
    }

    fn supports_upload_progress(&self) -> bool {
        (**self).supports_upload_progress()
    }

    fn execute(&self, request: PreparedRequest, events: EventSink) -> BoxFuture<'static, ()> {
        (**self).execute(request, events)
    }
}
