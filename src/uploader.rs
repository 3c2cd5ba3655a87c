//! Entry point: one call per file
//!
//! [`Uploader::send`] never blocks. It prepares the request, spawns the
//! transport on the Tokio runtime captured at construction, and hands back an
//! [`AbortHandle`]. Outcomes arrive through the option callbacks.

use crate::callback::{AbortHandle, CallbackContext};
use crate::error::{RequestError, Result, UploadError};
use crate::transport::{EventSink, Transport, TransportEvent};
use crate::upload::request::prepare_request;
use crate::upload::types::{ResponseBody, UploadRequestOptions, UploadResponse};
use futures::future::Abortable;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

/// Result of [`Uploader::upload`]
pub type UploadOutcome =
    std::result::Result<(ResponseBody, UploadResponse), (RequestError, Option<ResponseBody>)>;

/// Issues uploads over a shared transport
#[derive(Clone)]
pub struct Uploader {
    transport: Arc<dyn Transport>,
    runtime: Handle,
}

impl Uploader {
    /// Create an uploader bound to the current Tokio runtime
    pub fn new<T: Transport + 'static>(transport: T) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| UploadError::runtime_unavailable(e.to_string()))?;
        Ok(Self::with_runtime(transport, runtime))
    }

    pub fn with_runtime<T: Transport + 'static>(transport: T, runtime: Handle) -> Self {
        Self {
            transport: Arc::new(transport),
            runtime,
        }
    }

    /// Start one upload and return immediately
    pub fn send(&self, options: UploadRequestOptions) -> AbortHandle {
        let request = prepare_request(&options, self.transport.as_ref());
        let context = Arc::new(CallbackContext::new(&options, request.report_progress));
        log::debug!(
            "request {}: {} {} ({} bytes payload, {} extra fields)",
            context.id(),
            request.method,
            request.url,
            options.payload.len(),
            options.extra_fields.len()
        );

        let sink = EventSink::new(context.clone());
        let (cancel, registration) = futures::future::AbortHandle::new_pair();
        context.set_cancel_handle(cancel);

        let execution = self.transport.execute(request, sink.clone());
        let task = async move {
            execution.await;
            // a transport that returns without concluding still owes a terminal event
            if !sink.is_closed() {
                sink.emit(TransportEvent::Error(
                    "transport finished without a response".to_string(),
                ));
            }
        };
        self.runtime.spawn(Abortable::new(task, registration));

        AbortHandle::new(context)
    }

    /// Upload and wait for the outcome.
    ///
    /// The callbacks in `options` still fire. Dropping the returned future
    /// aborts the request.
    pub async fn upload(&self, options: UploadRequestOptions) -> UploadOutcome {
        let (tx, rx) = futures::channel::oneshot::channel::<UploadOutcome>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let error_tx = tx.clone();

        let method = options.method;
        let url = options.target_url.clone();
        let user_success = options.on_success.clone();
        let user_error = options.on_error.clone();

        let options = options
            .on_success(move |body, response| {
                if let Some(callback) = &user_success {
                    callback(body.clone(), response);
                }
                if let Some(tx) = tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(Ok((body, response.clone())));
                }
            })
            .on_error(move |error, body| {
                if let Some(callback) = &user_error {
                    callback(error.clone(), body.clone());
                }
                if let Some(tx) = error_tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(Err((error, body)));
                }
            });

        let _guard = AbortOnDrop(self.send(options));
        rx.await.unwrap_or_else(|_| {
            Err((
                RequestError::transport(method, url, "upload task ended without a result"),
                None,
            ))
        })
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
