//! Callback dispatch for a single upload
//!
//! Transports report raw events; the [`CallbackContext`] turns them into the
//! user's `on_progress` / `on_success` / `on_error` calls while enforcing the
//! invocation protocol: progress never goes backwards, exactly one terminal
//! callback at most, and silence after an abort.

use crate::error::RequestError;
use crate::transport::TransportEvent;
use crate::upload::request::classify_response;
use crate::upload::types::{
    ErrorCallback, Method, ProgressCallback, ProgressEvent, SuccessCallback, UploadRequestOptions,
};
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const PENDING: u8 = 0;
const FINISHED: u8 = 1;
const ABORTED: u8 = 2;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the context whose user callback is running on this thread, or 0
    static DISPATCHING: Cell<u64> = const { Cell::new(0) };
}

/// Marks the current thread as inside a callback of one context
struct DispatchScope {
    previous: u64,
}

impl DispatchScope {
    fn enter(id: u64) -> Self {
        Self {
            previous: DISPATCHING.with(|current| current.replace(id)),
        }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|current| current.set(self.previous));
    }
}

/// State shared between a running request and its [`AbortHandle`]
pub struct CallbackContext {
    id: u64,
    method: Method,
    url: String,
    state: AtomicU8,
    last_loaded: AtomicU64,
    on_progress: Option<ProgressCallback>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    /// Held while a user callback runs; state checks happen under it
    dispatch: Mutex<()>,
    /// Cancels the spawned transport future
    cancel: Mutex<Option<futures::future::AbortHandle>>,
}

impl CallbackContext {
    /// Create a context for `options`; progress is forwarded only when `report_progress`
    pub fn new(options: &UploadRequestOptions, report_progress: bool) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst),
            method: options.method,
            url: options.target_url.clone(),
            state: AtomicU8::new(PENDING),
            last_loaded: AtomicU64::new(0),
            on_progress: if report_progress {
                options.on_progress.clone()
            } else {
                None
            },
            on_success: options.on_success.clone(),
            on_error: options.on_error.clone(),
            dispatch: Mutex::new(()),
            cancel: Mutex::new(None),
        }
    }

    /// Get the unique ID for this context
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PENDING
    }

    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FINISHED
    }

    pub fn is_aborted(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ABORTED
    }

    pub(crate) fn set_cancel_handle(&self, handle: futures::future::AbortHandle) {
        let mut slot = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        // abort() may already have run before the task was wired up
        if self.is_aborted() {
            handle.abort();
        }
        *slot = Some(handle);
    }

    /// Move from pending to `next`; only one caller ever wins
    fn conclude(&self, next: u8) -> bool {
        self.state
            .compare_exchange(PENDING, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_own_callback(&self) -> bool {
        DISPATCHING.with(|current| current.get() == self.id)
    }

    /// Handle an event from the transport
    pub fn handle_event(&self, event: TransportEvent) {
        let _dispatch = self.lock_dispatch();
        let _scope = DispatchScope::enter(self.id);
        match event {
            TransportEvent::Progress { loaded, total } => {
                if !self.is_pending() {
                    return;
                }
                let Some(callback) = self.on_progress.as_ref() else {
                    return;
                };
                let advanced = self
                    .last_loaded
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                        (loaded >= prev).then_some(loaded)
                    })
                    .is_ok();
                if !advanced {
                    log::trace!("request {}: dropping regressed progress {}", self.id, loaded);
                    return;
                }
                callback(ProgressEvent::new(loaded, total));
            }
            TransportEvent::Error(message) => {
                if !self.conclude(FINISHED) {
                    return;
                }
                log::warn!(
                    "request {}: {} {} failed: {}",
                    self.id,
                    self.method,
                    self.url,
                    message
                );
                if let Some(callback) = self.on_error.as_ref() {
                    callback(RequestError::transport(self.method, &self.url, message), None);
                }
            }
            TransportEvent::Load(response) => {
                if !self.conclude(FINISHED) {
                    return;
                }
                log::debug!(
                    "request {}: {} {} completed with status {}",
                    self.id,
                    self.method,
                    self.url,
                    response.status
                );
                match classify_response(self.method, &self.url, &response) {
                    Ok(body) => {
                        if let Some(callback) = self.on_success.as_ref() {
                            callback(body, &response);
                        }
                    }
                    Err((error, body)) => {
                        if let Some(callback) = self.on_error.as_ref() {
                            callback(error, Some(body));
                        }
                    }
                }
            }
        }
    }

    /// Abort a pending request; no-op once it has concluded.
    ///
    /// Returns only after a callback running on another thread has finished,
    /// so nothing fires once this returns.
    pub fn abort(&self) {
        if !self.conclude(ABORTED) {
            return;
        }
        if !self.in_own_callback() {
            drop(self.lock_dispatch());
        }
        log::debug!("request {}: aborted {} {}", self.id, self.method, self.url);
        if let Some(handle) = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            handle.abort();
        }
    }
}

/// Handle returned by [`crate::Uploader::send`] to cancel the request
#[derive(Clone)]
pub struct AbortHandle {
    context: Arc<CallbackContext>,
}

impl AbortHandle {
    pub(crate) fn new(context: Arc<CallbackContext>) -> Self {
        Self { context }
    }

    /// Terminate the request. Idempotent, and harmless after completion.
    pub fn abort(&self) {
        self.context.abort();
    }

    /// True once a terminal callback has fired
    pub fn is_finished(&self) -> bool {
        self.context.is_finished()
    }

    pub fn is_aborted(&self) -> bool {
        self.context.is_aborted()
    }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("id", &self.context.id())
            .field("finished", &self.is_finished())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
