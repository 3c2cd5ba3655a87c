pub mod callback;
pub mod config;
pub mod error;
pub mod transport;
pub mod upload;
pub mod uploader;

pub use callback::AbortHandle;

pub use config::TransportConfig;

pub use error::{RequestError, Result, UploadError};

#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{
    EventSink, MockOutcome, MockTransport, PreparedRequest, Transport, TransportEvent,
};

pub use upload::{
    prepare_form, ExtraFields, FieldScalar, FieldValue, FormData, FormPart, HeaderSetting,
    Headers, Method, Payload, ProgressEvent, ResponseBody, UploadRequestOptions, UploadResponse,
};

pub use uploader::{UploadOutcome, Uploader};
