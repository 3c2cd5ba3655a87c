//! Upload request model
//!
//! This module describes one upload (options, payload, form fields), builds
//! its multipart body, and classifies the response it gets back.

pub mod form;
pub mod request;
pub mod types;

pub use form::{prepare_form, FormData, FormPart};
pub use request::{classify_response, parse_body, prepare_request};
pub use types::{
    ExtraFields, FieldScalar, FieldValue, HeaderSetting, Headers, Method, Payload, ProgressEvent,
    ResponseBody, UploadRequestOptions, UploadResponse,
};
