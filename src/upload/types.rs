use crate::error::{RequestError, Result, UploadError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP method of an upload request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Put,
    Patch,
}

impl Default for Method {
    fn default() -> Self {
        Method::Post
    }
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            _ => Err(UploadError::invalid_parameter(
                "method",
                format!("unsupported upload method '{}'", s),
            )),
        }
    }
}

/// Value assigned to a request header.
///
/// `Omit` is an explicit suppression: the header is never sent, even when it
/// is one the transport would add by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSetting {
    Value(String),
    Omit,
}

impl From<&str> for HeaderSetting {
    fn from(value: &str) -> Self {
        HeaderSetting::Value(value.to_string())
    }
}

impl From<String> for HeaderSetting {
    fn from(value: String) -> Self {
        HeaderSetting::Value(value)
    }
}

/// Ordered header map with case-insensitive names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, HeaderSetting)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any earlier entry with the same name
    pub fn set(&mut self, name: impl Into<String>, setting: impl Into<HeaderSetting>) {
        let name = name.into();
        let setting = setting.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = setting,
            None => self.entries.push((name, setting)),
        }
    }

    pub fn omit(&mut self, name: impl Into<String>) {
        self.set(name, HeaderSetting::Omit);
    }

    pub fn get(&self, name: &str) -> Option<&HeaderSetting> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, setting)| setting)
    }

    pub fn is_omitted(&self, name: &str) -> bool {
        matches!(self.get(name), Some(HeaderSetting::Omit))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderSetting)> {
        self.entries.iter().map(|(name, setting)| (name.as_str(), setting))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single form value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldScalar {
    Text(String),
    Binary {
        data: Bytes,
        filename: Option<String>,
        content_type: Option<String>,
    },
}

impl FieldScalar {
    pub fn binary(data: impl Into<Bytes>) -> Self {
        FieldScalar::Binary {
            data: data.into(),
            filename: None,
            content_type: None,
        }
    }
}

macro_rules! scalar_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldScalar {
                fn from(value: $ty) -> Self {
                    FieldScalar::Text(value.to_string())
                }
            }

            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Scalar(FieldScalar::from(value))
                }
            }
        )*
    };
}

scalar_from_display!(&str, String, bool, i32, i64, u32, u64, usize, f64);

/// Value of an extra form field: one scalar, or a list expanded as `name[]`
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(FieldScalar),
    List(Vec<FieldScalar>),
}

impl From<FieldScalar> for FieldValue {
    fn from(value: FieldScalar) -> Self {
        FieldValue::Scalar(value)
    }
}

impl<T: Into<FieldScalar>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::List(values.into_iter().map(Into::into).collect())
    }
}

fn json_scalar(value: serde_json::Value) -> Option<FieldScalar> {
    match value {
        serde_json::Value::String(s) => Some(FieldScalar::Text(s)),
        serde_json::Value::Number(n) => Some(FieldScalar::Text(n.to_string())),
        serde_json::Value::Bool(b) => Some(FieldScalar::Text(b.to_string())),
        _ => None,
    }
}

impl TryFrom<serde_json::Value> for FieldValue {
    type Error = UploadError;

    /// Objects, nulls and nested arrays have no form encoding and are rejected.
    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    json_scalar(item).ok_or_else(|| {
                        UploadError::invalid_parameter(
                            "extra_fields",
                            "list elements must be strings, numbers or booleans",
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::List),
            other => json_scalar(other).map(FieldValue::Scalar).ok_or_else(|| {
                UploadError::invalid_parameter(
                    "extra_fields",
                    "field values must be strings, numbers, booleans or lists of those",
                )
            }),
        }
    }
}

/// Extra form fields, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraFields {
    entries: Vec<(String, FieldValue)>,
}

impl ExtraFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field; re-inserting a name replaces its value in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Build from a JSON object, in the object's key order
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(UploadError::invalid_parameter(
                "extra_fields",
                "expected a JSON object",
            ));
        };

        let mut fields = ExtraFields::new();
        for (name, value) in map {
            fields.insert(name, FieldValue::try_from(value)?);
        }
        Ok(fields)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content being uploaded
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Binary content carrying its own file name
    File {
        name: String,
        data: Bytes,
        content_type: Option<String>,
    },
    /// Anonymous binary content
    Blob {
        data: Bytes,
        content_type: Option<String>,
    },
    Text(String),
}

impl Payload {
    pub fn file(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Payload::File {
            name: name.into(),
            data: data.into(),
            content_type: None,
        }
    }

    pub fn blob(data: impl Into<Bytes>) -> Self {
        Payload::Blob {
            data: data.into(),
            content_type: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    /// Read a file from disk, naming the payload after it
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UploadError::invalid_parameter("path", format!("no file name in {:?}", path))
            })?
            .to_string();
        let data = std::fs::read(path)?;

        Ok(Payload::File {
            content_type: Some(mime_guess::from_path(&name).first_or_octet_stream().to_string()),
            name,
            data: Bytes::from(data),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::File { data, .. } | Payload::Blob { data, .. } => data.len(),
            Payload::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Upload progress notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub bytes_loaded: u64,
    pub bytes_total: Option<u64>,
    /// `bytes_loaded / bytes_total * 100`, only when the total is known and positive
    pub percent: Option<f64>,
}

impl ProgressEvent {
    pub fn new(bytes_loaded: u64, bytes_total: Option<u64>) -> Self {
        let percent = match bytes_total {
            Some(total) if total > 0 => Some(bytes_loaded as f64 / total as f64 * 100.0),
            _ => None,
        };

        Self {
            bytes_loaded,
            bytes_total,
            percent,
        }
    }
}

/// Parsed response body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Json(_) => None,
            ResponseBody::Text(text) => Some(text),
        }
    }
}

impl std::fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Json(value) => write!(f, "{}", value),
            ResponseBody::Text(text) => f.write_str(text),
        }
    }
}

/// Completed HTTP exchange, handed to `on_success` alongside the parsed body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub text: String,
}

impl UploadResponse {
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            text: text.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
pub type SuccessCallback = Arc<dyn Fn(ResponseBody, &UploadResponse) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(RequestError, Option<ResponseBody>) + Send + Sync>;

/// Description of one upload request
#[derive(Clone)]
pub struct UploadRequestOptions {
    pub payload: Payload,
    pub field_name: String,
    pub extra_fields: ExtraFields,
    pub target_url: String,
    pub method: Method,
    pub headers: Headers,
    pub with_credentials: bool,
    pub on_progress: Option<ProgressCallback>,
    pub on_success: Option<SuccessCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for UploadRequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequestOptions")
            .field("payload_len", &self.payload.len())
            .field("field_name", &self.field_name)
            .field("extra_fields", &self.extra_fields)
            .field("target_url", &self.target_url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("with_credentials", &self.with_credentials)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl UploadRequestOptions {
    pub fn new(target_url: impl Into<String>, payload: Payload) -> Self {
        Self {
            payload,
            field_name: "file".to_string(),
            extra_fields: ExtraFields::new(),
            target_url: target_url.into(),
            method: Method::Post,
            headers: Headers::new(),
            with_credentials: false,
            on_progress: None,
            on_success: None,
            on_error: None,
        }
    }

    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extra_fields.insert(name, value);
        self
    }

    pub fn extra_fields(mut self, fields: ExtraFields) -> Self {
        self.extra_fields = fields;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderSetting>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn omit_header(mut self, name: impl Into<String>) -> Self {
        self.headers.omit(name);
        self
    }

    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(ResponseBody, &UploadResponse) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(RequestError, Option<ResponseBody>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_url.trim().is_empty() {
            return Err(UploadError::invalid_parameter(
                "target_url",
                "Target URL cannot be empty",
            ));
        }

        if self.field_name.is_empty() {
            return Err(UploadError::invalid_parameter(
                "field_name",
                "Field name cannot be empty",
            ));
        }

        Ok(())
    }
}
