//! `multipart/form-data` body model
//!
//! Parts are kept in append order, like a browser `FormData`. Transports turn
//! the list into wire framing; binary parts carry a filename and content type,
//! text parts carry neither.

use crate::upload::types::{FieldScalar, FieldValue, Payload, UploadRequestOptions};
use bytes::Bytes;

const DEFAULT_BINARY_TYPE: &str = "application/octet-stream";

/// One named part of a multipart body
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    /// Present on binary parts
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FormPart {
    pub fn is_binary(&self) -> bool {
        self.filename.is_some()
    }

    /// Part data as text, if it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Ordered multipart container
#[derive(Debug, Clone, Default)]
pub struct FormData {
    parts: Vec<FormPart>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(FormPart {
            name: name.into(),
            filename: None,
            content_type: None,
            data: Bytes::from(value.into()),
        });
    }

    pub fn append_binary(
        &mut self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        filename: impl Into<String>,
        content_type: Option<String>,
    ) {
        self.parts.push(FormPart {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.unwrap_or_else(|| DEFAULT_BINARY_TYPE.to_string())),
            data: data.into(),
        });
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Parts appended under `name`, in append order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FormPart> + 'a {
        self.parts.iter().filter(move |part| part.name == name)
    }

    /// Combined size of all part data, framing excluded
    pub fn data_len(&self) -> u64 {
        self.parts.iter().map(|part| part.data.len() as u64).sum()
    }
}

fn append_scalar(form: &mut FormData, name: &str, value: &FieldScalar) {
    match value {
        FieldScalar::Text(text) => form.append_text(name, text.clone()),
        FieldScalar::Binary {
            data,
            filename,
            content_type,
        } => form.append_binary(
            name,
            data.clone(),
            filename.clone().unwrap_or_else(|| "blob".to_string()),
            content_type.clone(),
        ),
    }
}

/// Build the request body: extra fields first, the payload last
pub fn prepare_form(options: &UploadRequestOptions) -> FormData {
    let mut form = FormData::new();

    for (name, value) in options.extra_fields.iter() {
        match value {
            FieldValue::List(items) => {
                let list_name = format!("{}[]", name);
                for item in items {
                    append_scalar(&mut form, &list_name, item);
                }
            }
            FieldValue::Scalar(scalar) => append_scalar(&mut form, name, scalar),
        }
    }

    match &options.payload {
        Payload::File {
            name,
            data,
            content_type,
        } => form.append_binary(&options.field_name, data.clone(), name, content_type.clone()),
        // anonymous blobs are named after the field so servers still see a file part
        Payload::Blob { data, content_type } => form.append_binary(
            &options.field_name,
            data.clone(),
            &options.field_name,
            content_type.clone(),
        ),
        Payload::Text(text) => form.append_text(&options.field_name, text.clone()),
    }

    form
}
