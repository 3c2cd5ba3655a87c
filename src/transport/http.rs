//! Production transport on top of `reqwest`
//!
//! The body goes out as a `reqwest::multipart::Form`. Each part streams its
//! data in `progress-chunk-size` slices and a progress event is emitted
//! whenever the connection pulls the next slice.

use crate::config::TransportConfig;
use crate::error::{Result, UploadError};
use crate::transport::{EventSink, PreparedRequest, Transport, TransportEvent};
use crate::upload::form::FormData;
use crate::upload::types::{Method, UploadResponse};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct HttpTransport {
    /// Carries the cookie jar and bearer token
    credentialed: Client,
    anonymous: Client,
    base_url: Option<Url>,
    /// Added per request unless the caller set or omitted the same name
    default_headers: Vec<(HeaderName, HeaderValue)>,
    bearer_token: Option<String>,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| UploadError::config_error(format!("invalid base-url: {}", e)))?;
        let default_headers = Self::default_headers(&config)?;

        let credentialed = Self::client_builder(&config)
            .cookie_store(config.cookie_store)
            .build()?;
        let anonymous = Self::client_builder(&config).build()?;

        log::debug!(
            "http transport ready (base url: {:?}, chunk size: {}, {} default headers)",
            config.base_url,
            bytesize::ByteSize(config.progress_chunk_size as u64),
            default_headers.len()
        );

        Ok(Self {
            credentialed,
            anonymous,
            base_url,
            default_headers,
            bearer_token: config.bearer_token,
            chunk_size: config.progress_chunk_size,
        })
    }

    fn client_builder(config: &TransportConfig) -> reqwest::ClientBuilder {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        builder
    }

    fn default_headers(config: &TransportConfig) -> Result<Vec<(HeaderName, HeaderValue)>> {
        let mut headers = Vec::with_capacity(config.default_headers.len() + 1);
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                UploadError::config_error(format!("invalid default header '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                UploadError::config_error(format!("invalid value for '{}': {}", name, e))
            })?;
            headers.push((name, value));
        }

        if let Some(agent) = &config.user_agent {
            if !headers.iter().any(|(name, _)| name == USER_AGENT) {
                let value = HeaderValue::from_str(agent).map_err(|e| {
                    UploadError::config_error(format!("invalid user-agent: {}", e))
                })?;
                headers.push((USER_AGENT, value));
            }
        }
        Ok(headers)
    }

    fn resolve(&self, target: &str) -> std::result::Result<Url, String> {
        if let Ok(url) = Url::parse(target) {
            return Ok(url);
        }
        match &self.base_url {
            Some(base) => base.join(target).map_err(|e| e.to_string()),
            None => Err(format!("relative URL '{}' without a configured base-url", target)),
        }
    }
}

/// Running byte count across every part of one body
#[derive(Clone)]
struct ProgressMeter {
    sink: EventSink,
    loaded: Arc<AtomicU64>,
    total: u64,
}

impl ProgressMeter {
    fn advance(&self, bytes: usize) {
        let loaded = self.loaded.fetch_add(bytes as u64, Ordering::SeqCst) + bytes as u64;
        self.sink.progress(loaded, Some(self.total));
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
    }
}

fn split_body(body: Bytes, chunk_size: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(body.len() / chunk_size + 1);
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + chunk_size).min(body.len());
        chunks.push(body.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Convert the part list into a streamed `reqwest` form
fn multipart_form(
    body: &FormData,
    chunk_size: usize,
    meter: Option<ProgressMeter>,
) -> std::result::Result<Form, String> {
    let mut form = Form::new();
    for part in body.parts() {
        let length = part.data.len() as u64;
        let meter = meter.clone();
        let chunks = futures::stream::iter(split_body(part.data.clone(), chunk_size)).map(
            move |chunk| {
                if let Some(meter) = &meter {
                    meter.advance(chunk.len());
                }
                Ok::<_, std::io::Error>(chunk)
            },
        );

        let mut wire = Part::stream_with_length(Body::wrap_stream(chunks), length);
        if let Some(filename) = &part.filename {
            wire = wire.file_name(filename.clone());
        }
        if let Some(content_type) = &part.content_type {
            wire = wire.mime_str(content_type).map_err(|e| {
                format!("invalid content type '{}' for part '{}': {}", content_type, part.name, e)
            })?;
        }
        form = form.part(part.name.clone(), wire);
    }
    Ok(form)
}

impl Transport for HttpTransport {
    fn execute(&self, request: PreparedRequest, events: EventSink) -> BoxFuture<'static, ()> {
        let url = self.resolve(&request.url);
        let (client, bearer) = if request.with_credentials {
            (self.credentialed.clone(), self.bearer_token.clone())
        } else {
            (self.anonymous.clone(), None)
        };
        let bearer = bearer.filter(|_| !request.mentions(AUTHORIZATION.as_str()));
        let defaults: Vec<_> = self
            .default_headers
            .iter()
            .filter(|(name, _)| !request.mentions(name.as_str()))
            .cloned()
            .collect();
        let chunk_size = self.chunk_size;

        async move {
            let url = match url {
                Ok(url) => url,
                Err(message) => return events.emit(TransportEvent::Error(message)),
            };

            let total = request.body.data_len();
            log::debug!(
                "{} {} ({} multipart data, {} parts)",
                request.method,
                url,
                bytesize::ByteSize(total),
                request.body.parts().len()
            );

            let meter = request.report_progress.then(|| ProgressMeter {
                sink: events.clone(),
                loaded: Arc::new(AtomicU64::new(0)),
                total,
            });
            let form = match multipart_form(&request.body, chunk_size, meter) {
                Ok(form) => form,
                Err(message) => return events.emit(TransportEvent::Error(message)),
            };

            let mut builder = client
                .request(reqwest_method(request.method), url)
                .multipart(form);
            for (name, value) in defaults {
                builder = builder.header(name, value);
            }
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(token) = bearer {
                builder = builder.bearer_auth(token);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => return events.emit(TransportEvent::Error(e.to_string())),
            };

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();

            match response.text().await {
                Ok(text) => events.emit(TransportEvent::Load(UploadResponse {
                    status,
                    headers,
                    text,
                })),
                Err(e) => events.emit(TransportEvent::Error(format!(
                    "failed to read response body: {}",
                    e
                ))),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_body() {
        let chunks = split_body(Bytes::from_static(b"abcdefg"), 3);
        let sizes: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(split_body(Bytes::new(), 3).is_empty());
    }

    #[test]
    fn test_resolve_urls() {
        let transport =
            HttpTransport::new(TransportConfig::new().base_url("http://localhost:9000/v1/")).unwrap();
        assert_eq!(
            transport.resolve("/api/up").unwrap().as_str(),
            "http://localhost:9000/api/up"
        );
        assert_eq!(
            transport.resolve("files").unwrap().as_str(),
            "http://localhost:9000/v1/files"
        );
        assert_eq!(
            transport.resolve("https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );

        let bare = HttpTransport::new(TransportConfig::new()).unwrap();
        assert!(bare.resolve("/api/up").is_err());
    }

    #[test]
    fn test_default_headers_include_user_agent() {
        let config = TransportConfig::new()
            .default_header("X-Client", "cli")
            .user_agent("uploader/1.0");
        let transport = HttpTransport::new(config).unwrap();

        let names: Vec<_> = transport
            .default_headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["x-client", "user-agent"]);
    }

    #[test]
    fn test_invalid_content_type_fails_form() {
        let mut body = FormData::new();
        body.append_binary("file", &b"x"[..], "x.bin", Some("not a mime".to_string()));
        assert!(multipart_form(&body, 4, None).is_err());

        let mut body = FormData::new();
        body.append_text("a", "1");
        body.append_binary("file", &b"xyz"[..], "x.bin", Some("image/png".to_string()));
        assert!(multipart_form(&body, 4, None).is_ok());
    }

    #[test]
    fn test_invalid_default_header() {
        let config = TransportConfig::new().default_header("bad header", "x");
        assert!(matches!(
            HttpTransport::new(config),
            Err(UploadError::ConfigError { .. })
        ));
    }
}
