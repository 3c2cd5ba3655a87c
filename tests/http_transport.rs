//! HTTP transport integration tests
//!
//! A one-shot TCP server on the loopback interface captures the raw request
//! and answers with a canned response.

#![cfg(feature = "http")]

use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use upload_transport::{
    ExtraFields, HttpTransport, Method, Payload, ResponseBody, TransportConfig,
    UploadRequestOptions, Uploader,
};

struct CapturedRequest {
    head: String,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn serve_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let captured = CapturedRequest {
            head: head.clone(),
            body: Vec::new(),
        };
        let content_length = captured
            .header("content-length")
            .and_then(|v| v.parse::<usize>().ok());
        let chunked = captured
            .header("transfer-encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);

        loop {
            let received = buf.len() - head_end;
            let complete = match content_length {
                Some(len) => received >= len,
                None if chunked => buf.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if complete {
                break;
            }
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        let _ = tx.send(CapturedRequest {
            head,
            body: buf[head_end..].to_vec(),
        });
    });

    (format!("http://{}", addr), rx)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multipart_request_on_the_wire() {
    let _ = env_logger::try_init();
    let (base, captured) = serve_once("200 OK", "{\"id\":42}").await;

    let transport = HttpTransport::new(
        TransportConfig::new()
            .base_url(base)
            .progress_chunk_size(16),
    )
    .unwrap();
    let uploader = Uploader::new(transport).unwrap();

    let progress = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let progress_clone = progress.clone();
    let options = UploadRequestOptions::new("/api/up", Payload::file("hello.txt", &b"hello world"[..]))
        .method(Method::Put)
        .extra_fields(ExtraFields::from_json(json!({"tags": ["a", "b"], "owner": "me"})).unwrap())
        .header("X-Custom", "yes")
        .on_progress(move |event| progress_clone.lock().unwrap().push(event));

    let (body, response) = uploader.upload(options).await.unwrap();
    assert_eq!(body, ResponseBody::Json(json!({"id": 42})));
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("text/plain"));

    let request = tokio::time::timeout(Duration::from_secs(5), captured)
        .await
        .unwrap()
        .unwrap();
    assert!(request.request_line().starts_with("PUT /api/up "));
    assert_eq!(request.header("x-requested-with").as_deref(), Some("XMLHttpRequest"));
    assert_eq!(request.header("x-custom").as_deref(), Some("yes"));
    assert!(request
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));

    let text = request.body_text();
    let tag_a = text.find("name=\"tags[]\"\r\n\r\na\r\n").unwrap();
    let tag_b = text.find("name=\"tags[]\"\r\n\r\nb\r\n").unwrap();
    let owner = text.find("name=\"owner\"\r\n\r\nme\r\n").unwrap();
    let file = text
        .find("name=\"file\"; filename=\"hello.txt\"")
        .unwrap();
    assert!(tag_a < tag_b && tag_b < owner && owner < file);
    assert!(text.contains("hello world"));
    assert!(text.contains("Content-Type: application/octet-stream"));
    let boundary = request
        .header("content-type")
        .and_then(|v| v.split_once("boundary=").map(|(_, b)| b.to_string()))
        .unwrap();
    assert!(text.trim_end().ends_with(&format!("--{}--", boundary)));

    let progress = progress.lock().unwrap();
    assert!(!progress.is_empty());
    let last = progress.last().unwrap();
    assert_eq!(last.bytes_total, Some(last.bytes_loaded));
    assert_eq!(last.percent, Some(100.0));
    assert!(progress
        .windows(2)
        .all(|w| w[0].bytes_loaded <= w[1].bytes_loaded));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_error_and_suppressed_header() {
    let (base, captured) = serve_once("413 Payload Too Large", "too big").await;

    let uploader = Uploader::new(HttpTransport::new(TransportConfig::new()).unwrap()).unwrap();
    let options = UploadRequestOptions::new(format!("{}/api/up", base), Payload::blob(&b"12345"[..]))
        .omit_header("X-Requested-With");

    let (error, body) = uploader.upload(options).await.unwrap_err();
    assert_eq!(error.status(), Some(413));
    assert_eq!(error.method(), Method::Post);
    assert_eq!(body, Some(ResponseBody::Text("too big".to_string())));

    let request = captured.await.unwrap();
    assert_eq!(request.header("x-requested-with"), None);
    assert!(request.body_text().contains("name=\"file\"; filename=\"file\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bearer_token_only_with_credentials() {
    for with_credentials in [true, false] {
        let (base, captured) = serve_once("204 No Content", "").await;
        let transport =
            HttpTransport::new(TransportConfig::new().bearer_token("s3cret")).unwrap();
        let uploader = Uploader::new(transport).unwrap();

        let options = UploadRequestOptions::new(format!("{}/up", base), Payload::text("x"))
            .with_credentials(with_credentials);
        let (body, _) = uploader.upload(options).await.unwrap();
        assert_eq!(body, ResponseBody::Text(String::new()));

        let request = captured.await.unwrap();
        let auth = request.header("authorization");
        if with_credentials {
            assert_eq!(auth.as_deref(), Some("Bearer s3cret"));
        } else {
            assert_eq!(auth, None);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_omitted_headers_beat_config_defaults() {
    let (base, captured) = serve_once("200 OK", "OK").await;
    let config = TransportConfig::new()
        .default_header("X-Client", "cli")
        .user_agent("uploader/1.0")
        .bearer_token("s3cret");
    let uploader = Uploader::new(HttpTransport::new(config).unwrap()).unwrap();

    let options = UploadRequestOptions::new(format!("{}/up", base), Payload::text("x"))
        .with_credentials(true)
        .omit_header("x-client")
        .omit_header("Authorization")
        .omit_header("User-Agent");
    uploader.upload(options).await.unwrap();

    let request = captured.await.unwrap();
    assert_eq!(request.header("x-client"), None);
    assert_eq!(request.header("authorization"), None);
    assert_eq!(request.header("user-agent"), None);
    assert_eq!(request.header("x-requested-with").as_deref(), Some("XMLHttpRequest"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_config_defaults_yield_to_caller_headers() {
    let config = || {
        TransportConfig::new()
            .default_header("X-Client", "cli")
            .bearer_token("s3cret")
    };

    let (base, captured) = serve_once("200 OK", "OK").await;
    let uploader = Uploader::new(HttpTransport::new(config()).unwrap()).unwrap();
    uploader
        .upload(UploadRequestOptions::new(format!("{}/up", base), Payload::text("x")))
        .await
        .unwrap();
    let request = captured.await.unwrap();
    assert_eq!(request.header("x-client").as_deref(), Some("cli"));

    let (base, captured) = serve_once("200 OK", "OK").await;
    let uploader = Uploader::new(HttpTransport::new(config()).unwrap()).unwrap();
    let options = UploadRequestOptions::new(format!("{}/up", base), Payload::text("x"))
        .with_credentials(true)
        .header("X-Client", "override")
        .header("Authorization", "Basic dXNlcjpwdw==");
    uploader.upload(options).await.unwrap();

    let request = captured.await.unwrap();
    assert_eq!(request.header("x-client").as_deref(), Some("override"));
    assert_eq!(request.header("authorization").as_deref(), Some("Basic dXNlcjpwdw=="));
    let client_lines = request
        .head
        .lines()
        .filter(|line| line.to_ascii_lowercase().starts_with("x-client:"))
        .count();
    assert_eq!(client_lines, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let uploader = Uploader::new(HttpTransport::new(TransportConfig::new()).unwrap()).unwrap();
    let options = UploadRequestOptions::new(format!("http://{}/up", addr), Payload::text("x"));

    let (error, body) = uploader.upload(options).await.unwrap_err();
    assert_eq!(error.status(), None);
    assert!(body.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relative_url_without_base_fails() {
    let uploader = Uploader::new(HttpTransport::new(TransportConfig::new()).unwrap()).unwrap();
    let options = UploadRequestOptions::new("/api/up", Payload::text("x"));

    let (error, _) = uploader.upload(options).await.unwrap_err();
    assert_eq!(error.status(), None);
    assert!(error.to_string().contains("base-url"));
}
