//! Request preparation and response classification

use crate::error::RequestError;
use crate::transport::{PreparedRequest, Transport};
use crate::upload::form::prepare_form;
use crate::upload::types::{HeaderSetting, Method, ResponseBody, UploadRequestOptions, UploadResponse};

/// Header marking the request as programmatic
pub const REQUESTED_WITH: &str = "X-Requested-With";
pub const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

/// Turn options into a wire-ready request for `transport`
pub fn prepare_request<T: Transport + ?Sized>(
    options: &UploadRequestOptions,
    transport: &T,
) -> PreparedRequest {
    let with_credentials = if options.with_credentials && !transport.supports_credentials() {
        log::debug!(
            "transport cannot send credentials, ignoring with_credentials for {}",
            options.target_url
        );
        false
    } else {
        options.with_credentials
    };

    let mut headers = Vec::with_capacity(options.headers.len() + 1);
    let mut omitted = Vec::new();
    // an explicit caller entry, value or omission, takes the place of the default
    if options.headers.get(REQUESTED_WITH).is_none() {
        headers.push((REQUESTED_WITH.to_string(), REQUESTED_WITH_VALUE.to_string()));
    }
    for (name, setting) in options.headers.iter() {
        match setting {
            HeaderSetting::Value(value) => headers.push((name.to_string(), value.clone())),
            HeaderSetting::Omit => omitted.push(name.to_string()),
        }
    }

    PreparedRequest {
        method: options.method,
        url: options.target_url.clone(),
        headers,
        omitted,
        with_credentials,
        report_progress: options.on_progress.is_some() && transport.supports_upload_progress(),
        body: prepare_form(options),
    }
}

/// Parse a response body: JSON when it parses, the raw text otherwise
pub fn parse_body(text: &str) -> ResponseBody {
    if text.is_empty() {
        return ResponseBody::Text(String::new());
    }

    match serde_json::from_str(text) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(text.to_string()),
    }
}

/// Split a completed response into success or failure by its status
pub fn classify_response(
    method: Method,
    url: &str,
    response: &UploadResponse,
) -> std::result::Result<ResponseBody, (RequestError, ResponseBody)> {
    let body = parse_body(&response.text);
    if (200..300).contains(&response.status) {
        Ok(body)
    } else {
        Err((RequestError::status_error(response.status, method, url), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::upload::types::Payload;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), ResponseBody::Text(String::new()));
        assert_eq!(parse_body("OK"), ResponseBody::Text("OK".to_string()));
        assert_eq!(parse_body("{\"id\":42}"), ResponseBody::Json(json!({"id": 42})));
        assert_eq!(parse_body("[1,2]"), ResponseBody::Json(json!([1, 2])));
        assert_eq!(
            parse_body("{broken"),
            ResponseBody::Text("{broken".to_string())
        );
    }

    #[test]
    fn test_classify_boundaries() {
        let ok = |status| classify_response(Method::Post, "/u", &UploadResponse::new(status, ""));
        assert!(ok(200).is_ok());
        assert!(ok(204).is_ok());
        assert!(ok(299).is_ok());
        assert!(ok(199).is_err());
        assert!(ok(300).is_err());

        let (err, body) = classify_response(
            Method::Patch,
            "/api/up",
            &UploadResponse::new(413, "{\"error\":\"too large\"}"),
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(413));
        assert_eq!(err.method(), Method::Patch);
        assert_eq!(err.url(), "/api/up");
        assert_eq!(body, ResponseBody::Json(json!({"error": "too large"})));
    }

    #[test]
    fn test_default_header_added() {
        let options = UploadRequestOptions::new("/u", Payload::text("x")).header("X-Token", "t");
        let request = prepare_request(&options, &MockTransport::ok("OK"));

        assert_eq!(request.header("x-requested-with"), Some("XMLHttpRequest"));
        assert_eq!(request.header("X-Token"), Some("t"));
        assert!(!request.report_progress);
    }

    #[test]
    fn test_omitted_headers_not_sent() {
        let options = UploadRequestOptions::new("/u", Payload::text("x"))
            .omit_header("x-requested-with")
            .omit_header("Authorization")
            .header("Accept", "application/json");
        let request = prepare_request(&options, &MockTransport::ok("OK"));

        assert_eq!(request.header(REQUESTED_WITH), None);
        assert_eq!(request.header("Authorization"), None);
        assert_eq!(request.headers.len(), 1);
        assert!(request.is_omitted("X-Requested-With"));
        assert!(request.is_omitted("authorization"));
        assert!(!request.is_omitted("Accept"));
        assert!(request.mentions("accept"));
    }

    #[test]
    fn test_caller_overrides_default_header() {
        let options =
            UploadRequestOptions::new("/u", Payload::text("x")).header(REQUESTED_WITH, "Fetch");
        let request = prepare_request(&options, &MockTransport::ok("OK"));

        assert_eq!(request.headers, vec![(REQUESTED_WITH.to_string(), "Fetch".to_string())]);
    }

    #[test]
    fn test_capabilities_respected() {
        let options = UploadRequestOptions::new("/u", Payload::text("x"))
            .with_credentials(true)
            .on_progress(|_| {});

        let request = prepare_request(&options, &MockTransport::ok("OK"));
        assert!(request.with_credentials);
        assert!(request.report_progress);

        let limited = MockTransport::ok("OK")
            .with_credentials_support(false)
            .with_progress_support(false);
        let request = prepare_request(&options, &limited);
        assert!(!request.with_credentials);
        assert!(!request.report_progress);
    }
}
