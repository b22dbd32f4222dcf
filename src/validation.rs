//! Visual-standard validation: comparing a field photo against a reference PDF.
//!
//! The comparison itself is done by an external service. This module defines
//! the wire contract, the [`VisualStandardValidator`] seam, a deterministic
//! [`MockValidator`], an HTTP client for a real provider, and the
//! timeout/retry policy every call goes through.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// URL fragment the mock treats as a passing standard.
pub const MOCK_OK_MARKER: &str = "ok-standard.pdf";
const MOCK_FAILURE_REASON: &str = "The bookshelf was not set up according to the visual standard.";
const MOCK_FAILED_ZONE: &str = "floor-1";
const MOCK_ZONE_REASON: &str = "Error: System does not recognize red in this area.";
const USER_AGENT: &str = concat!("connectflow/", env!("CARGO_PKG_VERSION"));

/// Request sent to the validation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualStandardRequest {
    /// `data:<mime>;base64,<payload>`
    pub photo_data_uri: String,
    /// Absolute URL of the standard document.
    pub standard_pdf_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOT_OK")]
    NotOk,
}

/// A region of the photo that does not match the standard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedZone {
    pub zone_id: String,
    pub reason: String,
}

/// Response from the validation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualStandardResponse {
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_zones: Option<Vec<FailedZone>>,
}

impl VisualStandardResponse {
    pub fn ok() -> Self {
        Self { status: ValidationStatus::Ok, failure_reason: None, failed_zones: None }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ValidationStatus::Ok
    }
}

/// Failures to get an answer from the validation service.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ValidatorError {
    /// Transport failures and timeouts may succeed on a later attempt. A
    /// malformed body came from a reachable service and is not retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ValidatorError::Transport(_) | ValidatorError::Timeout(_))
    }
}

/// An external image-vs-standard comparison service.
#[async_trait]
pub trait VisualStandardValidator: Send + Sync {
    async fn validate(&self, request: &VisualStandardRequest) -> Result<VisualStandardResponse, ValidatorError>;
}

/// Stand-in for the real service: fixed latency, answer keyed on the standard URL.
#[derive(Debug, Clone)]
pub struct MockValidator {
    latency: Duration,
}

impl MockValidator {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockValidator {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

#[async_trait]
impl VisualStandardValidator for MockValidator {
    async fn validate(&self, request: &VisualStandardRequest) -> Result<VisualStandardResponse, ValidatorError> {
        debug!(url = %request.standard_pdf_url, latency = ?self.latency, "mock visual standard validation");
        tokio::time::sleep(self.latency).await;

        if request.standard_pdf_url.contains(MOCK_OK_MARKER) {
            return Ok(VisualStandardResponse::ok());
        }
        Ok(VisualStandardResponse {
            status: ValidationStatus::NotOk,
            failure_reason: Some(MOCK_FAILURE_REASON.to_string()),
            failed_zones: Some(vec![FailedZone {
                zone_id: MOCK_FAILED_ZONE.to_string(),
                reason: MOCK_ZONE_REASON.to_string(),
            }]),
        })
    }
}

/// Client for a provider that accepts the request contract as a JSON POST.
pub struct HttpValidator {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpValidator {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, ValidatorError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ValidatorError::Transport(format!("invalid endpoint: {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ValidatorError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint, api_key })
    }
}

#[async_trait]
impl VisualStandardValidator for HttpValidator {
    async fn validate(&self, request: &VisualStandardRequest) -> Result<VisualStandardResponse, ValidatorError> {
        let mut call = self.client.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call.send().await.map_err(|e| ValidatorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ValidatorError::Transport(format!("validation service returned HTTP {status}")));
        }
        response
            .json::<VisualStandardResponse>()
            .await
            .map_err(|e| ValidatorError::MalformedResponse(e.to_string()))
    }
}

/// Timeout and retry settings for validator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Per-attempt limit.
    pub timeout: Duration,
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Call the validator under `policy`.
///
/// Only transient failures are retried. A `NOT_OK` answer is returned as-is:
/// the service was reached and gave its verdict.
pub async fn validate_with_policy(
    validator: &dyn VisualStandardValidator,
    request: &VisualStandardRequest,
    policy: &ValidationPolicy,
) -> Result<VisualStandardResponse, ValidatorError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, validator.validate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ValidatorError::Timeout(policy.timeout)),
        };
        match outcome {
            Ok(response) => {
                info!(status = ?response.status, attempt, "visual standard validated");
                return Ok(response);
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(error = %e, attempt, of = attempts, "validator call failed, retrying");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(error = %e, attempt, "validator call failed");
                return Err(e);
            }
        }
    }
}

/// Whether `s` is a `data:<mime>;base64,<payload>` URI with a decodable payload.
pub fn is_base64_data_uri(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("data:") else {
        return false;
    };
    let Some((mime, payload)) = rest.split_once(";base64,") else {
        return false;
    };
    mime.contains('/') && !payload.is_empty() && base64::engine::general_purpose::STANDARD.decode(payload).is_ok()
}

/// Encode raw image bytes as a data URI.
pub fn photo_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Resolve a requirement's `pdfUrl` to an absolute http(s) URL.
///
/// Absolute URLs pass through; relative ones are joined onto `base`.
pub fn resolve_standard_url(pdf_url: &str, base: Option<&str>) -> Option<String> {
    let absolute = match Url::parse(pdf_url) {
        Ok(url) => url,
        Err(_) => Url::parse(base?).ok()?.join(pdf_url).ok()?,
    };
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn request(url: &str) -> VisualStandardRequest {
        VisualStandardRequest {
            photo_data_uri: photo_data_uri("image/png", b"png"),
            standard_pdf_url: url.into(),
        }
    }

    /// Fails with a transport error for the first `failures` calls.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VisualStandardValidator for Flaky {
        async fn validate(&self, _: &VisualStandardRequest) -> Result<VisualStandardResponse, ValidatorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ValidatorError::Transport("connection refused".into()))
            } else {
                Ok(VisualStandardResponse::ok())
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl VisualStandardValidator for Hangs {
        async fn validate(&self, _: &VisualStandardRequest) -> Result<VisualStandardResponse, ValidatorError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(VisualStandardResponse::ok())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_ok_standard_passes() {
        let v = MockValidator::default();
        let started = tokio::time::Instant::now();
        let r = v.validate(&request("https://cdn.example.com/standards/ok-standard.pdf")).await.unwrap();
        assert!(r.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_other_standard_fails_on_floor_zone() {
        let v = MockValidator::default();
        let r = v.validate(&request("https://cdn.example.com/standards/bookshelf-standard.pdf")).await.unwrap();
        assert_eq!(r.status, ValidationStatus::NotOk);
        let zones = r.failed_zones.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].zone_id, "floor-1");
        assert!(r.failure_reason.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_retries_transient_failures() {
        let v = Flaky { failures: 2, calls: AtomicU32::new(0) };
        let policy = ValidationPolicy { max_attempts: 3, ..ValidationPolicy::default() };
        let r = validate_with_policy(&v, &request("https://x/ok-standard.pdf"), &policy).await.unwrap();
        assert!(r.is_ok());
        assert_eq!(v.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_gives_up_after_max_attempts() {
        let v = Flaky { failures: 10, calls: AtomicU32::new(0) };
        let policy = ValidationPolicy { max_attempts: 2, ..ValidationPolicy::default() };
        let err = validate_with_policy(&v, &request("https://x/a.pdf"), &policy).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Transport(_)));
        assert_eq!(v.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_does_not_retry_not_ok() {
        let v = MockValidator::new(Duration::from_millis(10));
        let policy = ValidationPolicy::default();
        let r = validate_with_policy(&v, &request("https://x/bookshelf.pdf"), &policy).await.unwrap();
        assert_eq!(r.status, ValidationStatus::NotOk);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_times_out() {
        let policy = ValidationPolicy { timeout: Duration::from_secs(2), max_attempts: 1, backoff: Duration::ZERO };
        let err = validate_with_policy(&Hangs, &request("https://x/a.pdf"), &policy).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Timeout(d) if d == Duration::from_secs(2)));
    }

    /// Answers every connection with `status` and `body`; counts requests.
    async fn stub_service(status: u16, body: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut socket).await;
                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}/v1/compare"), hits)
    }

    /// Read headers and a Content-Length body.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let len = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    return;
                }
            }
        }
    }

    fn http_policy() -> ValidationPolicy {
        ValidationPolicy { timeout: Duration::from_secs(5), max_attempts: 3, backoff: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn test_http_ok_response() {
        let (url, hits) = stub_service(200, r#"{"status":"OK"}"#).await;
        let v = HttpValidator::new(&url, Some("key".into())).unwrap();
        let r = validate_with_policy(&v, &request("https://x/ok-standard.pdf"), &http_policy()).await.unwrap();
        assert!(r.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_server_error_is_transport_and_retried() {
        let (url, hits) = stub_service(500, r#"{"error":"boom"}"#).await;
        let v = HttpValidator::new(&url, None).unwrap();
        let err = v.validate(&request("https://x/a.pdf")).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Transport(_)), "{err}");

        hits.store(0, Ordering::SeqCst);
        let err = validate_with_policy(&v, &request("https://x/a.pdf"), &http_policy()).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Transport(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_http_garbage_body_is_malformed_and_not_retried() {
        let (url, hits) = stub_service(200, "<html>maintenance</html>").await;
        let v = HttpValidator::new(&url, None).unwrap();
        let err = validate_with_policy(&v, &request("https://x/a.pdf"), &http_policy()).await.unwrap_err();
        assert!(matches!(err, ValidatorError::MalformedResponse(_)), "{err}");
        assert!(!err.is_transient());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_refused_connection_is_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let v = HttpValidator::new(&format!("http://{addr}/v1/compare"), None).unwrap();
        let err = validate_with_policy(&v, &request("https://x/a.pdf"), &http_policy()).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Transport(_)), "{err}");
        assert!(err.is_transient());
    }

    #[test]
    fn test_response_wire_shape() {
        let r: VisualStandardResponse = serde_json::from_str(
            r#"{"status":"NOT_OK","failureReason":"bad","failedZones":[{"zoneId":"floor-1","reason":"red"}]}"#,
        )
        .unwrap();
        assert_eq!(r.status, ValidationStatus::NotOk);
        assert_eq!(r.failed_zones.unwrap()[0].zone_id, "floor-1");
        assert_eq!(serde_json::to_string(&VisualStandardResponse::ok()).unwrap(), r#"{"status":"OK"}"#);
    }

    #[test]
    fn test_data_uri_check() {
        assert!(is_base64_data_uri(&photo_data_uri("image/jpeg", &[0xff, 0xd8, 0xff])));
        assert!(!is_base64_data_uri("https://picsum.photos/seed/101/800/600"));
        assert!(!is_base64_data_uri("data:image/png;base64,"));
        assert!(!is_base64_data_uri("data:image/png;base64,@@@"));
    }

    #[test]
    fn test_resolve_standard_url() {
        assert_eq!(
            resolve_standard_url("/standards/bookshelf-standard.pdf", Some("https://standards.example.com/app/")).as_deref(),
            Some("https://standards.example.com/standards/bookshelf-standard.pdf")
        );
        assert_eq!(
            resolve_standard_url("https://cdn.example.com/ok-standard.pdf", None).as_deref(),
            Some("https://cdn.example.com/ok-standard.pdf")
        );
        assert_eq!(resolve_standard_url("/standards/x.pdf", None), None);
        assert_eq!(resolve_standard_url("ftp://host/x.pdf", None), None);
    }
}
