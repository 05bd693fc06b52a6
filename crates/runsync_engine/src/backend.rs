use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use runsync_core::{FeedbackAction, Timestamp, STATUS_COMPLETE, STATUS_IN_PROGRESS};
use serde_json::{json, Value};
use url::Url;

use crate::{BackendError, FailureKind, StartRunRequest, StartedRun, StatusReply};

const RUNS_PATH: &str = "agent-runs";
const FEEDBACK_PATH: &str = "human-feedback";
const JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_body_bytes: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_body_bytes: 5 * 1024 * 1024,
        }
    }
}

/// The three run endpoints of the research backend.
#[async_trait::async_trait]
pub trait RunBackend: Send + Sync {
    async fn start_run(&self, request: &StartRunRequest) -> Result<StartedRun, BackendError>;

    /// Any HTTP code is a reply; only transport and decode problems are errors.
    async fn run_status(&self, run_id: &str) -> Result<StatusReply, BackendError>;

    async fn send_feedback(&self, run_id: &str, action: FeedbackAction) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: BackendSettings,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        Url::parse(&settings.base_url)
            .map_err(|err| BackendError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| BackendError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.settings.base_url)
            .map_err(|err| BackendError::new(FailureKind::InvalidUrl, err.to_string()))?;
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                BackendError::new(FailureKind::InvalidUrl, "base url cannot carry a path")
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn post_json(&self, url: Url, payload: &Value) -> Result<reqwest::Response, BackendError> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))?;
        self.client
            .post(url)
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON)
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, BackendError> {
        let max_bytes = self.settings.max_body_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, Some(content_len)));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, Some(next_len)));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    /// Reads a non-2xx response into an error carrying the server's `detail`.
    async fn status_error(&self, response: reqwest::Response) -> BackendError {
        let status = response.status();
        let detail = match self.read_body(response).await {
            Ok(bytes) => error_detail(&bytes),
            Err(_) => None,
        };
        let message = detail
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| format!("Request failed with {}", status.as_u16()));
        BackendError::new(FailureKind::HttpStatus(status.as_u16()), message)
    }
}

#[async_trait::async_trait]
impl RunBackend for ReqwestBackend {
    async fn start_run(&self, request: &StartRunRequest) -> Result<StartedRun, BackendError> {
        let url = self.endpoint(&[RUNS_PATH])?;
        let payload = serde_json::to_value(request)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))?;
        let response = self.post_json(url, &payload).await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        let bytes = self.read_body(response).await?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))?;
        parse_started_run(&body, Utc::now())
    }

    async fn run_status(&self, run_id: &str) -> Result<StatusReply, BackendError> {
        let url = self.endpoint(&[RUNS_PATH, run_id])?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, JSON)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let code = response.status().as_u16();
        let bytes = match self.read_body(response).await {
            Ok(bytes) => bytes,
            Err(err) if is_run_payload(code) => return Err(err),
            // The code alone decides an unexpected status.
            Err(_) => Vec::new(),
        };
        let body = decode_status_body(code, &bytes)?;
        Ok(StatusReply { code, body })
    }

    async fn send_feedback(&self, run_id: &str, action: FeedbackAction) -> Result<(), BackendError> {
        let url = self.endpoint(&[RUNS_PATH, run_id, FEEDBACK_PATH])?;
        let response = self
            .post_json(url, &json!({ "action": action.as_str() }))
            .await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        Ok(())
    }
}

/// Extracts the run id (`run_id`, else `id`) and creation time of a start response.
pub(crate) fn parse_started_run(body: &Value, now: Timestamp) -> Result<StartedRun, BackendError> {
    let run_id = ["run_id", "id"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|id| !id.is_empty())
        .ok_or_else(|| {
            BackendError::new(
                FailureKind::MissingRunId,
                "Missing run identifier from backend response.",
            )
        })?;
    let created_at = body
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or(now);
    Ok(StartedRun {
        run_id: run_id.to_string(),
        created_at,
    })
}

/// Accepts RFC 3339 or a zone-less ISO-8601 timestamp, read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn decode_status_body(code: u16, bytes: &[u8]) -> Result<Value, BackendError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    match serde_json::from_slice(bytes) {
        Ok(body) => Ok(body),
        Err(err) if is_run_payload(code) => Err(BackendError::new(
            FailureKind::Decode,
            format!("Invalid status payload: {err}"),
        )),
        Err(_) => Ok(Value::Null),
    }
}

/// Codes whose body carries run state and must decode.
fn is_run_payload(code: u16) -> bool {
    code == STATUS_COMPLETE || code == STATUS_IN_PROGRESS
}

fn error_detail(bytes: &[u8]) -> Option<String> {
    let body: Value = serde_json::from_slice(bytes).ok()?;
    match body.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn too_large(max_bytes: u64, actual: Option<u64>) -> BackendError {
    BackendError::new(
        FailureKind::TooLarge { max_bytes, actual },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::new(FailureKind::Timeout, err.to_string());
    }
    BackendError::new(FailureKind::Network, err.to_string())
}
