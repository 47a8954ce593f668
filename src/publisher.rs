//! Publisher seam and the HTTP multipart implementation.

use async_trait::async_trait;
use reqwest::{
    Body, Client, StatusCode,
    header::COOKIE,
    multipart::{Form, Part},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::io::ReaderStream;

use crate::{credentials::SessionCredential, discovery, error::PublishError};

/// Everything needed to publish one video.
#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub path: PathBuf,
    pub description: String,
    pub credential: Arc<SessionCredential>,
}

/// Performs the network publish of a single job.
///
/// `Rejected` errors are job-specific and the run moves on. `Fatal` errors
/// mean the capability itself is broken and the remaining jobs are abandoned.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, req: PublishRequest) -> Result<(), PublishError>;
}

/// Uploads videos as `multipart/form-data` with the session cookies attached.
pub struct HttpPublisher {
    http: Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, req: PublishRequest) -> Result<(), PublishError> {
        // Unreadable files only affect this job.
        let file = tokio::fs::File::open(&req.path).await.map_err(|e| {
            PublishError::rejected(format!("cannot open {}: {e}", req.path.display()))
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|e| PublishError::rejected(format!("cannot stat {}: {e}", req.path.display())))?
            .len();

        let file_name = req
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".into());

        let video = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), len)
            .file_name(file_name)
            .mime_str(mime_for(&req.path))
            .map_err(|e| PublishError::fatal(format!("invalid upload part: {e}")))?;
        let form = Form::new()
            .text("description", req.description)
            .part("video", video);

        tracing::debug!("POST {} ({} bytes)", self.endpoint, len);
        let resp = self
            .http
            .post(&self.endpoint)
            .header(COOKIE, req.credential.cookie_header())
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Map a non-2xx response into a publish error.
pub fn classify_status(status: StatusCode, body: &str) -> PublishError {
    let message = server_message(status, body);
    match status {
        // The session is gone: every later upload would fail the same way.
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PublishError::fatal(format!("session rejected: {message}"))
        }
        _ => PublishError::rejected(message),
    }
}

fn classify_transport(e: reqwest::Error) -> PublishError {
    if e.is_timeout() {
        PublishError::rejected("upload timed out")
    } else if e.is_connect() || e.is_builder() {
        PublishError::fatal(format!("upload endpoint unreachable: {e}"))
    } else {
        PublishError::rejected(format!("upload failed: {e}"))
    }
}

/// Prefer a `message`/`error` field from a JSON body, then the raw body.
fn server_message(status: StatusCode, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "status_msg"] {
            if let Some(s) = v.get(key).and_then(|m| m.as_str())
                && !s.is_empty()
            {
                return s.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP status {status}")
    } else {
        trimmed.chars().take(200).collect()
    }
}

fn mime_for(path: &std::path::Path) -> &'static str {
    if !discovery::is_video(path) {
        return "application/octet-stream";
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}
