use serde_json::{Value, json};
use thiserror::Error;

use crate::http::{HttpError, HttpRequest, RetryPolicy, send_with_retries};

#[derive(Debug, Error)]
pub(crate) enum BackendError {
    #[error("no auth token found, please log in again")]
    MissingToken,
    #[error("unauthorized: session expired or token rejected")]
    Unauthorized,
    #[error(transparent)]
    Http(HttpError),
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl From<HttpError> for BackendError {
    fn from(err: HttpError) -> Self {
        if err.status() == Some(401) {
            Self::Unauthorized
        } else {
            Self::Http(err)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Module {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) serial_number: i64,
    pub(crate) heading: String,
    pub(crate) content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Video {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) url: String,
    pub(crate) description: Option<String>,
    pub(crate) duration: f64,
    pub(crate) module_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VideoProgress {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) video_id: String,
    /// Percent of the module video watched, as reported by the backend.
    pub(crate) last_position: f64,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<String>,
    pub(crate) video: Video,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ModuleSnapshot {
    pub(crate) module: Module,
    pub(crate) progress: VideoProgress,
}

#[derive(Debug, Clone)]
pub(crate) struct BackendClient {
    base_url: String,
    policy: RetryPolicy,
}

impl BackendClient {
    pub(crate) fn new(base_url: &str) -> Self {
        Self::with_policy(base_url, RetryPolicy::default())
    }

    pub(crate) fn with_policy(base_url: &str, policy: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn login(&self, email: &str, password: &str) -> Result<String, BackendError> {
        let url = self.endpoint("/api/login");
        let body = json!({ "email": email, "password": password }).to_string();
        let request = HttpRequest::post_json(&url, &body);
        let raw = send_with_retries(&request, &self.policy.single_attempt())?;
        parse_login_token(&raw)
    }

    pub(crate) fn current_module(&self, token: &str) -> Result<ModuleSnapshot, BackendError> {
        let url = self.endpoint("/api/current-module");
        let request = HttpRequest::get(&url).bearer(token);
        let raw = send_with_retries(&request, &self.policy)?;
        let snapshot = parse_module_snapshot(&raw, "currentModule")?;
        log_snapshot("current", &snapshot);
        Ok(snapshot)
    }

    pub(crate) fn next_module(
        &self,
        token: &str,
        current_serial: i64,
    ) -> Result<ModuleSnapshot, BackendError> {
        let url = self.endpoint("/api/next-module");
        let query = vec![(
            "currentSerialNumber".to_string(),
            current_serial.to_string(),
        )];
        let request = HttpRequest::get(&url).bearer(token).query(&query);
        let raw = send_with_retries(&request, &self.policy)?;
        let snapshot = parse_module_snapshot(&raw, "nextModule")?;
        log_snapshot("next", &snapshot);
        Ok(snapshot)
    }
}

fn log_snapshot(kind: &str, snapshot: &ModuleSnapshot) {
    let progress = &snapshot.progress;
    tracing::debug!(
        kind,
        module_id = %snapshot.module.id,
        serial = snapshot.module.serial_number,
        progress_id = %progress.id,
        user_id = %progress.user_id,
        video_id = %progress.video_id,
        video = %progress.video.id,
        video_module = %progress.video.module_id,
        "fetched module snapshot"
    );
}

pub(crate) fn parse_login_token(raw: &str) -> Result<String, BackendError> {
    let parsed = parse_json(raw)?;
    parsed
        .get("token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BackendError::Decode("login response has no token".to_string()))
}

pub(crate) fn parse_module_snapshot(
    raw: &str,
    module_field: &str,
) -> Result<ModuleSnapshot, BackendError> {
    let parsed = parse_json(raw)?;
    let module = parsed
        .get(module_field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| BackendError::Decode(format!("missing `{module_field}`")))
        .and_then(parse_module)?;
    let progress = parsed
        .get("videoProgress")
        .filter(|value| !value.is_null())
        .ok_or_else(|| BackendError::Decode("missing `videoProgress`".to_string()))
        .and_then(parse_video_progress)?;
    Ok(ModuleSnapshot { module, progress })
}

fn parse_json(raw: &str) -> Result<Value, BackendError> {
    serde_json::from_str(raw).map_err(|err| BackendError::Decode(err.to_string()))
}

fn parse_module(value: &Value) -> Result<Module, BackendError> {
    Ok(Module {
        id: required_str(value, "id")?,
        name: optional_str(value, "name").unwrap_or_default(),
        serial_number: value
            .get("serialNumber")
            .and_then(Value::as_i64)
            .ok_or_else(|| BackendError::Decode("module has no `serialNumber`".to_string()))?,
        heading: optional_str(value, "heading").unwrap_or_default(),
        content: optional_str(value, "content").unwrap_or_default(),
    })
}

fn parse_video(value: &Value) -> Result<Video, BackendError> {
    Ok(Video {
        id: required_str(value, "id")?,
        title: optional_str(value, "title").unwrap_or_default(),
        url: optional_str(value, "url").unwrap_or_default(),
        description: optional_str(value, "description"),
        duration: value.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
        module_id: optional_str(value, "moduleId").unwrap_or_default(),
    })
}

fn parse_video_progress(value: &Value) -> Result<VideoProgress, BackendError> {
    let video = value
        .get("video")
        .ok_or_else(|| BackendError::Decode("progress has no `video`".to_string()))
        .and_then(parse_video)?;
    Ok(VideoProgress {
        id: optional_str(value, "id").unwrap_or_default(),
        user_id: optional_str(value, "userId").unwrap_or_default(),
        video_id: optional_str(value, "videoId").unwrap_or_else(|| video.id.clone()),
        last_position: value
            .get("lastPosition")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        completed: value
            .get("completed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        completed_at: optional_str(value, "completedAt"),
        video,
    })
}

fn required_str(value: &Value, field: &str) -> Result<String, BackendError> {
    optional_str(value, field).ok_or_else(|| BackendError::Decode(format!("missing `{field}`")))
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
