use std::thread;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpRequest<'a> {
    pub(crate) method: Method,
    pub(crate) url: &'a str,
    pub(crate) bearer: Option<&'a str>,
    pub(crate) query: &'a [(String, String)],
    pub(crate) json_body: Option<&'a str>,
}

impl<'a> HttpRequest<'a> {
    pub(crate) fn get(url: &'a str) -> Self {
        Self {
            method: Method::Get,
            url,
            bearer: None,
            query: &[],
            json_body: None,
        }
    }

    pub(crate) fn post_json(url: &'a str, body: &'a str) -> Self {
        Self {
            method: Method::Post,
            url,
            bearer: None,
            query: &[],
            json_body: Some(body),
        }
    }

    pub(crate) fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    pub(crate) fn query(mut self, query: &'a [(String, String)]) -> Self {
        self.query = query;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn single_attempt(self) -> Self {
        Self {
            attempts: 1,
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(8),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("request failed: HTTP status {status}{}", format_detail(.detail))]
    Status { status: u16, detail: String },
    #[error("request failed after {attempts} attempt(s): HTTP status {status}{}", format_detail(.detail))]
    StatusExhausted {
        status: u16,
        detail: String,
        attempts: usize,
    },
    #[error("request failed after {attempts} attempt(s): transport error: {message}")]
    Transport { message: String, attempts: usize },
    #[error("request failed: response decode failed: {0}")]
    Decode(String),
}

impl HttpError {
    pub(crate) fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::StatusExhausted { status, .. } => Some(*status),
            Self::Transport { .. } | Self::Decode(_) => None,
        }
    }
}

fn format_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" ({detail})")
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

pub(crate) fn send_with_retries(
    request: &HttpRequest<'_>,
    policy: &RetryPolicy,
) -> Result<String, HttpError> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(policy.connect_timeout)
            .timeout_read(policy.read_timeout)
            .timeout_write(policy.read_timeout)
            .build();

        let mut call = agent
            .request(request.method.as_str(), request.url)
            .set("Accept", "application/json");
        if let Some(token) = request.bearer {
            call = call.set("Authorization", &format!("Bearer {token}"));
        }
        for (key, value) in request.query {
            call = call.query(key, value);
        }

        let result = match request.json_body {
            Some(body) => call
                .set("Content-Type", "application/json")
                .send_string(body),
            None => call.call(),
        };

        match result {
            Ok(response) => {
                return response
                    .into_string()
                    .map_err(|err| HttpError::Decode(err.to_string()));
            }
            Err(ureq::Error::Status(status, response)) => {
                let response_body = response.into_string().ok().unwrap_or_default();
                let detail = response_body.trim().chars().take(240).collect::<String>();

                if should_retry_http_status(status) && attempt < attempts {
                    tracing::debug!(status, attempt, url = request.url, "retrying request");
                    thread::sleep(policy.retry_delay);
                    continue;
                }

                if should_retry_http_status(status) && attempts > 1 {
                    return Err(HttpError::StatusExhausted {
                        status,
                        detail,
                        attempts,
                    });
                }

                return Err(HttpError::Status { status, detail });
            }
            Err(ureq::Error::Transport(err)) => {
                if attempt < attempts {
                    tracing::debug!(attempt, url = request.url, "retrying after transport error: {err}");
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(HttpError::Transport {
                    message: err.to_string(),
                    attempts,
                });
            }
        }
    }

    Err(HttpError::Transport {
        message: "exhausted attempts without a concrete error".to_string(),
        attempts,
    })
}
