//! JSON-over-HTTP plumbing shared by the model backends.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::deadline::Deadline;
use crate::error::{RagError, Result};

/// Default upper bound for one HTTP request.
pub(crate) const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// A `reqwest` client bound to one base URL.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
    provider: &'static str,
    base_url: String,
    api_key: Option<String>,
    call_timeout: Duration,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl HttpClient {
    pub(crate) fn new(provider: &'static str, base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RagError::config(format!(
                "{provider} base URL must start with http:// or https://, got '{base_url}'"
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RagError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.to_string(),
            api_key: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub(crate) fn set_api_key(&mut self, api_key: impl Into<String>) {
        let api_key = api_key.into();
        self.api_key = (!api_key.is_empty()).then_some(api_key);
    }

    pub(crate) fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = timeout;
    }

    /// POST `body` to `path` and decode the JSON reply.
    ///
    /// The request timeout is the smaller of the call timeout and what is
    /// left of `deadline`, and the whole exchange runs inside
    /// [`Deadline::run`] so it is dropped once the deadline passes.
    pub(crate) async fn post<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        deadline: &Deadline,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned + Send,
    {
        let url = format!("{}{path}", self.base_url);
        let operation = format!("{} {path}", self.provider);

        deadline
            .run(&operation, async {
                let mut request =
                    self.client.post(&url).timeout(deadline.cap(self.call_timeout)).json(body);
                if let Some(api_key) = &self.api_key {
                    request = request.bearer_auth(api_key);
                }

                debug!(provider = self.provider, %url, "sending request");
                let response = request.send().await.map_err(|e| self.classify(e, deadline))?;
                let status = response.status();
                let text = response.text().await.map_err(|e| self.classify(e, deadline))?;

                if !status.is_success() {
                    error!(provider = self.provider, %status, "API error");
                    return Err(self.status_error(status, &text));
                }

                serde_json::from_str(&text).map_err(|e| {
                    error!(provider = self.provider, error = %e, "failed to parse response");
                    RagError::UpstreamError {
                        provider: self.provider.to_string(),
                        message: format!("failed to parse response: {e}"),
                    }
                })
            })
            .await
    }

    fn classify(&self, e: reqwest::Error, deadline: &Deadline) -> RagError {
        error!(provider = self.provider, error = %e, "request failed");
        if e.is_timeout() && deadline.is_expired() {
            return RagError::deadline(format!("{} request", self.provider));
        }
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            RagError::UpstreamUnavailable {
                provider: self.provider.to_string(),
                message: format!("request failed: {e}"),
            }
        } else {
            RagError::UpstreamError {
                provider: self.provider.to_string(),
                message: format!("request failed: {e}"),
            }
        }
    }

    fn status_error(&self, status: StatusCode, body: &str) -> RagError {
        let detail = serde_json::from_str::<ErrorResponse>(body).ok().map(|r| r.error);
        let provider = self.provider.to_string();

        if status == StatusCode::BAD_REQUEST
            && detail.as_ref().and_then(|d| d.code.as_deref()) == Some("content_policy_violation")
        {
            let message = detail.map(|d| d.message).unwrap_or_default();
            return RagError::UpstreamRefused { provider, message };
        }

        let detail = detail.map(|d| d.message).filter(|m| !m.is_empty());
        let message = format!("API returned {status}: {}", detail.as_deref().unwrap_or(body));
        match status {
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => RagError::UpstreamUnavailable { provider, message },
            _ => RagError::UpstreamError { provider, message },
        }
    }
}

/// Reject an empty model name.
pub(crate) fn model_name(provider: &str, model: impl Into<String>) -> Result<String> {
    let model = model.into();
    if model.trim().is_empty() {
        return Err(RagError::config(format!("{provider} model name must not be empty")));
    }
    Ok(model)
}

/// Fail with [`RagError::UpstreamError`] unless a batch reply has one vector per input.
pub(crate) fn expect_batch_len(provider: &str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        return Ok(());
    }
    Err(RagError::UpstreamError {
        provider: provider.to_string(),
        message: format!("expected {expected} embeddings, got {got}"),
    })
}

/// Fail with [`RagError::UpstreamError`] if any returned vector is empty.
pub(crate) fn expect_non_empty(provider: &str, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.iter().any(Vec::is_empty) {
        return Err(RagError::UpstreamError {
            provider: provider.to_string(),
            message: "response contained an empty embedding".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn client() -> HttpClient {
        HttpClient::new("test", "http://localhost:1/").unwrap()
    }

    #[test]
    fn base_url_is_normalized_and_checked() {
        assert_eq!(client().base_url, "http://localhost:1");
        let err = HttpClient::new("test", "localhost:11434").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn transient_statuses_are_unavailable() {
        for status in [408, 429, 502, 503, 504] {
            let status = StatusCode::from_u16(status).unwrap();
            assert_eq!(client().status_error(status, "").kind(), ErrorKind::UpstreamUnavailable);
        }
        for status in [400, 401, 404, 500] {
            let status = StatusCode::from_u16(status).unwrap();
            assert_eq!(client().status_error(status, "oops").kind(), ErrorKind::UpstreamError);
        }
    }

    #[test]
    fn content_policy_violation_is_refusal() {
        let body = r#"{"error":{"message":"flagged","code":"content_policy_violation"}}"#;
        let err = client().status_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind(), ErrorKind::UpstreamRefused);
        assert!(err.to_string().contains("flagged"));
    }

    #[test]
    fn error_detail_is_surfaced() {
        let body = r#"{"error":{"message":"model not found"}}"#;
        let err = client().status_error(StatusCode::NOT_FOUND, body);
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn batch_length_mismatch_is_upstream_error() {
        assert!(expect_batch_len("test", 2, 2).is_ok());
        assert_eq!(expect_batch_len("test", 2, 1).unwrap_err().kind(), ErrorKind::UpstreamError);
        assert!(expect_non_empty("test", &[vec![], vec![1.0]]).is_err());
    }
}
