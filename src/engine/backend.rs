use crate::error::{ErrorBody, FailureCause};
use crate::model::{RunRequest, RunResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// The Backend Agent Service collaborator: one request in, one result or failure out.
///
/// Implementations must be cancel-safe: the controller drops the returned future when
/// the run's abort signal fires first.
#[async_trait]
pub trait AgentBackend: Send + Sync + std::fmt::Debug {
    async fn run(&self, request: &RunRequest) -> Result<RunResult, FailureCause>;

    /// Base reference reported in network error messages.
    fn base_reference(&self) -> String;
}

/// HTTP client for `POST {base}/agent/run`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
    endpoint: Url,
}

impl HttpBackend {
    pub fn new(base_url: &Url, user_agent: &str) -> Result<Self> {
        let base = base_url.as_str().trim_end_matches('/').to_string();
        let endpoint = Url::parse(&format!("{base}/agent/run"))
            .with_context(|| format!("invalid backend URL {base}"))?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AgentBackend for HttpBackend {
    async fn run(&self, request: &RunRequest) -> Result<RunResult, FailureCause> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| transport_cause(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_cause(&e))?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "backend responded");

        if !status.is_success() {
            return Err(FailureCause::HttpStatus {
                status: status.as_u16(),
                body: serde_json::from_str::<ErrorBody>(&body).ok(),
            });
        }

        parse_run_result(&body)
    }

    fn base_reference(&self) -> String {
        self.base.clone()
    }
}

/// Parse a success body into a [`RunResult`], checking identity fields first.
pub fn parse_run_result(body: &str) -> Result<RunResult, FailureCause> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| FailureCause::Parse(e.to_string()))?;

    let has_identity = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };
    if !has_identity("runId") || !has_identity("status") {
        return Err(FailureCause::MissingIdentity);
    }

    let result: RunResult =
        serde_json::from_value(value).map_err(|e| FailureCause::Parse(e.to_string()))?;
    if let Some(confidence) = result.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(FailureCause::Parse(format!(
                "confidence {confidence} is outside [0, 1]"
            )));
        }
    }
    Ok(result)
}

fn transport_cause(err: &reqwest::Error) -> FailureCause {
    let detail = error_chain(err);
    if err.is_decode() {
        FailureCause::Parse(detail)
    } else if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        FailureCause::Connect(detail)
    } else {
        FailureCause::Other(detail)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
