use std::time::Duration;

use async_trait::async_trait;
use popgate_contracts::{AnalyticsOutcome, AnalyticsQuery, OutputSink};
use serde::Deserialize;

#[derive(Debug)]
pub enum EngineError {
    Timeout,
    Http(reqwest::Error),
    BadStatus(reqwest::StatusCode),
    InvalidResponse(reqwest::Error),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Timeout => "EngineTimeout",
            EngineError::Http(_) => "EngineHttpError",
            EngineError::BadStatus(_) => "EngineBadStatus",
            EngineError::InvalidResponse(_) => "EngineInvalidResponse",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Timeout => write!(f, "analytics engine request timed out"),
            EngineError::Http(err) => write!(f, "analytics engine HTTP error: {}", err),
            EngineError::BadStatus(status) => {
                write!(f, "analytics engine returned status {}", status)
            }
            EngineError::InvalidResponse(err) => {
                write!(f, "analytics engine returned invalid JSON response: {}", err)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Http(err) | EngineError::InvalidResponse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::Http(value)
        }
    }
}

/// Executes an analytics query and writes its tables into
/// `query.output_sink`. The returned outcome carries status only.
#[async_trait]
pub trait AnalyticsEngine: Send + Sync {
    async fn execute(&self, query: &mut AnalyticsQuery) -> Result<AnalyticsOutcome, EngineError>;
}

#[derive(Deserialize)]
struct ExportResponse {
    succeeded: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    output: OutputSink,
}

/// Engine reached over HTTP at `POST {base_url}/v1/export`.
#[derive(Clone)]
pub struct RemoteEngine {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteEngine {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self { base_url, http })
    }

    fn export_url(&self) -> String {
        format!("{}/v1/export", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AnalyticsEngine for RemoteEngine {
    async fn execute(&self, query: &mut AnalyticsQuery) -> Result<AnalyticsOutcome, EngineError> {
        let resp = self.http.post(self.export_url()).json(&*query).send().await?;

        if !resp.status().is_success() {
            return Err(EngineError::BadStatus(resp.status()));
        }

        let decoded = resp
            .json::<ExportResponse>()
            .await
            .map_err(EngineError::InvalidResponse)?;

        query.output_sink.merge(decoded.output);

        Ok(AnalyticsOutcome {
            succeeded: decoded.succeeded,
            message: decoded.message,
        })
    }
}
