use crew_core::api::{
    CommandReply, CrewStatus, ErrorDetail, HealthReply, OutputsReply, StartCrewRequest,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum CommandError {
    /// The server answered with a non-2xx status.
    #[error("{}", rejection_text(.status, .detail))]
    Rejected {
        status: u16,
        detail: Option<String>,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl CommandError {
    /// The server's own explanation, when it gave one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            CommandError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

fn rejection_text(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("server returned {status}"),
    }
}

/// JSON client for the crew server's command API.
#[derive(Debug, Clone)]
pub struct CommandClient {
    http: reqwest::Client,
    base: Url,
}

impl CommandClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, CommandError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    pub async fn start_crew(&self, feature_request: &str) -> Result<CommandReply, CommandError> {
        let request = StartCrewRequest {
            feature_request: feature_request.to_string(),
        };
        let response = self
            .http
            .post(self.endpoint("/api/start-crew")?)
            .json(&request)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn stop_crew(&self) -> Result<CommandReply, CommandError> {
        let response = self
            .http
            .post(self.endpoint("/api/stop-crew")?)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn status(&self) -> Result<CrewStatus, CommandError> {
        self.get("/api/status").await
    }

    pub async fn outputs(&self) -> Result<OutputsReply, CommandError> {
        self.get("/api/outputs").await
    }

    pub async fn health(&self) -> Result<HealthReply, CommandError> {
        self.get("/api/health").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CommandError> {
        let response = self.http.get(self.endpoint(path)?).send().await?;
        decode(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, CommandError> {
        Ok(self.base.join(path)?)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CommandError> {
    let status = response.status();
    let url = response.url().clone();
    let body = response.bytes().await?;
    if !status.is_success() {
        debug!("command_rejected: url={url} status={status}");
        return Err(rejection(status, &body));
    }
    serde_json::from_slice(&body).map_err(|err| CommandError::Decode(err.to_string()))
}

fn rejection(status: StatusCode, body: &[u8]) -> CommandError {
    let detail = serde_json::from_slice::<ErrorDetail>(body)
        .ok()
        .and_then(|detail| detail.text());
    CommandError::Rejected {
        status: status.as_u16(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_prefers_server_detail() {
        let err = rejection(
            StatusCode::BAD_REQUEST,
            br#"{"detail":"Crew is already running"}"#,
        );
        assert_eq!(err.detail(), Some("Crew is already running"));
        assert_eq!(err.to_string(), "Crew is already running");

        let bare = rejection(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert_eq!(bare.detail(), None);
        assert_eq!(bare.to_string(), "server returned 502");
    }
}
