//! Thin wrapper around reqwest for the server's getState endpoint.

use reqwest::{Client, StatusCode};
use shared::{StateResponse, STATE_PATH};
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("state transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("state endpoint returned {0}")]
    Upstream(StatusCode),
    #[error("state response decode error: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Clone)]
pub struct StateClient {
    http: Client,
    pub base_url: String,
}

impl StateClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BootstrapError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(BootstrapError::Transport)?;
        Ok(Self {
            http,
            base_url: normalize(base_url.into()),
        })
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, STATE_PATH)
    }

    /// Fetches the encoded state of every known player.
    pub async fn fetch_state(&self) -> Result<String, BootstrapError> {
        let res = self
            .http
            .get(self.url())
            .send()
            .await
            .map_err(BootstrapError::Transport)?;

        let status = res.status();
        if !status.is_success() {
            return Err(BootstrapError::Upstream(status));
        }

        let body = res
            .json::<StateResponse>()
            .await
            .map_err(BootstrapError::Decode)?;
        Ok(body.state)
    }
}

fn normalize(base_url: String) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
