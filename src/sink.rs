use crate::stream::PushRequest;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Loki returned status {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Delivery boundary for one formatted batch. One push per call; retry policy
/// belongs to the caller (the run loop does not retry at all).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, batch: &PushRequest) -> Result<(), SinkError>;
}

/// Pushes batches to the Loki push API over HTTP.
pub struct LokiClient {
    url: String,
    client: reqwest::Client,
}

impl LokiClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl EventSink for LokiClient {
    async fn send(&self, batch: &PushRequest) -> Result<(), SinkError> {
        let response = self.client.post(&self.url).json(batch).send().await?;

        // Loki acknowledges an accepted push with an empty 204
        if response.status() != StatusCode::NO_CONTENT {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, detail });
        }

        Ok(())
    }
}
