//! Streaming chat endpoint client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info};

use super::ingest::{ingest_stream, StreamEvent, StreamIngest};
use super::message::WireMessage;
use crate::config::ChatConfig;
use crate::error::ChatError;

/// Body posted to the chat endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(rename = "siteContent")]
    pub site_content: String,
}

/// Something that can stream an assistant reply as ingest events
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_reply(
        &self,
        request: &ChatRequest,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), ChatError>;
}

/// HTTP client for the hosted chat function
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ChatClient {
    /// Create a client; only connecting is timed out, the stream may run long
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self, ChatError> {
        if config.endpoint.trim().is_empty() {
            return Err(ChatError::NotConfigured);
        }
        Self::new(
            config.endpoint.clone(),
            config.resolve_api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn stream_reply(
        &self,
        request: &ChatRequest,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), ChatError> {
        debug!(
            "Posting {} messages to {}",
            request.messages.len(),
            self.endpoint
        );

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("Chat HTTP error: {}", e);
                return Err(ChatError::Http(e));
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        let stream = Box::pin(response.bytes_stream());
        let mut ingest = StreamIngest::new();
        ingest_stream(stream, &mut ingest, |event| on_event(event))
            .await
            .map_err(|e| {
                error!("Chat stream read failed: {}", e);
                ChatError::Stream(e.to_string())
            })?;

        info!(
            "Chat reply complete ({} chars, {} dropped frames)",
            ingest.text().chars().count(),
            ingest.dropped_frames()
        );
        Ok(())
    }
}
