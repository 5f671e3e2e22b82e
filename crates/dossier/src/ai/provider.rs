//! Generative model access. `GenerativeProvider` is the seam the rest of the
//! crate talks to; `MessagesClient` is the HTTP implementation against an
//! Anthropic-style Messages API.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::AiConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API response contained no text content")]
    EmptyResponse,
}

/// A binary attachment sent alongside a prompt.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl MediaPayload {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }
}

#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Sends a single prompt, optionally with an attachment, and returns the
    /// model's text response.
    async fn generate(
        &self,
        prompt: &str,
        media: Option<&MediaPayload>,
    ) -> Result<String, ProviderError>;
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: BlobSource },
    Document { source: BlobSource },
}

#[derive(Serialize)]
struct BlobSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

impl BlobSource {
    fn base64(media_type: &str, data: &[u8]) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: media_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(data),
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct MessagesClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl MessagesClient {
    pub fn new(config: &AiConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn content_for(prompt: &str, media: Option<&MediaPayload>) -> Vec<ContentBlock> {
        let mut content = Vec::with_capacity(2);
        if let Some(media) = media {
            let source = BlobSource::base64(&media.media_type, &media.data);
            if media.media_type.starts_with("image/") {
                content.push(ContentBlock::Image { source });
            } else {
                content.push(ContentBlock::Document { source });
            }
        }
        content.push(ContentBlock::Text {
            text: prompt.to_string(),
        });
        content
    }
}

#[async_trait]
impl GenerativeProvider for MessagesClient {
    async fn generate(
        &self,
        prompt: &str,
        media: Option<&MediaPayload>,
    ) -> Result<String, ProviderError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user".to_string(),
                content: Self::content_for(prompt, media),
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response.json().await?;
        let text: String = body
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}
