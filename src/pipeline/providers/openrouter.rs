//! OpenRouter client, using the chat-completions request shape.
//!
//! Multimodal user message carries the prompt text plus the image as a
//! base64 `data:` URI; auth is a bearer header. The response envelope is
//! decoded once into typed structs (`choices[0].message.content`), never
//! navigated ad hoc.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{interpret_error_status, map_transport_error, ProviderClient, ProviderError};
use crate::config::{ProviderConfig, ProviderId};
use crate::pipeline::preprocess::PreparedImage;
use crate::pipeline::prompt::ANALYSIS_SYSTEM_PROMPT;

pub struct OpenRouterClient {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }
}

// ──────────────────────────────────────────────
// Request body
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart<'a> {
    #[serde(rename = "text")]
    Text { text: &'a str },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

/// Build the chat-completions body for one analysis call.
fn build_request_body<'a>(
    config: &'a ProviderConfig,
    prompt: &'a str,
    jpeg_bytes: &[u8],
) -> ChatRequest<'a> {
    let data_uri = format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(jpeg_bytes)
    );

    ChatRequest {
        model: &config.model_name,
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(ANALYSIS_SYSTEM_PROMPT),
            },
            ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_uri },
                    },
                ]),
            },
        ],
        max_tokens: config.max_output_tokens,
        temperature: config.temperature,
    }
}

// ──────────────────────────────────────────────
// Response envelope
// ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Extract the first completion's text from a 200 response body.
fn extract_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::ResponseDecode(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| ProviderError::Api {
            message: "response contained no completion choices".into(),
        })
}

#[async_trait]
impl ProviderClient for OpenRouterClient {
    fn id(&self) -> ProviderId {
        ProviderId::OpenRouter
    }

    async fn analyze(
        &self,
        image: &PreparedImage,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let body = build_request_body(&self.config, prompt, &image.jpeg_bytes);

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(interpret_error_status(status.as_u16(), &text));
        }
        extract_completion(&text)
    }
}
