//! Gemini client, using the generate-content request shape.
//!
//! The image travels as a provider-native `inline_data` part next to the
//! prompt text; auth is an API-key query parameter. The response envelope
//! (`candidates[0].content.parts[0].text`) is decoded once into typed
//! structs before any shared logic runs.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{interpret_error_status, map_transport_error, ProviderClient, ProviderError};
use crate::config::{ProviderConfig, ProviderId};
use crate::pipeline::preprocess::PreparedImage;
use crate::pipeline::prompt::ANALYSIS_SYSTEM_PROMPT;

pub struct GeminiClient {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }
}

/// `{base}/{model}:generateContent?key={key}`
fn request_url(endpoint: &str, model: &str, api_key: &str) -> String {
    format!(
        "{}/{model}:generateContent?key={api_key}",
        endpoint.trim_end_matches('/')
    )
}

// ──────────────────────────────────────────────
// Request body
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: SystemInstruction<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
enum Part<'a> {
    #[serde(rename = "text")]
    Text(&'a str),
    #[serde(rename = "inline_data")]
    InlineData(InlineData),
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

fn build_request_body<'a>(
    config: &'a ProviderConfig,
    prompt: &'a str,
    jpeg_bytes: &[u8],
) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::Text(prompt),
                Part::InlineData(InlineData {
                    mime_type: "image/jpeg",
                    data: base64::engine::general_purpose::STANDARD.encode(jpeg_bytes),
                }),
            ],
        }],
        system_instruction: SystemInstruction {
            parts: vec![Part::Text(ANALYSIS_SYSTEM_PROMPT)],
        },
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

// ──────────────────────────────────────────────
// Response envelope
// ──────────────────────────────────────────────

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Extract the first candidate's first text part from a 200 response body.
fn extract_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::ResponseDecode(e.to_string()))?;
    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| ProviderError::Api {
            message: "response contained no completion text".into(),
        })
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn analyze(
        &self,
        image: &PreparedImage,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let url = request_url(
            &self.config.endpoint,
            &self.config.model_name,
            &self.config.auth_token,
        );
        let body = build_request_body(&self.config, prompt, &image.jpeg_bytes);

        let response = self
            .client
            .post(&url)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig::gemini("gm-key".into())
    }

    #[test]
    fn url_embeds_model_and_key() {
        let url = request_url(
            "https://generativelanguage.googleapis.com/v1beta/models",
            "gemini-1.5-flash",
            "gm-key",
        );
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=gm-key"
        );
    }

    #[test]
    fn url_tolerates_trailing_slash() {
        let url = request_url("https://example.test/models/", "m", "k");
        assert_eq!(url, "https://example.test/models/m:generateContent?key=k");
    }

    #[test]
    fn request_body_uses_inline_data_part() {
        let cfg = test_config();
        let json = serde_json::to_value(build_request_body(&cfg, "check this", &[1, 2, 3])).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "check this");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/jpeg"
        );
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["data"],
            "AQID"
        );
        assert!(json["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .len()
            > 0);
        assert_eq!(json["generation_config"]["max_output_tokens"], 2048);
    }

    #[test]
    fn extract_completion_reads_first_text_part() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "SEVERITY: Moderate"}], "role": "model"}}
            ]
        }"#;
        assert_eq!(extract_completion(body).unwrap(), "SEVERITY: Moderate");
    }

    #[test]
    fn extract_completion_skips_non_text_parts() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"functionCall": {}}, {"text": "report"}]}}
            ]
        }"#;
        assert_eq!(extract_completion(body).unwrap(), "report");
    }

    #[test]
    fn extract_completion_no_candidates_is_api_error() {
        let err = extract_completion(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Api { .. }));
        // Safety-blocked responses come back with no candidates at all.
        let err = extract_completion(r#"{}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Api { .. }));
    }

    #[test]
    fn extract_completion_bad_envelope_is_decode_error() {
        let err = extract_completion("not json").unwrap_err();
        assert!(matches!(err, ProviderError::ResponseDecode(_)));
    }

    #[test]
    fn client_reports_its_id() {
        let client = GeminiClient::new(test_config());
        assert_eq!(client.id(), ProviderId::Gemini);
    }
}
