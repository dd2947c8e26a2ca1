//! OpenAI implementation of the Extractor trait.
//!
//! A reference implementation using the chat completions API with a strict
//! JSON-schema response format, so the service can only answer in the
//! [`ExtractionResponse`] shape.
//!
//! # Example
//!
//! ```rust,ignore
//! use extraction::ai::OpenAI;
//!
//! let extractor = OpenAI::from_env()?.with_model("gpt-4o-mini");
//! let response = extractor.extract(&document).await?;
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::schema::openai_schema;
use crate::error::{ExtractionError, Result};
use crate::pipeline::prompts::{format_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use crate::traits::extractor::{ExtractionResponse, Extractor};
use crate::types::document::Document;

/// OpenAI-based extractor.
#[derive(Clone)]
pub struct OpenAI {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAI {
    /// Create a new extractor with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ExtractionError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set the chat model (default: gpt-4o-mini).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate_structured(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct ChatMessage {
            role: String,
            content: String,
        }

        #[derive(Serialize)]
        struct JsonSchemaFormat {
            name: String,
            strict: bool,
            schema: serde_json::Value,
        }

        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            format_type: String,
            json_schema: JsonSchemaFormat,
        }

        #[derive(Serialize)]
        struct StructuredRequest {
            model: String,
            messages: Vec<ChatMessage>,
            temperature: f32,
            response_format: ResponseFormat,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let request = StructuredRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            // Deterministic requests for identical documents
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "extraction_response".to_string(),
                    strict: true,
                    schema: openai_schema::<ExtractionResponse>(),
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                ExtractionError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(ExtractionError::Unavailable(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::InvalidResponse {
                reason: "no choices in OpenAI response".to_string(),
            })
    }
}

#[async_trait]
impl Extractor for OpenAI {
    async fn extract(&self, document: &Document) -> Result<ExtractionResponse> {
        let prompt = format_extraction_prompt(document);
        let raw = self
            .generate_structured(EXTRACTION_SYSTEM_PROMPT, &prompt)
            .await?;

        let response: ExtractionResponse =
            serde_json::from_str(&raw).map_err(|e| ExtractionError::InvalidResponse {
                reason: format!("extraction payload did not match schema: {}", e),
            })?;

        debug!(
            document = %document.provider_message_id,
            entities = response.entities.len(),
            relationships = response.relationships.len(),
            "extraction complete"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides() {
        let extractor = OpenAI::new("sk-test")
            .with_model("gpt-4o")
            .with_base_url("http://localhost:1234/v1");
        assert_eq!(extractor.model(), "gpt-4o");
        assert_eq!(extractor.base_url, "http://localhost:1234/v1");
    }
}
