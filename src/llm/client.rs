use crate::error::{ImportError, Result};
use crate::llm::types::*;
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Raw text returned by a `generateContent` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub finish_reason: Option<String>,
}

impl Generation {
    /// The model stopped on its output token limit; the text is likely cut off.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("MAX_TOKENS")
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn generate_content(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<serde_json::Value>,
    ) -> Result<Generation> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::user_text(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
                temperature: Some(0.0),
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let body = res.text().await?;
            return Err(ImportError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateContentResponse = res.json().await?;
        let (text, finish_reason) = body.first_text().ok_or_else(|| ImportError::ServiceError {
            status: status.as_u16(),
            body: "response contained no candidate text".to_string(),
        })?;

        Ok(Generation {
            text,
            finish_reason,
        })
    }
}
