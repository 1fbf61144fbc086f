//! Google Gemini `generateContent` client

use super::{ChatClient, DialogueMessage, DialogueRole};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini chat client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
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

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(api_key: String, model: String, base_url: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    fn build_request<'a>(
        history: &'a [DialogueMessage],
        text: &'a str,
        system_instruction: &'a str,
    ) -> GenerateRequest<'a> {
        let mut contents: Vec<Content<'a>> = history
            .iter()
            .map(|message| Content {
                role: Some(match message.role {
                    DialogueRole::User => "user",
                    DialogueRole::Model => "model",
                }),
                parts: vec![Part { text: &message.text }],
            })
            .collect();

        contents.push(Content {
            role: Some("user"),
            parts: vec![Part { text }],
        });

        let system_instruction = (!system_instruction.trim().is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: system_instruction,
            }],
        });

        GenerateRequest {
            system_instruction,
            contents,
        }
    }

    fn extract_text(response: GenerateResponse) -> Result<String> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AppError::ModelError {
                message: format!("Response blocked ({})", reason),
            });
        }

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AppError::ModelError {
                message: "Empty response".to_string(),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl ChatClient for GeminiClient {
    async fn complete(
        &self,
        history: &[DialogueMessage],
        text: &str,
        system_instruction: &str,
    ) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = Self::build_request(history, text, system_instruction);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::ModelTimeout {
                        timeout_ms: self.timeout_secs * 1000,
                    }
                } else {
                    AppError::ModelError {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(AppError::ModelError {
                message: format!("API error {}: {}", status, excerpt),
            });
        }

        let result: GenerateResponse = response.json().await.map_err(|e| AppError::ModelError {
            message: format!("Failed to parse response: {}", e),
        })?;

        Self::extract_text(result)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let history = vec![
            DialogueMessage {
                role: DialogueRole::User,
                text: "hola".to_string(),
            },
            DialogueMessage {
                role: DialogueRole::Model,
                text: "¡hola!".to_string(),
            },
        ];
        let request = GeminiClient::build_request(&history, "¿qué tal?", "Reply in kind.");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Reply in kind.");
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["role"], "user");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "¿qué tal?");
    }

    #[test]
    fn test_request_without_instruction() {
        let request = GeminiClient::build_request(&[], "hi", "  ");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hola, " }, { "text": "amigo" }] } }]
        }))
        .unwrap();
        assert_eq!(GeminiClient::extract_text(response).unwrap(), "Hola, amigo");
    }

    #[test]
    fn test_extract_text_blocked_or_empty() {
        let blocked: GenerateResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = GeminiClient::extract_text(blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let empty: GenerateResponse =
            serde_json::from_value(serde_json::json!({ "candidates": [] })).unwrap();
        assert!(matches!(
            GeminiClient::extract_text(empty),
            Err(AppError::ModelError { .. })
        ));
    }
}
