//! Remote chat model abstraction
//!
//! Provides a unified interface over hosted chat-completion services:
//! - Google Gemini (`generateContent`)
//! - A deterministic mock for development and tests

mod gemini;

pub use gemini::GeminiClient;

use crate::config::ModelConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Instruction sent with every request unless overridden in configuration
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful multilingual conversational AI assistant.\n\
\n\
Rules:\n\
1. Detect the user's language.\n\
2. Always reply in the SAME language used by the user.\n\
3. Be clear, concise and friendly.\n\
4. If user mixes languages, reply in the dominant language.";

/// Speaker of a dialogue message as the remote model sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueRole {
    User,
    Model,
}

/// One message of dialogue context sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueMessage {
    pub role: DialogueRole,
    pub text: String,
}

/// Trait for chat completion
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Complete `text` given the prior turns and the system instruction
    async fn complete(
        &self,
        history: &[DialogueMessage],
        text: &str,
        system_instruction: &str,
    ) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// One open multi-turn exchange with the model
#[derive(Debug, Clone, Default)]
pub struct DialogueHandle {
    history: Vec<DialogueMessage>,
}

impl DialogueHandle {
    /// Open a dialogue with empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Prior messages this dialogue will send as context
    pub fn history(&self) -> &[DialogueMessage] {
        &self.history
    }

    /// Send `text` and record the exchange. History is only extended on success.
    pub async fn send(
        &mut self,
        client: &dyn ChatClient,
        text: &str,
        system_instruction: &str,
    ) -> Result<String> {
        let started = std::time::Instant::now();
        let result = client.complete(&self.history, text, system_instruction).await;
        crate::metrics::record_model_call(
            started.elapsed().as_secs_f64(),
            client.model_name(),
            result.is_ok(),
        );

        let reply = result?;
        self.history.push(DialogueMessage {
            role: DialogueRole::User,
            text: text.to_string(),
        });
        self.history.push(DialogueMessage {
            role: DialogueRole::Model,
            text: reply.clone(),
        });
        Ok(reply)
    }
}

/// Mock chat client for development and testing
pub struct MockChatClient {
    reply_prefix: String,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self {
            reply_prefix: "echo".to_string(),
        }
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(
        &self,
        history: &[DialogueMessage],
        text: &str,
        _system_instruction: &str,
    ) -> Result<String> {
        Ok(format!("{} #{}: {}", self.reply_prefix, history.len() / 2 + 1, text))
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Create a chat client based on configuration.
///
/// Returns `Ok(None)` when the provider needs a key that is missing, so chat
/// degrades to a placeholder reply. Fails only when `required` is set.
pub fn create_chat_client(config: &ModelConfig) -> Result<Option<Arc<dyn ChatClient>>> {
    match config.provider.as_str() {
        "mock" => Ok(Some(Arc::new(MockChatClient::new()))),
        "gemini" => match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(Some(Arc::new(GeminiClient::new(
                key.to_string(),
                config.model.clone(),
                config.api_base.clone(),
                config.timeout_secs,
            )?))),
            None if config.required => Err(AppError::Configuration {
                message: "model.api_key (or GEMINI_API_KEY) is required".to_string(),
            }),
            None => {
                tracing::warn!("No model API key configured, chat replies are disabled");
                Ok(None)
            }
        },
        other => Err(AppError::Configuration {
            message: format!("Unknown chat provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingClient;

    #[async_trait]
    impl ChatClient for FailingClient {
        async fn complete(&self, _: &[DialogueMessage], _: &str, _: &str) -> Result<String> {
            Err(AppError::ModelTimeout { timeout_ms: 10 })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_dialogue_accumulates_history() {
        let client = MockChatClient::new();
        let mut dialogue = DialogueHandle::new();

        let first = dialogue.send(&client, "hello", DEFAULT_SYSTEM_PROMPT).await.unwrap();
        let second = dialogue.send(&client, "again", DEFAULT_SYSTEM_PROMPT).await.unwrap();

        assert_eq!(first, "echo #1: hello");
        assert_eq!(second, "echo #2: again");
        assert_eq!(dialogue.history().len(), 4);
        assert_eq!(dialogue.history()[0].role, DialogueRole::User);
        assert_eq!(dialogue.history()[3].role, DialogueRole::Model);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_history() {
        let mut dialogue = DialogueHandle::new();
        let result = dialogue.send(&FailingClient, "hello", "").await;

        tokio_test::assert_err!(result);
        assert!(dialogue.history().is_empty());
    }

    #[test]
    fn test_factory_without_key() {
        let config = ModelConfig::default();
        assert!(create_chat_client(&config).unwrap().is_none());

        let required = ModelConfig {
            required: true,
            ..ModelConfig::default()
        };
        assert!(matches!(
            create_chat_client(&required),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_factory_mock_and_unknown() {
        let mock = ModelConfig {
            provider: "mock".to_string(),
            ..ModelConfig::default()
        };
        let client = create_chat_client(&mock).unwrap().unwrap();
        assert_eq!(client.model_name(), "mock-chat");

        let unknown = ModelConfig {
            provider: "carrier-pigeon".to_string(),
            ..ModelConfig::default()
        };
        assert!(create_chat_client(&unknown).is_err());
    }
}
