use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Per-call generation settings. `None` fields use the provider's defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    /// Low-temperature settings used for planning and structured extraction.
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.1),
            max_tokens: None,
        }
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the raw assistant text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::EmbedUnsupported` unless the provider overrides it.
    fn embed(&self, _text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send {
        let provider = self.name();
        async move { Err(LlmError::EmbedUnsupported { provider }) }
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Assemble `system + history + user` and call the provider once.
///
/// Returns the unprocessed response text; parsing is the caller's job.
///
/// # Errors
///
/// Propagates the provider error unchanged.
pub async fn invoke<P: LlmProvider + ?Sized>(
    provider: &P,
    system_prompt: &str,
    history: &[Message],
    user_prompt: &str,
    options: &ChatOptions,
) -> Result<String, LlmError> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !system_prompt.is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.extend_from_slice(history);
    messages.push(Message::user(user_prompt));
    provider.chat(&messages, options).await
}
