//! Chat client for a local OpenAI-compatible server (LM Studio)
//!
//! One POST per prompt, no retries. [`ChatClient::reply`] folds every
//! failure into a printable string so callers can show it as-is.

use std::path::Path;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ChatConfig;

/// Reply used when the server answers without any choice
pub const NO_CHOICES_REPLY: &str = "[Erreur] Réponse inattendue du serveur.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read system prompt: {0}")]
    PromptFile(#[from] std::io::Error),

    #[error("Failed to parse system prompt: {0}")]
    PromptParse(#[from] serde_json::Error),

    #[error("Server returned no choices")]
    NoChoices,
}

impl ChatError {
    /// Render the error the way the chat console prints it
    pub fn to_reply(&self) -> String {
        match self {
            ChatError::HttpError(e) if !e.is_decode() => format!("[Erreur HTTP] {}", e),
            ChatError::NoChoices => NO_CHOICES_REPLY.to_string(),
            other => format!("[Erreur inattendue] {}", other),
        }
    }
}

/// Load the system prompt from a JSON file's `content` key
pub fn load_system_prompt(path: &Path) -> Result<String, ChatError> {
    #[derive(Deserialize)]
    struct PromptFile {
        #[serde(default)]
        content: String,
    }

    let text = std::fs::read_to_string(path)?;
    let file: PromptFile = serde_json::from_str(&text)?;
    Ok(file.content)
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Chat completion client
pub struct ChatClient {
    client: Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: String::new(),
        }
    }

    /// Build a client, reading the system prompt file if one is configured
    pub fn from_config(config: &ChatConfig) -> Result<Self, ChatError> {
        let mut client = Self::new(config);
        if let Some(path) = &config.system_prompt_file {
            client.system_prompt = load_system_prompt(path)?;
            tracing::info!("Loaded system prompt from {}", path.display());
        }
        Ok(client)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Send a prompt and return the completion text or a printable error
    pub async fn reply(&self, prompt: &str) -> String {
        match self.complete(prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Chat request failed: {}", e);
                e.to_reply()
            }
        }
    }

    /// Send a prompt and return the first choice's content
    pub async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: self.full_prompt(prompt),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let resp = resp.error_for_status()?;

        let text = resp.text().await?;
        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|e| ChatError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ChatError::NoChoices)
    }

    // Private helpers

    fn full_prompt(&self, prompt: &str) -> String {
        if self.system_prompt.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", self.system_prompt, prompt)
        }
    }
}
