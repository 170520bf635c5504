use crate::error::ProviderError;
use crate::models::Prompt;
use crate::provider::{ensure_success, malformed, ProviderConfig};
use crate::traits::Completion;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, PartialEq)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint. One
/// request per call; failures are returned, never retried.
pub struct OpenAiChatCompletion {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiChatCompletion {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }
}

#[async_trait]
impl Completion for OpenAiChatCompletion {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let api_key = self.config.credentials.resolve()?;
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: prompt_messages(prompt),
            temperature: self.config.temperature,
        };

        debug!(
            model = %self.config.chat_model,
            messages = request.messages.len(),
            "requesting chat completion"
        );
        let response = self
            .client
            .post(self.config.endpoint("chat/completions")?)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let parsed: ChatResponse = ensure_success(response).await?.json().await?;
        first_choice(parsed)
    }
}

fn prompt_messages(prompt: &Prompt) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prompt.history.len() * 2 + 2);

    if !prompt.system.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: prompt.system.clone(),
        });
    }

    for turn in &prompt.history {
        messages.push(ChatMessage {
            role: "user",
            content: turn.question.clone(),
        });
        messages.push(ChatMessage {
            role: "assistant",
            content: turn.answer.clone(),
        });
    }

    messages.push(ChatMessage {
        role: "user",
        content: prompt.user.clone(),
    });

    messages
}

fn first_choice(response: ChatResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| malformed("completion response had no message content"))
}
