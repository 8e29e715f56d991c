use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{Error, Result, Service};
use crate::http::{join_url, send_json};
use crate::models::ChatMessage;

/// Generates text from a chat transcript.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Non-streaming chat client for OpenAI-compatible and Ollama endpoints.
#[derive(Clone)]
pub struct HttpCompletion {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpCompletion {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Result<Self> {
        match config.provider.as_str() {
            "openai" if config.api_key.is_none() => Err(Error::MissingCredential {
                service: Service::Completion,
                what: "OPENAI_API_KEY",
            }),
            "openai" | "ollama" => Ok(Self { client, config }),
            other => Err(Error::invalid_input(format!("unknown LLM provider: {other}"))),
        }
    }
}

#[async_trait]
impl CompletionModel for HttpCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let content = match self.config.provider.as_str() {
            "ollama" => call_ollama(&self.client, &self.config, messages).await?,
            _ => call_openai(&self.client, &self.config, messages).await?,
        };
        if content.trim().is_empty() {
            return Err(Error::Decode {
                service: Service::Completion,
                message: "empty completion".to_string(),
            });
        }
        Ok(content)
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

async fn call_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: &[ChatMessage],
) -> Result<String> {
    let url = join_url(&config.base_url, "/api/chat");

    let req = OllamaChatRequest {
        model: &config.chat_model,
        messages,
        stream: false,
        options: OllamaOptions {
            temperature: config.temperature,
        },
    };

    let body: OllamaChatResponse =
        send_json(Service::Completion, client.post(&url).json(&req)).await?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

async fn call_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: &[ChatMessage],
) -> Result<String> {
    let url = join_url(&config.base_url, "/v1/chat/completions");
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiChatRequest {
        model: &config.chat_model,
        messages,
        temperature: config.temperature,
    };

    let body: OpenAiChatResponse = send_json(
        Service::Completion,
        client.post(&url).bearer_auth(api_key).json(&req),
    )
    .await?;

    Ok(first_choice_content(body))
}

fn first_choice_content(body: OpenAiChatResponse) -> String {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default()
}
