use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{Error, Result, Service};
use crate::http::{join_url, send_json};

/// Maximum characters to send per text to the embedding API.
/// text-embedding-3-small accepts 8 191 tokens; web prose runs at roughly
/// 4 chars per token, so 8 000 chars stays well inside the window.
const MAX_EMBED_CHARS: usize = 8_000;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Decode {
                service: Service::Embedding,
                message: "no embedding returned".to_string(),
            })
    }
}

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Embedding client for OpenAI-compatible and Ollama endpoints.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Result<Self> {
        match config.provider.as_str() {
            "openai" if config.api_key.is_none() => Err(Error::MissingCredential {
                service: Service::Embedding,
                what: "OPENAI_API_KEY",
            }),
            "openai" | "ollama" => Ok(Self { client, config }),
            other => Err(Error::invalid_input(format!("unknown LLM provider: {other}"))),
        }
    }

    fn check_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        let expected = self.config.embedding_dim;
        match embeddings.iter().find(|e| e.len() != expected) {
            Some(bad) => Err(Error::DimensionMismatch {
                expected,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();

        let embeddings = match self.config.provider.as_str() {
            "ollama" => embed_ollama(&self.client, &self.config, &truncated).await?,
            _ => embed_openai(&self.client, &self.config, &truncated).await?,
        };

        if embeddings.len() != texts.len() {
            return Err(Error::Decode {
                service: Service::Embedding,
                message: format!(
                    "{} embeddings returned for {} inputs",
                    embeddings.len(),
                    texts.len()
                ),
            });
        }
        self.check_dimensions(&embeddings)?;
        Ok(embeddings)
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    /// Ask Ollama to truncate inputs that exceed the model's context length
    /// instead of returning a 400 error.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = join_url(&config.base_url, "/api/embed");

    let batch_size = 32;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OllamaEmbedRequest {
            model: &config.embedding_model,
            input: chunk,
            truncate: true,
        };
        let body: OllamaEmbedResponse =
            send_json(Service::Embedding, client.post(&url).json(&req)).await?;
        all_embeddings.extend(body.embeddings);
    }

    Ok(all_embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = join_url(&config.base_url, "/v1/embeddings");
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let batch_size = 64;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OpenAiEmbedRequest {
            model: &config.embedding_model,
            input: chunk,
        };
        let mut body: OpenAiEmbedResponse = send_json(
            Service::Embedding,
            client.post(&url).bearer_auth(api_key).json(&req),
        )
        .await?;

        body.data.sort_by_key(|d| d.index);
        all_embeddings.extend(body.data.into_iter().map(|d| d.embedding));
    }

    Ok(all_embeddings)
}
