use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Web search API configuration
    pub search: SearchConfig,
    /// LLM provider configuration (chat + embeddings)
    pub llm: LlmConfig,
    /// Vector store configuration
    pub store: StoreConfig,
    /// Pipeline tuning
    pub analyzer: AnalyzerConfig,
}

/// Brave Search API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL, without the `/res/v1/web/search` path.
    pub base_url: String,
    /// Subscription token sent as `X-Subscription-Token`.
    pub api_key: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.search.brave.com".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "ollama"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for the analysis completion
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
    /// Sampling temperature for completions
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            embedding_dim: 1536,
            temperature: 0.2,
        }
    }
}

/// Where stored chunks live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Supabase,
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "supabase" => Some(StoreBackend::Supabase),
            "memory" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Supabase project URL, e.g. `https://xyz.supabase.co`
    pub supabase_url: Option<String>,
    /// Supabase service-role (or anon) key
    pub supabase_key: Option<String>,
    /// Table holding the chunks
    pub table: String,
    /// Similarity RPC entry point
    pub match_function: String,
    /// Memory backend persistence directory (None = not persisted)
    pub data_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Supabase,
            supabase_url: None,
            supabase_key: None,
            table: "site_pages".to_string(),
            match_function: "match_site_pages".to_string(),
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Minimum cosine similarity (exclusive) for retrieved chunks
    pub match_threshold: f32,
    /// Maximum number of retrieved chunks
    pub match_count: usize,
    /// Default number of search results gathered per analysis
    pub num_results: usize,
    /// Whether search results are chunked, embedded and stored
    pub ingest: bool,
    /// Maximum characters per stored chunk
    pub chunk_size: usize,
    /// Characters shared between consecutive hard-split chunks
    pub chunk_overlap: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.7,
            match_count: 5,
            num_results: 15,
            ingest: true,
            chunk_size: crate::chunking::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::chunking::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8501".to_string(),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            store: StoreConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = var("COMPANY_ANALYZER_BIND_ADDR") {
            config.bind_addr = addr;
        }

        // Search
        if let Some(key) = var("BRAVE_SEARCH_API_KEY") {
            config.search.api_key = Some(key);
        }
        if let Some(url) = var("BRAVE_SEARCH_BASE_URL") {
            config.search.base_url = url;
        }

        // LLM
        if let Some(provider) = var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = var("LLM_BASE_URL") {
            config.llm.base_url = url;
        } else if config.llm.provider == "ollama" {
            config.llm.base_url = "http://localhost:11434".to_string();
        }
        if let Some(model) = var("LLM_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(model) = var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Some(key) = var("OPENAI_API_KEY").or_else(|| var("LLM_API_KEY")) {
            config.llm.api_key = Some(key);
        }
        if let Some(dim) = var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Some(val) = var("LLM_TEMPERATURE") {
            if let Ok(t) = val.parse() {
                config.llm.temperature = t;
            }
        }

        // Store
        if let Some(val) = var("STORE_BACKEND") {
            match StoreBackend::parse(&val) {
                Some(backend) => config.store.backend = backend,
                None => tracing::warn!("Ignoring unknown STORE_BACKEND '{val}'"),
            }
        }
        if let Some(url) = var("SUPABASE_URL") {
            config.store.supabase_url = Some(url);
        }
        if let Some(key) = var("SUPABASE_SERVICE_KEY").or_else(|| var("SUPABASE_KEY")) {
            config.store.supabase_key = Some(key);
        }
        if let Some(dir) = var("STORE_DATA_DIR") {
            config.store.data_dir = Some(PathBuf::from(dir));
        }

        // Analyzer
        if let Some(val) = var("ANALYZER_MATCH_THRESHOLD") {
            if let Ok(v) = val.parse() {
                config.analyzer.match_threshold = v;
            }
        }
        if let Some(val) = var("ANALYZER_MATCH_COUNT") {
            if let Ok(v) = val.parse() {
                config.analyzer.match_count = v;
            }
        }
        if let Some(val) = var("ANALYZER_NUM_RESULTS") {
            if let Ok(v) = val.parse() {
                config.analyzer.num_results = v;
            }
        }
        if let Some(val) = var("ANALYZER_INGEST") {
            if let Ok(v) = val.parse() {
                config.analyzer.ingest = v;
            }
        }

        config
    }

    /// Public view of the configuration with every secret replaced by a flag.
    pub fn redacted(&self) -> RedactedConfig {
        RedactedConfig {
            search_base_url: self.search.base_url.clone(),
            has_search_key: self.search.api_key.is_some(),
            llm_provider: self.llm.provider.clone(),
            llm_base_url: self.llm.base_url.clone(),
            chat_model: self.llm.chat_model.clone(),
            embedding_model: self.llm.embedding_model.clone(),
            embedding_dim: self.llm.embedding_dim,
            has_llm_key: self.llm.api_key.is_some(),
            store_backend: self.store.backend,
            supabase_url: self.store.supabase_url.clone(),
            has_store_key: self.store.supabase_key.is_some(),
            match_threshold: self.analyzer.match_threshold,
            match_count: self.analyzer.match_count,
            num_results: self.analyzer.num_results,
            ingest: self.analyzer.ingest,
        }
    }
}

/// Config response with API keys redacted
#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub search_base_url: String,
    pub has_search_key: bool,
    pub llm_provider: String,
    pub llm_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub has_llm_key: bool,
    pub store_backend: StoreBackend,
    pub supabase_url: Option<String>,
    pub has_store_key: bool,
    pub match_threshold: f32,
    pub match_count: usize,
    pub num_results: usize,
    pub ingest: bool,
}
