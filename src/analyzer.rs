//! The analysis pipeline: search → ingest → retrieve → complete.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::chunking::chunk_text;
use crate::config::{AnalyzerConfig, Config, StoreBackend};
use crate::error::{Error, Result, Service};
use crate::llm::prompt::{build_analysis_messages, build_structure_messages, parse_structured_analysis};
use crate::llm::{CompletionModel, Embedder, HttpCompletion, HttpEmbedder};
use crate::models::{ChunkMatch, CompanyAnalysis, CompanyReport, NewChunk, SearchResult};
use crate::search::{BraveSearch, MatchQuery, MemoryStore, SimilarityStore, SupabaseStore, WebSearch};

/// Longest company name accepted.
pub const MAX_COMPANY_NAME_CHARS: usize = 200;

/// Allowed range for the total number of search results per analysis.
pub const NUM_RESULTS_RANGE: (usize, usize) = (5, 30);

/// One web query is issued per aspect, as `"{company} {aspect}"`.
const SEARCH_ASPECTS: [&str; 5] = [
    "company information",
    "financial performance",
    "market analysis",
    "competitors",
    "recent news",
];

const SUMMARY_CHARS: usize = 200;

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Total search results to gather; `None` uses the configured default.
    pub num_results: Option<usize>,
    /// Also restate the report as a [`CompanyAnalysis`].
    pub structured: bool,
}

/// A search hit together with the query that found it.
struct SourcedResult {
    result: SearchResult,
    query: String,
}

pub struct Analyzer {
    search: Arc<dyn WebSearch>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionModel>,
    store: Arc<dyn SimilarityStore>,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(
        search: Arc<dyn WebSearch>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionModel>,
        store: Arc<dyn SimilarityStore>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            search,
            embedder,
            completion,
            store,
            config,
        }
    }

    /// Wire the HTTP-backed clients and the configured store.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self> {
        let search = BraveSearch::new(client.clone(), &config.search)?;
        let embedder = HttpEmbedder::new(client.clone(), config.llm.clone())?;
        let completion = HttpCompletion::new(client.clone(), config.llm.clone())?;

        let store: Arc<dyn SimilarityStore> = match config.store.backend {
            StoreBackend::Supabase => Arc::new(SupabaseStore::new(client, &config.store)?),
            StoreBackend::Memory => {
                let dim = Some(config.llm.embedding_dim);
                match &config.store.data_dir {
                    Some(dir) => Arc::new(MemoryStore::open_or_create(dir, dim)?),
                    None => Arc::new(MemoryStore::new(dim)),
                }
            }
        };

        Ok(Self::new(
            Arc::new(search),
            Arc::new(embedder),
            Arc::new(completion),
            store,
            config.analyzer.clone(),
        ))
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze with the configured defaults.
    pub async fn analyze(&self, company_name: &str) -> Result<CompanyReport> {
        self.analyze_with(company_name, &AnalyzeOptions::default()).await
    }

    pub async fn analyze_with(
        &self,
        company_name: &str,
        options: &AnalyzeOptions,
    ) -> Result<CompanyReport> {
        // ── Step 1: Validate before touching the network ──────
        let company = validate_company_name(company_name)?;
        let threshold = self.config.match_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(Error::invalid_input(format!(
                "match threshold must be within [0, 1], got {threshold}"
            )));
        }
        let num_results = options
            .num_results
            .unwrap_or(self.config.num_results)
            .clamp(NUM_RESULTS_RANGE.0, NUM_RESULTS_RANGE.1);

        tracing::info!("Analyzing '{company}' ({num_results} search results)");

        // ── Step 2: Web search ────────────────────────────────
        let hits = self.gather_results(company, num_results).await?;
        tracing::info!("Search returned {} unique results", hits.len());

        // ── Step 3: Chunk, embed and store ────────────────────
        if self.config.ingest && !hits.is_empty() {
            let stored = self.ingest(company, &hits).await?;
            tracing::info!("Stored {stored} chunks for '{company}'");
        }

        // ── Step 4: Similarity retrieval ──────────────────────
        let matches = self.retrieve(company).await?;
        tracing::info!("Retrieved {} stored chunks", matches.len());

        let results: Vec<SearchResult> = hits.into_iter().map(|h| h.result).collect();

        if results.is_empty() && matches.is_empty() {
            tracing::warn!("No information found for '{company}'");
            return Ok(CompanyReport {
                company_name: company.to_string(),
                report: no_information_report(company),
                sources: Vec::new(),
                analysis: None,
                generated_at: Utc::now(),
            });
        }

        // ── Step 5: Completion ────────────────────────────────
        let messages = build_analysis_messages(company, &results, &matches);
        let report = self.completion.complete(&messages).await?;
        let sources = collect_sources(&results, &matches);

        // ── Step 6: Optional structuring ──────────────────────
        let analysis = if options.structured {
            Some(self.structure(company, &report, &sources).await?)
        } else {
            None
        };

        Ok(CompanyReport {
            company_name: company.to_string(),
            report,
            sources,
            analysis,
            generated_at: Utc::now(),
        })
    }

    async fn gather_results(&self, company: &str, num_results: usize) -> Result<Vec<SourcedResult>> {
        let per_query = (num_results / SEARCH_ASPECTS.len()).max(1);
        let mut seen = HashSet::new();
        let mut hits = Vec::new();

        for aspect in SEARCH_ASPECTS {
            let query = format!("{company} {aspect}");
            let results = self.search.search(&query, per_query).await?;
            tracing::debug!("'{query}': {} results", results.len());

            for result in results {
                if seen.insert(result.url.clone()) {
                    hits.push(SourcedResult {
                        result,
                        query: query.clone(),
                    });
                }
            }
        }

        Ok(hits)
    }

    async fn ingest(&self, company: &str, hits: &[SourcedResult]) -> Result<usize> {
        let query_time = Utc::now().to_rfc3339();

        let mut pending = Vec::new();
        for (position, hit) in hits.iter().enumerate() {
            let r = &hit.result;
            let document = format!("{}\n{}", r.title, r.snippet);
            let summary: String = r.snippet.chars().take(SUMMARY_CHARS).collect();

            for chunk in chunk_text(&document, self.config.chunk_size, self.config.chunk_overlap) {
                pending.push(NewChunk {
                    url: r.url.clone(),
                    chunk_number: chunk.chunk_number,
                    title: r.title.clone(),
                    summary: summary.clone(),
                    content: chunk.content,
                    company_name: company.to_string(),
                    metadata: serde_json::json!({
                        "position": position,
                        "source": "brave_search",
                        "query": hit.query,
                        "query_time": query_time,
                    }),
                    embedding: Vec::new(),
                });
            }
        }

        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != pending.len() {
            return Err(Error::Decode {
                service: Service::Embedding,
                message: format!(
                    "expected {} embeddings, got {}",
                    pending.len(),
                    embeddings.len()
                ),
            });
        }

        for (chunk, embedding) in pending.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        let stored = self.store.insert_many(pending).await?;
        Ok(stored.len())
    }

    async fn retrieve(&self, company: &str) -> Result<Vec<ChunkMatch>> {
        let question = format!("{company} company analysis");
        let embedding = self.embedder.embed(&question).await?;
        let query = MatchQuery {
            embedding: &embedding,
            threshold: self.config.match_threshold,
            count: self.config.match_count,
            company_name: Some(company),
        };
        self.store.search(&query).await
    }

    async fn structure(&self, company: &str, report: &str, sources: &[String]) -> Result<CompanyAnalysis> {
        let messages = build_structure_messages(company, report);
        let content = self.completion.complete(&messages).await?;

        let mut analysis = match parse_structured_analysis(&content) {
            Some(analysis) => analysis,
            None => {
                tracing::warn!("Falling back to unstructured analysis for '{company}'");
                let mut fallback = CompanyAnalysis::fallback(company, report);
                fallback.sources.clear();
                fallback
            }
        };

        if analysis.company_info.name.trim().is_empty() {
            analysis.company_info.name = company.to_string();
        }
        if analysis.sources.is_empty() {
            analysis.sources = sources.to_vec();
        }
        Ok(analysis)
    }
}

/// Trim and bound a company name.
pub fn validate_company_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("company name is required"));
    }
    if name.chars().count() > MAX_COMPANY_NAME_CHARS {
        return Err(Error::invalid_input(format!(
            "company name is longer than {MAX_COMPANY_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}

fn no_information_report(company: &str) -> String {
    format!(
        "No information was found for {company}. \
         Check the spelling of the company name or try its full legal name."
    )
}

/// Search URLs first, then chunk URLs; first occurrence wins.
fn collect_sources(results: &[SearchResult], matches: &[ChunkMatch]) -> Vec<String> {
    let urls = results
        .iter()
        .map(|r| r.url.as_str())
        .chain(matches.iter().map(|m| m.url.as_str()));

    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for url in urls {
        if !url.is_empty() && seen.insert(url) {
            sources.push(url.to_string());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeSearch {
        results: Vec<SearchResult>,
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl WebSearch for FakeSearch {
        async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
            self.queries.lock().push((query.to_string(), count));
            Ok(self.results.clone())
        }
    }

    #[derive(Default)]
    struct FakeEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    struct FakeCompletion {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl FakeCompletion {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionModel for FakeCompletion {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.prompts.lock().push(messages.to_vec());
            Ok(self.replies.lock().pop().unwrap_or_default())
        }
    }

    struct Fixture {
        search: Arc<FakeSearch>,
        embedder: Arc<FakeEmbedder>,
        completion: Arc<FakeCompletion>,
        store: Arc<MemoryStore>,
        analyzer: Analyzer,
    }

    fn fixture(results: Vec<SearchResult>, replies: &[&str], config: AnalyzerConfig) -> Fixture {
        let search = Arc::new(FakeSearch {
            results,
            ..FakeSearch::default()
        });
        let embedder = Arc::new(FakeEmbedder::default());
        let completion = Arc::new(FakeCompletion::new(replies));
        let store = Arc::new(MemoryStore::default());
        let analyzer = Analyzer::new(
            search.clone(),
            embedder.clone(),
            completion.clone(),
            store.clone(),
            config,
        );
        Fixture {
            search,
            embedder,
            completion,
            store,
            analyzer,
        }
    }

    fn acme_result() -> SearchResult {
        SearchResult {
            title: "Acme Corp".to_string(),
            url: "https://acme.example".to_string(),
            snippet: "Acme Corp makes anvils and rockets.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_issues_one_query_per_aspect() {
        let f = fixture(vec![acme_result()], &["report"], AnalyzerConfig::default());
        f.analyzer.analyze("Acme Corp").await.unwrap();

        let queries = f.search.queries.lock().clone();
        assert_eq!(queries.len(), 5);
        assert_eq!(queries[0], ("Acme Corp company information".to_string(), 3));
        assert_eq!(queries[4].0, "Acme Corp recent news");
    }

    #[tokio::test]
    async fn test_num_results_is_clamped() {
        let f = fixture(vec![], &[], AnalyzerConfig::default());
        let options = AnalyzeOptions {
            num_results: Some(1_000),
            structured: false,
        };
        f.analyzer.analyze_with("Acme", &options).await.unwrap();
        assert!(f.search.queries.lock().iter().all(|(_, n)| *n == 6));

        let f = fixture(vec![], &[], AnalyzerConfig::default());
        let options = AnalyzeOptions {
            num_results: Some(0),
            structured: false,
        };
        f.analyzer.analyze_with("Acme", &options).await.unwrap();
        assert!(f.search.queries.lock().iter().all(|(_, n)| *n == 1));
    }

    #[tokio::test]
    async fn test_ingest_dedupes_and_tags_rows() {
        let f = fixture(vec![acme_result()], &["report"], AnalyzerConfig::default());
        f.analyzer.analyze("Acme Corp").await.unwrap();

        // Five queries returned the same URL; it is stored once.
        assert_eq!(f.store.len(), 1);
        let row = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(row.company_name, "Acme Corp");
        assert_eq!(row.content, "Acme Corp\nAcme Corp makes anvils and rockets.");
        assert_eq!(row.metadata["source"], "brave_search");
        assert_eq!(row.metadata["query"], "Acme Corp company information");
        assert_eq!(row.metadata["position"], 0);
        // One batch for ingest, one for the retrieval question.
        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ingest_disabled_skips_store() {
        let config = AnalyzerConfig {
            ingest: false,
            ..AnalyzerConfig::default()
        };
        let f = fixture(vec![acme_result()], &["report"], config);
        let report = f.analyzer.analyze("Acme Corp").await.unwrap();
        assert!(f.store.is_empty());
        assert_eq!(report.sources, vec!["https://acme.example"]);
    }

    #[tokio::test]
    async fn test_prompt_contains_search_and_store_context() {
        let f = fixture(vec![acme_result()], &["Acme is strong"], AnalyzerConfig::default());
        let report = f.analyzer.analyze("Acme Corp").await.unwrap();
        assert_eq!(report.report, "Acme is strong");

        let prompts = f.completion.prompts.lock().clone();
        assert_eq!(prompts.len(), 1);
        let user = &prompts[0][1].content;
        assert!(user.contains("[1] Acme Corp"));
        assert!(user.contains("[VDB 1] Acme Corp"));
    }

    #[tokio::test]
    async fn test_no_information_skips_completion() {
        let f = fixture(vec![], &["unused"], AnalyzerConfig::default());
        let report = f.analyzer.analyze("Nobody Inc").await.unwrap();
        assert!(report.report.contains("No information was found for Nobody Inc"));
        assert!(report.sources.is_empty());
        assert!(f.completion.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_ignores_other_companies() {
        let f = fixture(vec![], &["unused"], AnalyzerConfig::default());
        f.store
            .insert(NewChunk {
                url: "https://globex.example".to_string(),
                chunk_number: 0,
                title: "Globex".to_string(),
                summary: String::new(),
                content: "Globex".to_string(),
                company_name: "Globex".to_string(),
                metadata: serde_json::Value::Null,
                embedding: vec![1.0, 0.0, 0.0],
            })
            .await
            .unwrap();
        let report = f.analyzer.analyze("Acme").await.unwrap();
        assert!(report.sources.is_empty());
        assert!(f.completion.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_blank_and_long_names_rejected() {
        let f = fixture(vec![acme_result()], &["report"], AnalyzerConfig::default());
        let err = f.analyzer.analyze("   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let long = "A".repeat(MAX_COMPANY_NAME_CHARS + 1);
        let err = f.analyzer.analyze(&long).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert!(f.search.queries.lock().is_empty());
        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_threshold_rejected_before_search() {
        let config = AnalyzerConfig {
            match_threshold: 1.5,
            ..AnalyzerConfig::default()
        };
        let f = fixture(vec![acme_result()], &["report"], config);
        let err = f.analyzer.analyze("Acme").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(f.search.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_structured_analysis_parsed() {
        let structured = r#"Sure: {"company_info": {"industry": "Anvils"}, "summary": "Solid"}"#;
        let f = fixture(vec![acme_result()], &["Acme is strong", structured], AnalyzerConfig::default());
        let options = AnalyzeOptions {
            num_results: None,
            structured: true,
        };
        let report = f.analyzer.analyze_with("Acme Corp", &options).await.unwrap();
        let analysis = report.analysis.unwrap();
        assert_eq!(analysis.company_info.name, "Acme Corp");
        assert_eq!(analysis.company_info.industry, "Anvils");
        assert_eq!(analysis.sources, vec!["https://acme.example"]);
        assert_eq!(f.completion.prompts.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_structured_analysis_fallback() {
        let f = fixture(vec![acme_result()], &["Acme is strong", "no json here"], AnalyzerConfig::default());
        let options = AnalyzeOptions {
            num_results: None,
            structured: true,
        };
        let report = f.analyzer.analyze_with("Acme Corp", &options).await.unwrap();
        let analysis = report.analysis.unwrap();
        assert_eq!(analysis.summary, "Acme is strong");
        assert_eq!(analysis.financial_analysis.revenue, "Information not structured");
        assert_eq!(analysis.sources, vec!["https://acme.example"]);
    }

    #[test]
    fn test_collect_sources_order_and_dedupe() {
        let results = vec![
            acme_result(),
            SearchResult {
                url: "https://b.example".to_string(),
                ..acme_result()
            },
        ];
        let matches = vec![ChunkMatch {
            id: 1,
            url: "https://acme.example".to_string(),
            chunk_number: 0,
            title: String::new(),
            summary: String::new(),
            content: String::new(),
            company_name: None,
            metadata: serde_json::Value::Null,
            similarity: 0.9,
        }];
        assert_eq!(
            collect_sources(&results, &matches),
            vec!["https://acme.example", "https://b.example"]
        );
    }
}
