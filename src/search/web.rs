use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::{Error, Result, Service};
use crate::http::{join_url, send_json};
use crate::models::SearchResult;

/// Brave caps `count` at 20 per request.
const MAX_COUNT: usize = 20;

/// Keyword web search returning ranked snippets.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>>;
}

/// Brave Search web API client.
#[derive(Clone)]
pub struct BraveSearch {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BraveSearch {
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or(Error::MissingCredential {
            service: Service::Search,
            what: "BRAVE_SEARCH_API_KEY",
        })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::invalid_input("search query is empty"));
        }

        let url = join_url(&self.base_url, "/res/v1/web/search");
        let count = count.clamp(1, MAX_COUNT);
        let req = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query.to_string()), ("count", count.to_string())]);

        let body: BraveResponse = send_json(Service::Search, req).await?;
        Ok(into_results(body))
    }
}

fn into_results(body: BraveResponse) -> Vec<SearchResult> {
    body.web
        .map(|web| web.results)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| !r.url.trim().is_empty())
        .map(|r| SearchResult {
            title: strip_tags(&r.title),
            url: r.url,
            snippet: strip_tags(r.description.as_deref().unwrap_or_default()),
        })
        .collect()
}

/// Brave highlights matches with `<strong>`; drop markup and decode the
/// handful of entities it emits.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .trim()
        .to_string()
}
