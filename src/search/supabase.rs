//! Supabase (PostgREST) backend for the `site_pages` table.
//!
//! Rows are written with a plain REST insert and ranked server-side by the
//! `match_site_pages` SQL function (see `sql/site_pages.sql`).

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::StoreConfig;
use crate::error::{Error, Result, Service};
use crate::http::{join_url, send_json};
use crate::models::{ChunkMatch, NewChunk, StoredChunk};
use crate::search::store::{enforce_match_contract, MatchQuery, SimilarityStore};

pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
    match_function: String,
}

impl SupabaseStore {
    pub fn new(client: reqwest::Client, config: &StoreConfig) -> Result<Self> {
        let base_url = config.supabase_url.clone().ok_or(Error::MissingCredential {
            service: Service::Store,
            what: "SUPABASE_URL",
        })?;
        let api_key = config.supabase_key.clone().ok_or(Error::MissingCredential {
            service: Service::Store,
            what: "SUPABASE_SERVICE_KEY",
        })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            table: config.table.clone(),
            match_function: config.match_function.clone(),
        })
    }

    fn rest_url(&self, path: &str) -> String {
        join_url(&self.base_url, &format!("/rest/v1/{path}"))
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[derive(Serialize)]
struct MatchArgs<'a> {
    query_embedding: &'a [f32],
    match_threshold: f32,
    match_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_company: Option<&'a str>,
}

#[derive(Deserialize)]
struct InsertedId {
    id: i64,
}

/// A `site_pages` row as PostgREST returns it. Text columns may be NULL and
/// `vector` columns arrive as a string like `"[0.1,0.2]"`.
#[derive(Deserialize)]
struct SiteRow {
    id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    chunk_number: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    company_name: String,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default, deserialize_with = "vector_from_json")]
    embedding: Vec<f32>,
}

impl From<SiteRow> for StoredChunk {
    fn from(row: SiteRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            chunk_number: row.chunk_number,
            title: row.title,
            summary: row.summary,
            content: row.content,
            company_name: row.company_name,
            metadata: row.metadata,
            embedding: row.embedding,
        }
    }
}

/// A row returned by the match function.
#[derive(Deserialize)]
struct MatchRow {
    id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    chunk_number: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    content: String,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    similarity: f32,
}

impl From<MatchRow> for ChunkMatch {
    fn from(row: MatchRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            chunk_number: row.chunk_number,
            title: row.title,
            summary: row.summary,
            content: row.content,
            company_name: row.company_name,
            metadata: row.metadata,
            similarity: row.similarity,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn vector_from_json<'de, D>(deserializer: D) -> std::result::Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<f32>),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Raw::List(v)) => Ok(v),
        Some(Raw::Text(s)) => parse_vector_literal(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse pgvector's text form, `[0.1,0.2,0.3]`.
fn parse_vector_literal(text: &str) -> std::result::Result<Vec<f32>, String> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("not a vector literal: {text}"))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| format!("bad vector component '{v}': {e}"))
        })
        .collect()
}

/// Columns of the unique index in `sql/site_pages.sql`.
const UPSERT_KEY: &str = "url,chunk_number,company_name";

#[async_trait]
impl SimilarityStore for SupabaseStore {
    async fn insert(&self, chunk: NewChunk) -> Result<StoredChunk> {
        let mut stored = self.insert_many(vec![chunk]).await?;
        stored.pop().ok_or_else(|| Error::Decode {
            service: Service::Store,
            message: "insert returned no row".to_string(),
        })
    }

    /// One bulk upsert; PostgREST runs it in a single statement.
    /// Rows that already exist for `(url, chunk_number, company_name)` are
    /// updated in place and keep their id.
    async fn insert_many(&self, chunks: Vec<NewChunk>) -> Result<Vec<StoredChunk>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}?on_conflict={UPSERT_KEY}&select=id",
            self.rest_url(&self.table)
        );
        let req = self
            .authorized(self.client.post(&url))
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .json(&chunks);
        let ids: Vec<InsertedId> = send_json(Service::Store, req).await?;

        if ids.len() != chunks.len() {
            return Err(Error::Decode {
                service: Service::Store,
                message: format!("{} ids returned for {} rows", ids.len(), chunks.len()),
            });
        }

        tracing::debug!("Upserted {} rows into {}", ids.len(), self.table);
        Ok(ids
            .into_iter()
            .zip(chunks)
            .map(|(inserted, chunk)| StoredChunk::from_new(inserted.id, chunk))
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<StoredChunk>> {
        let url = self.rest_url(&self.table);
        let req = self
            .authorized(self.client.get(&url))
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())]);
        let rows: Vec<SiteRow> = send_json(Service::Store, req).await?;
        Ok(rows.into_iter().next().map(StoredChunk::from))
    }

    async fn search(&self, query: &MatchQuery<'_>) -> Result<Vec<ChunkMatch>> {
        query.validate()?;
        if query.count == 0 {
            return Ok(Vec::new());
        }

        let url = self.rest_url(&format!("rpc/{}", self.match_function));
        let args = MatchArgs {
            query_embedding: query.embedding,
            match_threshold: query.threshold,
            match_count: query.count,
            filter_company: query.company_name,
        };
        let rows: Vec<MatchRow> =
            send_json(Service::Store, self.authorized(self.client.post(&url)).json(&args)).await?;

        let rows = rows.into_iter().map(ChunkMatch::from).collect();
        Ok(enforce_match_contract(rows, query))
    }
}
