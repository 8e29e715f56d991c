//! The similarity-store capability: persist embedded chunks and run the
//! `match_site_pages` nearest-neighbour query against them.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{ChunkMatch, NewChunk, StoredChunk};

/// Arguments of one similarity query.
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    pub embedding: &'a [f32],
    /// Rows must score strictly above this cosine similarity.
    pub threshold: f32,
    /// Maximum number of rows returned.
    pub count: usize,
    /// Restrict rows to one `company_name` tag.
    pub company_name: Option<&'a str>,
}

impl MatchQuery<'_> {
    /// Reject arguments the store cannot answer meaningfully.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::invalid_input(format!(
                "match threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.embedding.is_empty() {
            return Err(Error::invalid_input("query embedding is empty"));
        }
        Ok(())
    }
}

#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Persist one chunk and return it with its assigned id.
    async fn insert(&self, chunk: NewChunk) -> Result<StoredChunk>;

    /// Persist several chunks in order.
    async fn insert_many(&self, chunks: Vec<NewChunk>) -> Result<Vec<StoredChunk>> {
        let mut stored = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            stored.push(self.insert(chunk).await?);
        }
        Ok(stored)
    }

    /// Fetch one row by id.
    async fn get(&self, id: i64) -> Result<Option<StoredChunk>>;

    /// Rows with similarity above the threshold, best first, at most `count`.
    async fn search(&self, query: &MatchQuery<'_>) -> Result<Vec<ChunkMatch>>;
}

/// Apply the ranking contract to candidate rows: drop rows at or below the
/// threshold (or outside the company filter), sort by similarity descending
/// with a stable sort so ties keep storage order, and cap at `count`.
pub fn enforce_match_contract(mut rows: Vec<ChunkMatch>, query: &MatchQuery<'_>) -> Vec<ChunkMatch> {
    rows.retain(|r| r.similarity > query.threshold);
    if let Some(company) = query.company_name {
        rows.retain(|r| r.company_name.as_deref() == Some(company));
    }
    rows.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows.truncate(query.count);
    rows
}

/// Cosine similarity (`1 - cosine distance`). Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, similarity: f32, company: &str) -> ChunkMatch {
        ChunkMatch {
            id,
            url: format!("https://example.com/{id}"),
            chunk_number: 0,
            title: String::new(),
            summary: String::new(),
            content: String::new(),
            company_name: Some(company.to_string()),
            metadata: serde_json::Value::Null,
            similarity,
        }
    }

    fn query(embedding: &[f32], threshold: f32, count: usize) -> MatchQuery<'_> {
        MatchQuery {
            embedding,
            threshold,
            count,
            company_name: None,
        }
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_contract_threshold_is_exclusive() {
        let e = [1.0];
        let rows = vec![row(1, 0.7, "a"), row(2, 0.71, "a"), row(3, 0.5, "a")];
        let out = enforce_match_contract(rows, &query(&e, 0.7, 10));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 2);
    }

    #[test]
    fn test_contract_sorted_and_capped() {
        let e = [1.0];
        let rows = vec![row(1, 0.8, "a"), row(2, 0.95, "a"), row(3, 0.9, "a")];
        let out = enforce_match_contract(rows, &query(&e, 0.0, 2));
        let ids: Vec<i64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_contract_ties_keep_order() {
        let e = [1.0];
        let rows = vec![row(1, 0.9, "a"), row(2, 0.9, "a"), row(3, 0.9, "a")];
        let out = enforce_match_contract(rows, &query(&e, 0.0, 10));
        let ids: Vec<i64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_contract_company_filter() {
        let e = [1.0];
        let rows = vec![row(1, 0.9, "Acme"), row(2, 0.9, "Globex")];
        let q = MatchQuery {
            company_name: Some("Acme"),
            ..query(&e, 0.0, 10)
        };
        let out = enforce_match_contract(rows, &q);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
    }

    #[test]
    fn test_validate_threshold_range() {
        let e = [1.0];
        assert!(query(&e, 0.0, 1).validate().is_ok());
        assert!(query(&e, 1.0, 1).validate().is_ok());
        assert!(query(&e, -0.1, 1).validate().is_err());
        assert!(query(&e, 1.5, 1).validate().is_err());
        assert!(query(&e, f32::NAN, 1).validate().is_err());
        assert!(query(&[], 0.5, 1).validate().is_err());
    }
}
