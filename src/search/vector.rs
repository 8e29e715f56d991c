use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{ChunkMatch, NewChunk, StoredChunk};
use crate::search::store::{cosine_similarity, enforce_match_contract, MatchQuery, SimilarityStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Table {
    next_id: i64,
    /// Fixed by configuration or by the first insert.
    dimension: Option<usize>,
    rows: Vec<StoredChunk>,
}

/// In-memory similarity store with optional disk persistence.
/// Rows keep insertion order, which is the tie order of `search`.
/// `(url, chunk_number, company_name)` identifies a row; writing the same
/// key again replaces the row in place and keeps its id.
pub struct MemoryStore {
    table: RwLock<Table>,
    persist_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryStore {
    /// A store that lives only in memory.
    pub fn new(dimension: Option<usize>) -> Self {
        Self {
            table: RwLock::new(Table {
                next_id: 1,
                dimension,
                rows: Vec::new(),
            }),
            persist_path: None,
        }
    }

    /// Load `site_pages.json` from `dir`, or start empty.
    pub fn open_or_create(dir: &Path, dimension: Option<usize>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let persist_path = dir.join("site_pages.json");

        let mut table = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)?;
            serde_json::from_str::<Table>(&data)?
        } else {
            Table {
                next_id: 1,
                ..Table::default()
            }
        };

        match (table.dimension, dimension) {
            (Some(stored), Some(wanted)) if stored != wanted => {
                return Err(Error::DimensionMismatch {
                    expected: wanted,
                    actual: stored,
                });
            }
            (None, wanted) => table.dimension = wanted,
            _ => {}
        }

        tracing::info!(
            "Loaded {} stored chunks from {}",
            table.rows.len(),
            persist_path.display()
        );

        Ok(Self {
            table: RwLock::new(table),
            persist_path: Some(persist_path),
        })
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the table atomically (temp file + rename).
    fn persist(&self, table: &Table) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = serde_json::to_string(table)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn check_dimension(table: &Table, actual: usize) -> Result<()> {
        match table.dimension {
            Some(expected) if expected != actual => {
                Err(Error::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    fn upsert_locked(table: &mut Table, chunk: NewChunk) -> Result<StoredChunk> {
        if chunk.embedding.is_empty() {
            return Err(Error::invalid_input("chunk embedding is empty"));
        }
        Self::check_dimension(table, chunk.embedding.len())?;
        table.dimension.get_or_insert(chunk.embedding.len());

        let existing = table.rows.iter_mut().find(|r| {
            r.url == chunk.url
                && r.chunk_number == chunk.chunk_number
                && r.company_name == chunk.company_name
        });
        if let Some(row) = existing {
            *row = StoredChunk::from_new(row.id, chunk);
            return Ok(row.clone());
        }

        let row = StoredChunk::from_new(table.next_id, chunk);
        table.next_id += 1;
        table.rows.push(row.clone());
        Ok(row)
    }

    /// Apply `chunks` and persist; on any failure the table is left as it was.
    fn write_all(&self, chunks: Vec<NewChunk>) -> Result<Vec<StoredChunk>> {
        let mut table = self.table.write();
        let snapshot = table.clone();

        let result = chunks
            .into_iter()
            .map(|chunk| Self::upsert_locked(&mut table, chunk))
            .collect::<Result<Vec<_>>>()
            .and_then(|stored| self.persist(&table).map(|()| stored));

        if result.is_err() {
            *table = snapshot;
        }
        result
    }
}

#[async_trait]
impl SimilarityStore for MemoryStore {
    async fn insert(&self, chunk: NewChunk) -> Result<StoredChunk> {
        let mut stored = self.write_all(vec![chunk])?;
        stored.pop().ok_or_else(|| Error::invalid_input("nothing to insert"))
    }

    /// All-or-nothing: a bad chunk or a failed write leaves the table untouched.
    async fn insert_many(&self, chunks: Vec<NewChunk>) -> Result<Vec<StoredChunk>> {
        self.write_all(chunks)
    }

    async fn get(&self, id: i64) -> Result<Option<StoredChunk>> {
        let table = self.table.read();
        Ok(table.rows.iter().find(|r| r.id == id).cloned())
    }

    async fn search(&self, query: &MatchQuery<'_>) -> Result<Vec<ChunkMatch>> {
        query.validate()?;
        let table = self.table.read();
        Self::check_dimension(&table, query.embedding.len())?;

        let candidates: Vec<ChunkMatch> = table
            .rows
            .iter()
            .filter(|r| query.company_name.map_or(true, |c| r.company_name == c))
            .filter_map(|r| {
                let similarity = cosine_similarity(query.embedding, &r.embedding);
                (similarity > query.threshold).then(|| ChunkMatch {
                    id: r.id,
                    url: r.url.clone(),
                    chunk_number: r.chunk_number,
                    title: r.title.clone(),
                    summary: r.summary.clone(),
                    content: r.content.clone(),
                    company_name: Some(r.company_name.clone()),
                    metadata: r.metadata.clone(),
                    similarity,
                })
            })
            .collect();

        Ok(enforce_match_contract(candidates, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(url: &str, company: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            url: url.to_string(),
            chunk_number: 0,
            title: "title".to_string(),
            summary: "summary".to_string(),
            content: format!("content of {url}"),
            company_name: company.to_string(),
            metadata: serde_json::json!({"source": "test"}),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let store = MemoryStore::default();
        let a = store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.unwrap();
        let b = store.insert(chunk("b", "Acme", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_dimension_fixed_by_first_insert() {
        let store = MemoryStore::default();
        store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.unwrap();
        let err = store
            .insert(chunk("b", "Acme", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn test_configured_dimension_enforced() {
        let store = MemoryStore::new(Some(3));
        let err = store.insert(chunk("a", "Acme", vec![1.0])).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_fails() {
        let store = MemoryStore::new(Some(2));
        store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.unwrap();
        let q = MatchQuery {
            embedding: &[1.0, 0.0, 0.0],
            threshold: 0.5,
            count: 5,
            company_name: None,
        };
        assert!(store.search(&q).await.is_err());
    }

    #[tokio::test]
    async fn test_insert_many_is_all_or_nothing() {
        let store = MemoryStore::default();
        let err = store
            .insert_many(vec![
                chunk("a", "Acme", vec![1.0, 0.0]),
                chunk("b", "Acme", vec![1.0]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert!(store.is_empty());
        let ok = store.insert(chunk("c", "Acme", vec![1.0])).await.unwrap();
        assert_eq!(ok.id, 1);
    }

    #[tokio::test]
    async fn test_reinsert_same_key_replaces_row() {
        let store = MemoryStore::default();
        let first = store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.unwrap();
        let mut again = chunk("a", "Acme", vec![0.0, 1.0]);
        again.summary = "newer".to_string();
        let second = store.insert(again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
        let row = store.get(first.id).await.unwrap().unwrap();
        assert_eq!(row.summary, "newer");
        assert_eq!(row.embedding, vec![0.0, 1.0]);

        // Same url under another company is a separate row.
        let other = store.insert(chunk("a", "Globex", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(other.id, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_many_twice_keeps_row_count() {
        let store = MemoryStore::default();
        let batch = || {
            vec![
                chunk("a", "Acme", vec![1.0, 0.0]),
                chunk("b", "Acme", vec![0.0, 1.0]),
            ]
        };
        let first = store.insert_many(batch()).await.unwrap();
        let second = store.insert_many(batch()).await.unwrap();
        assert_eq!(store.len(), 2);
        let ids = |rows: &[StoredChunk]| rows.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_table_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = MemoryStore::open_or_create(&data_dir, None).unwrap();
        std::fs::remove_dir_all(&data_dir).unwrap();

        assert!(store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.is_err());
        assert!(store.is_empty());
        assert!(store.get(1).await.unwrap().is_none());

        let batch = vec![
            chunk("a", "Acme", vec![1.0, 0.0]),
            chunk("b", "Acme", vec![0.0, 1.0]),
        ];
        assert!(store.insert_many(batch).await.is_err());
        assert!(store.is_empty());

        // Once the directory is back, ids start from 1 again.
        std::fs::create_dir_all(&data_dir).unwrap();
        let row = store.insert(chunk("c", "Acme", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(row.id, 1);
    }

    #[tokio::test]
    async fn test_search_filters_by_company() {
        let store = MemoryStore::default();
        store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.unwrap();
        store.insert(chunk("g", "Globex", vec![1.0, 0.0])).await.unwrap();
        let q = MatchQuery {
            embedding: &[1.0, 0.0],
            threshold: 0.5,
            count: 10,
            company_name: Some("Globex"),
        };
        let hits = store.search(&q).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "g");
        assert_eq!(hits[0].company_name.as_deref(), Some("Globex"));
    }

    #[tokio::test]
    async fn test_empty_store_search_is_empty() {
        let store = MemoryStore::default();
        let q = MatchQuery {
            embedding: &[1.0, 0.0],
            threshold: 0.0,
            count: 10,
            company_name: None,
        };
        assert!(store.search(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::open_or_create(dir.path(), Some(2)).unwrap();
            store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.unwrap();
        }
        let store = MemoryStore::open_or_create(dir.path(), Some(2)).unwrap();
        assert_eq!(store.len(), 1);
        let next = store.insert(chunk("b", "Acme", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn test_persisted_dimension_conflict() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::open_or_create(dir.path(), None).unwrap();
            store.insert(chunk("a", "Acme", vec![1.0, 0.0])).await.unwrap();
        }
        assert!(MemoryStore::open_or_create(dir.path(), Some(3)).is_err());
    }
}
