//! Retrieval: web search and the similarity store.

pub mod store;
pub mod supabase;
pub mod vector;
pub mod web;

pub use store::{MatchQuery, SimilarityStore};
pub use supabase::SupabaseStore;
pub use vector::MemoryStore;
pub use web::{BraveSearch, WebSearch};
