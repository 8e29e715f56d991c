//! LLM-backed capabilities: embeddings, completions, and the prompts fed to them.

pub mod completion;
pub mod embeddings;
pub mod prompt;

pub use completion::{CompletionModel, HttpCompletion};
pub use embeddings::{Embedder, HttpEmbedder};
