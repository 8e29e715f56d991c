//! # company-analyzer
//!
//! Company analysis by retrieval-augmented generation over three external
//! services: Brave web search, an embedding/chat LLM endpoint (OpenAI or
//! Ollama) and a Supabase `site_pages` table ranked by pgvector.
//!
//! ## Pipeline
//!
//! ```text
//!                      ┌──────────────┐
//!                      │ Company name │
//!                      └──────┬───────┘
//!                             │ validate (blank / >200 chars → 400)
//!                             ▼
//!                 ┌───────────────────────┐
//!                 │  Brave: 5 queries     │
//!                 │  info, financials,    │
//!                 │  market, competitors, │
//!                 │  news → dedupe by URL │
//!                 └───────────┬───────────┘
//!                             │
//!              ┌──────────────┴──────────────┐
//!              ▼                             │
//!   ┌─────────────────────┐                  │
//!   │ Chunk → embed batch │                  │
//!   │ → insert site_pages │                  │
//!   └──────────┬──────────┘                  │
//!              ▼                             │
//!   ┌─────────────────────┐                  │
//!   │  match_site_pages   │                  │
//!   │  cos > 0.7, top 5   │                  │
//!   └──────────┬──────────┘                  │
//!              └──────────────┬──────────────┘
//!                             ▼
//!                 ┌───────────────────────┐
//!                 │ Prompt: [i] results + │
//!                 │ [VDB i] chunks → LLM  │
//!                 └───────────┬───────────┘
//!                             ▼
//!                 ┌───────────────────────┐
//!                 │ CompanyReport         │
//!                 │ (+ optional JSON view)│
//!                 └───────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for every client
//! - [`error`] - Error taxonomy and its HTTP status mapping
//! - [`models`] - Shared data types: chunks, search results, reports
//! - [`chunking`] - Paragraph-aware chunking with a character budget
//! - [`search::web`] - Brave Search client
//! - [`search::store`] - The similarity-store trait and ranking contract
//! - [`search::supabase`] - PostgREST backend for `site_pages`
//! - [`search::vector`] - In-memory backend with optional disk persistence
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::completion`] - Non-streaming chat completion
//! - [`llm::prompt`] - Prompt assembly and structured-output parsing
//! - [`analyzer`] - The orchestration pipeline
//! - [`api`] - Axum HTTP handlers
//! - [`mcp`] - JSON-lines tool server
//! - [`state`] - Shared application state

pub mod analyzer;
pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod search;
pub mod state;
