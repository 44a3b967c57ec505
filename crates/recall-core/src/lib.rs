//! # Recall Core
//!
//! Shared, WASM-safe logic for Recall: content models, chunking, vector
//! utilities, similarity ranking, project relevance weighting, context
//! assembly, and search insights.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. Every
//! function here is deterministic given its inputs (including the `now`
//! timestamp callers pass in), which keeps ranking reproducible in tests.
//!
//! ## Pipeline
//!
//! ```text
//! query vector ──▶ search::rank_candidates ──▶ relevance::apply_project_relevance
//!                                                     │
//!                       ┌─────────────────────────────┤
//!                       ▼                             ▼
//!            assemble::assemble_context     insights::summarize
//! ```

pub mod assemble;
pub mod chunk;
pub mod embedding;
pub mod insights;
pub mod models;
pub mod relevance;
pub mod search;
