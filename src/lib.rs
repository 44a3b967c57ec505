//! # Recall
//!
//! Project-aware semantic retrieval and context assembly for personal
//! knowledge assistants.
//!
//! Given a natural-language query and a requesting owner/project, Recall
//! finds the most similar stored content, weights it by organizational
//! relevance (same project, related project, unrelated), and assembles a
//! token-budgeted context for a downstream answer model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Embedding   │   │   Content    │   │ Relationship │
//! │  Provider    │   │  Repository  │   │    Store     │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │                  ▼                  │
//!        │           ┌──────────────┐          │
//!        └──────────▶│ SearchEngine │◀─────────┘
//!                    │ VectorCache  │
//!                    └──────┬───────┘
//!                 ┌─────────┴─────────┐
//!                 ▼                   ▼
//!           ┌──────────┐        ┌──────────┐
//!           │   CLI    │        │   HTTP   │
//!           │ (recall) │        │  (axum)  │
//!           └──────────┘        └──────────┘
//! ```
//!
//! The pure algorithms (chunking, similarity, relevance, assembly,
//! insights) live in the `recall-core` crate; this crate wires them to
//! I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`codec`] | Body compression for storage |
//! | [`repository`] | Content repository and relationship store |
//! | [`cache`] | Per-owner vector cache |
//! | [`engine`] | Search, direct search and RAG query |
//! | [`ingest`] | Chunk, embed and store documents |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod codec;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod repository;
pub mod server;
