//! # ClauseMate
//!
//! Precedent-grounded contract review for Korean contracts.
//!
//! ClauseMate ingests case law into a vector index without duplicates,
//! retrieves the precedents nearest to a contract or question, and weaves
//! them into a delimited prompt for the generation model, so reviews and
//! chat answers cite case law without echoing the reference block.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ CaseSource  │──▶│  Ingestor    │──▶│  SQLite   │
//! │ JSON / API  │   │ dedup+embed  │   │  vectors  │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                  ┌───────────┐       ┌───────────┐
//!                  │ Retriever │──────▶│  Prompt   │──▶ Generator
//!                  └───────────┘       └───────────┘
//! ```
//!
//! Pure types and algorithms (models, errors, traits, prompt assembly,
//! response recovery) live in the `clausemate-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding transports and the retrying client |
//! | [`sqlite_index`] | Persistent vector index |
//! | [`ingest`] | Deduplicating corpus ingestion |
//! | [`search`] | Precedent retrieval |
//! | [`sources`] | Case-record sources |
//! | [`generation`] | Generation model boundary |
//! | [`review`] | Contract review pipeline |
//! | [`chat`] | Precedent-grounded chat |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod review;
pub mod search;
pub mod server;
pub mod services;
pub mod sources;
pub mod sqlite_index;
pub mod stats;

#[cfg(test)]
mod testing;
