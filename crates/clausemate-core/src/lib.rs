//! # ClauseMate Core
//!
//! Shared, runtime-free logic for ClauseMate: case models, the error
//! taxonomy, the vector index and embedding provider traits, prompt
//! assembly, and recovery of structured objects from model output.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! transports and the persistent index live in the `clausemate` app crate.

pub mod embedding;
pub mod error;
pub mod models;
pub mod prompt;
pub mod response;
pub mod store;
