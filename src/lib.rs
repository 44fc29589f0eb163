//! Joblens - Hybrid Query Routing & Retrieval Engine
//!
//! Answers natural-language questions about production job orders by
//! classifying query intent, routing between direct record lookups and
//! vector similarity search, and keeping the vector index synchronized
//! with the upstream order book.

pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod filter;
pub mod intent;
pub mod model;
pub mod router;
pub mod sync;

pub use error::{JoblensError, Result};
