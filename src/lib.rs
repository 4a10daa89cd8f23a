//! Lore - Personal Document Question-Answering
//!
//! A retrieval-augmented QA engine: documents are chunked, embedded and held
//! in a per-user in-memory index; questions are answered from the best
//! matching passages, through a generative provider chain when one is
//! configured and an extractive summarizer otherwise. Explicit relevance
//! feedback is distilled into ranking preferences for future questions.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod history;
pub mod index;
pub mod providers;
pub mod retrieval;
pub mod storage;
pub mod synthesis;

pub use error::{LoreError, Result};
