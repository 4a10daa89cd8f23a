//! Answer synthesis
//!
//! Combines retrieved chunks into a final answer. The generative path
//! assembles a source-labeled prompt and submits it to the provider chain;
//! the extractive path summarizes the retrieved text directly. Either way
//! the caller gets an answer with a confidence score and source attribution,
//! or a clear "nothing found" response — never an error for an empty result
//! set.

mod extractive;

pub use extractive::extract_summary;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::providers::ProviderChain;
use crate::retrieval::RetrievalResult;

/// Fixed role instruction sent to every generative provider.
const SYSTEM_PROMPT: &str = "You are a personal document assistant. Answer the user's question \
using only the provided document excerpts. Be concise and factual. If the excerpts do not \
contain the answer, say so plainly. Do not invent information.";

/// Returned when retrieval produced nothing usable.
const NO_RESULTS_ANSWER: &str =
    "I couldn't find relevant information in your documents to answer that question.";

/// Configuration for answer synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Per-chunk character cap when building the prompt context
    pub max_chunk_chars: usize,
    /// Generative answers longer than this are used as-is; shorter ones are
    /// kept only if the extractive fallback comes up empty
    pub preferred_answer_len: usize,
    /// Sentences selected by the extractive fallback
    pub extractive_sentences: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2000,
            preferred_answer_len: 50,
            extractive_sentences: 3,
        }
    }
}

/// A synthesized answer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Deduplicated ids of the documents that contributed
    pub source_document_ids: Vec<String>,
    /// `round(mean similarity x 100)`, 0 when nothing contributed
    pub confidence: u8,
}

/// Synthesizes answers from retrieved chunks
pub struct Synthesizer {
    chain: ProviderChain,
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(chain: ProviderChain, config: SynthesisConfig) -> Self {
        Self { chain, config }
    }

    /// Produce an answer for `query` from `results`.
    pub async fn answer(&self, query: &str, results: &[RetrievalResult]) -> Answer {
        if results.is_empty() {
            return Answer {
                text: NO_RESULTS_ANSWER.to_string(),
                source_document_ids: Vec::new(),
                confidence: 0,
            };
        }

        let confidence = confidence_of(results);
        let source_document_ids = sources_of(results);

        let text = self.synthesize_text(query, results).await;

        Answer {
            text,
            source_document_ids,
            confidence,
        }
    }

    async fn synthesize_text(&self, query: &str, results: &[RetrievalResult]) -> String {
        let mut short_generative = None;

        if !self.chain.is_empty() {
            match self.chain.generate(SYSTEM_PROMPT, &self.build_user_prompt(query, results)).await {
                Ok(text) if text.len() > self.config.preferred_answer_len => {
                    return text;
                }
                Ok(text) => {
                    debug!(chars = text.len(), "generative answer below quality threshold");
                    short_generative = Some(text);
                }
                Err(e) => {
                    debug!(error = %e, "provider chain exhausted, using extractive fallback");
                }
            }
        }

        let combined: String = results
            .iter()
            .map(|r| r.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let extracted = extract_summary(&combined, self.config.extractive_sentences);

        if !extracted.is_empty() {
            extracted
        } else if let Some(text) = short_generative {
            text
        } else {
            NO_RESULTS_ANSWER.to_string()
        }
    }

    fn build_user_prompt(&self, query: &str, results: &[RetrievalResult]) -> String {
        let mut prompt = String::from("Document excerpts:\n\n");

        for result in results {
            let excerpt: String = result
                .chunk_text
                .chars()
                .take(self.config.max_chunk_chars)
                .collect();
            prompt.push_str(&format!("[Source: {}]\n{}\n\n", result.info.document_id, excerpt));
        }

        prompt.push_str(&format!("Question: {query}"));
        prompt
    }
}

fn confidence_of(results: &[RetrievalResult]) -> u8 {
    if results.is_empty() {
        return 0;
    }
    let mean: f32 = results.iter().map(|r| r.similarity).sum::<f32>() / results.len() as f32;
    (mean * 100.0).round().clamp(0.0, 100.0) as u8
}

fn sources_of(results: &[RetrievalResult]) -> Vec<String> {
    let mut seen = ahash::AHashSet::new();
    results
        .iter()
        .filter(|r| seen.insert(r.info.document_id.clone()))
        .map(|r| r.info.document_id.clone())
        .collect()
}
