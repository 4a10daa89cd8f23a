//! Engine facade
//!
//! Wires chunking, embedding, the per-user index, retrieval, synthesis,
//! history and the feedback loop together behind the calls the chat layer
//! consumes. Construction degrades instead of failing: a missing embedding
//! model means keyword retrieval, an empty provider chain means extractive
//! answers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::chunking::chunk_text;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider, RemoteEmbeddingProvider};
use crate::error::{LoreError, Result};
use crate::feedback::{FeedbackEvent, FeedbackProcessor, LearningInsight};
use crate::history::{AnswerRecord, HistoryStore};
use crate::index::{ChunkInfo, IndexStore, IndexedChunk};
use crate::providers::ProviderChain;
use crate::retrieval::Retriever;
use crate::storage::FeedbackLog;
use crate::synthesis::{Answer, Synthesizer};

/// Outcome of an indexing call
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub chunks_indexed: usize,
}

/// Outcome of a removal call
#[derive(Debug, Clone)]
pub struct RemovalReport {
    pub chunks_removed: usize,
}

pub struct Engine {
    config: Config,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    store: Arc<IndexStore>,
    history: Arc<HistoryStore>,
    retriever: Retriever,
    synthesizer: Synthesizer,
    feedback: Arc<FeedbackProcessor>,
    worker: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine from configuration, constructing providers as
    /// configured. Provider absence or failure is never fatal here.
    pub fn new(config: Config, feedback_log: Arc<dyn FeedbackLog>) -> Result<Self> {
        let embedding = build_embedding_provider(&config);
        let chain = ProviderChain::from_config(&config.providers);
        Self::with_parts(config, embedding, chain, feedback_log)
    }

    /// Build an engine from explicit parts. Hosts use this to inject custom
    /// embedding backends or provider chains; tests use it for determinism.
    pub fn with_parts(
        config: Config,
        embedding: Option<Arc<dyn EmbeddingProvider>>,
        chain: ProviderChain,
        feedback_log: Arc<dyn FeedbackLog>,
    ) -> Result<Self> {
        if chain.is_empty() {
            info!("no generative providers configured; answers will be extractive");
        }
        match &embedding {
            Some(provider) => info!(model = provider.model_name(), "embedding provider ready"),
            None => info!("no embedding provider; retrieval will use keyword matching"),
        }

        let store = Arc::new(IndexStore::new());
        let history = Arc::new(HistoryStore::new());
        let retriever = Retriever::new(
            embedding.clone(),
            Arc::clone(&store),
            config.retrieval.clone(),
        );
        let synthesizer = Synthesizer::new(chain.clone(), config.synthesis.clone());
        let feedback = Arc::new(FeedbackProcessor::new(
            feedback_log,
            Some(chain),
            config.feedback.clone(),
        )?);
        let worker = feedback.spawn_interval_worker();

        Ok(Self {
            config,
            embedding,
            store,
            history,
            retriever,
            synthesizer,
            feedback,
            worker: std::sync::Mutex::new(Some(worker)),
        })
    }

    /// Chunk, embed and index a document for a user.
    ///
    /// Not idempotent: indexing the same `document_id` twice duplicates
    /// entries. Remove first to replace. All embedding work completes before
    /// the index is touched, so a failure here leaves it unmodified.
    pub async fn index_document(
        &self,
        user_id: &str,
        document_id: &str,
        content_type: &str,
        text: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<IndexReport> {
        if user_id.is_empty() {
            return Err(LoreError::InvalidArgument("user_id is empty".to_string()));
        }
        if document_id.is_empty() {
            return Err(LoreError::InvalidArgument("document_id is empty".to_string()));
        }

        let chunks: Vec<String> = chunk_text(
            text,
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        )
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect();

        if chunks.is_empty() {
            return Ok(IndexReport { chunks_indexed: 0 });
        }

        let embeddings: Vec<Option<Vec<f32>>> = match self.embedding.as_ref().filter(|p| p.is_available()) {
            Some(provider) => match provider.embed_batch(&chunks).await {
                Ok(embeddings) => embeddings.into_iter().map(Some).collect(),
                Err(e) => {
                    warn!(error = %e, document_id, "embedding failed, indexing without vectors");
                    vec![None; chunks.len()]
                }
            },
            None => vec![None; chunks.len()],
        };

        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (chunk, embedding))| IndexedChunk {
                text: chunk,
                embedding,
                info: ChunkInfo {
                    document_id: document_id.to_string(),
                    content_type: content_type.to_string(),
                    chunk_index,
                    extra: metadata.clone(),
                },
            })
            .collect();

        let chunks_indexed = self.store.add_entries(user_id, entries).await?;
        info!(user_id, document_id, chunks_indexed, "document indexed");

        Ok(IndexReport { chunks_indexed })
    }

    /// Remove all chunks of a document. Removing an unknown document is a
    /// no-op reporting zero.
    pub async fn remove_document(&self, user_id: &str, document_id: &str) -> Result<RemovalReport> {
        if user_id.is_empty() {
            return Err(LoreError::InvalidArgument("user_id is empty".to_string()));
        }

        let chunks_removed = self.store.remove_document(user_id, document_id).await;
        Ok(RemovalReport { chunks_removed })
    }

    /// Distinct indexed document ids for a user.
    pub async fn list_documents(&self, user_id: &str) -> Vec<String> {
        self.store.list_documents(user_id).await
    }

    /// Retrieve, synthesize, and log an answer for a question.
    pub async fn answer_question(&self, user_id: &str, query: &str) -> Result<Answer> {
        if user_id.is_empty() {
            return Err(LoreError::InvalidArgument("user_id is empty".to_string()));
        }

        let bias = self.feedback.current_bias().await;
        let bias = (!bias.is_empty()).then_some(&bias);

        let results = self.retriever.search(user_id, query, bias).await?;
        let answer = self.synthesizer.answer(query, &results).await;

        self.history
            .append(
                user_id,
                AnswerRecord {
                    question: query.to_string(),
                    answer: answer.text.clone(),
                    source_document_ids: answer.source_document_ids.clone(),
                    confidence: answer.confidence,
                    timestamp: Utc::now(),
                },
            )
            .await;

        Ok(answer)
    }

    /// Record a relevance judgment for the learning loop.
    pub async fn record_feedback(&self, event: FeedbackEvent) -> Result<()> {
        self.feedback.record(event).await
    }

    /// Force one feedback batch through immediately instead of waiting for
    /// the size trigger or interval tick.
    pub async fn flush_feedback(&self) -> Result<()> {
        self.feedback.process_pending().await
    }

    /// Recent learning insights, newest first.
    pub async fn insights(&self, limit: usize) -> Vec<LearningInsight> {
        self.feedback.recent_insights(limit).await
    }

    /// Conversation history for a user, oldest first.
    pub async fn history(&self, user_id: &str) -> Vec<AnswerRecord> {
        self.history.get(user_id).await
    }

    /// Drop a user's conversation history.
    pub async fn clear_history(&self, user_id: &str) {
        self.history.clear(user_id).await
    }

    /// Stop the background feedback worker after a final drain.
    pub async fn shutdown(&self) {
        if let Err(e) = self.feedback.process_pending().await {
            warn!(error = %e, "final feedback drain failed");
        }

        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                handle.abort();
            }
        }
    }
}

fn build_embedding_provider(config: &Config) -> Option<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;

    match embedding.provider.as_str() {
        "remote" => {
            let base_url = embedding.remote_base_url.as_deref()?;
            match RemoteEmbeddingProvider::new(
                base_url,
                &embedding.remote_api_key_env,
                &embedding.model,
                embedding.dimension,
                embedding.sub_batch_size,
            ) {
                Ok(provider) => Some(Arc::new(provider)),
                Err(e) => {
                    warn!(error = %e, "remote embedding provider unavailable");
                    None
                }
            }
        }
        _ => match FastEmbedProvider::new(&embedding.model, embedding.sub_batch_size) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                warn!(error = %e, "local embedding model unavailable");
                None
            }
        },
    }
}
