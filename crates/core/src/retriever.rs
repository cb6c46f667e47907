use crate::config::RagConfig;
use crate::embeddings::{is_null_vector, EmbeddingProvider};
use crate::error::RetrieveError;
use crate::models::{metadata_document_id, ChunkMatch, ChunkRecord};
use crate::traits::{ChunkStore, DocumentRegistry};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata keys that may carry the parent document id. Historical rows
/// were tagged inconsistently; every lookup tolerates all three.
pub const DOCUMENT_KEYS: [&str; 3] = ["documentId", "document_id", "id"];

/// Two-tier chunk retrieval: exact metadata match with lexical scoring
/// first, vector similarity only when the metadata lookup finds nothing.
/// Vector search costs an embedding round-trip against an unreliable
/// backend, so the cheap deterministic tier always goes first.
pub struct RelevanceRetriever<S, R> {
    store: S,
    registry: R,
    embedder: Arc<EmbeddingProvider>,
    scan_limit: usize,
    similarity_floor: f64,
}

impl<S, R> RelevanceRetriever<S, R>
where
    S: ChunkStore + Send + Sync,
    R: DocumentRegistry + Send + Sync,
{
    pub fn new(store: S, registry: R, embedder: Arc<EmbeddingProvider>, config: &RagConfig) -> Self {
        Self {
            store,
            registry,
            embedder,
            scan_limit: config.metadata_scan_limit,
            similarity_floor: config.similarity_floor,
        }
    }

    pub async fn find_relevant(
        &self,
        document_id: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ChunkMatch>, RetrieveError> {
        let document = self
            .registry
            .find(document_id)
            .await?
            .ok_or_else(|| RetrieveError::NotFound(document_id.to_string()))?;

        if !document.vectorized {
            return Err(RetrieveError::NotVectorized(document_id.to_string()));
        }

        let rows = self
            .store
            .find_by_metadata(&DOCUMENT_KEYS, document_id, self.scan_limit)
            .await?;

        if !rows.is_empty() {
            debug!(document_id, rows = rows.len(), "metadata lookup hit, skipping vector search");
            return Ok(rank_by_terms(rows, question, top_k)
                .into_iter()
                .map(ChunkMatch::from)
                .collect());
        }

        let query_vector = self.embedder.embed_one(question).await;
        if is_null_vector(&query_vector) {
            warn!(document_id, "question embedded to the null vector, skipping vector search");
            return Err(RetrieveError::NoChunksFound(document_id.to_string()));
        }

        let hits = self
            .store
            .similarity_search(&query_vector, top_k * 2, self.similarity_floor)
            .await?;

        let matches: Vec<ChunkMatch> = hits
            .into_iter()
            .map(|hit| hit.record)
            .filter(|record| {
                metadata_document_id(&record.metadata).as_deref() == Some(document_id)
            })
            .take(top_k)
            .map(ChunkMatch::from)
            .collect();

        if matches.is_empty() {
            return Err(RetrieveError::NoChunksFound(document_id.to_string()));
        }

        Ok(matches)
    }
}

/// Lowercase question tokens longer than two characters.
pub fn question_terms(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Total occurrences of the terms in the chunk content, lowercased.
pub fn term_frequency_score(content: &str, terms: &[String]) -> usize {
    let lowered = content.to_lowercase();
    terms
        .iter()
        .map(|term| match Regex::new(&regex::escape(term)) {
            Ok(pattern) => pattern.find_iter(&lowered).count(),
            Err(_) => 0,
        })
        .sum()
}

/// Ranks chunks by term frequency, descending; the sort is stable so
/// ties keep their retrieval order. With no usable terms the first
/// `top_k` rows pass through unscored.
pub fn rank_by_terms(rows: Vec<ChunkRecord>, question: &str, top_k: usize) -> Vec<ChunkRecord> {
    let terms = question_terms(question);
    if terms.is_empty() {
        return rows.into_iter().take(top_k).collect();
    }

    let mut scored: Vec<(usize, ChunkRecord)> = rows
        .into_iter()
        .map(|row| (term_frequency_score(&row.content, &terms), row))
        .collect();

    scored.sort_by(|left, right| right.0.cmp(&left.0));

    scored
        .into_iter()
        .take(top_k)
        .map(|(_, row)| row)
        .collect()
}
