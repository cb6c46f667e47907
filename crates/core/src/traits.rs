use crate::error::{ChatError, StoreError};
use crate::models::{ChunkRecord, DocumentRecord, NewChunk, ScoredChunk, StoreStats};
use async_trait::async_trait;

/// Relational chunk storage with metadata lookup and vector similarity.
#[async_trait]
pub trait ChunkStore {
    /// Writes one chunk row and returns its assigned id.
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<String, StoreError>;

    /// Rows whose metadata carries `value` under any of `keys`, bounded
    /// by `limit` to avoid unbounded scans.
    async fn find_by_metadata(
        &self,
        keys: &[&str],
        value: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Rows whose serialized metadata contains `needle` anywhere. Last
    /// resort for rows the exact-key lookup cannot see.
    async fn find_by_metadata_fragment(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Top-k nearest rows by cosine similarity (`1 - cosine_distance`),
    /// descending, keeping only rows at or above `floor`.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        floor: f64,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Idempotent schema synchronization, invoked once at startup before
    /// the first ingestion. Not part of the hot path.
    async fn ensure_schema(&self) -> Result<(), StoreError>;
}

/// The document registry is owned by a collaborator; the core only
/// consumes it.
#[async_trait]
pub trait DocumentRegistry {
    async fn find(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError>;

    async fn create(&self, record: DocumentRecord) -> Result<(), StoreError>;

    /// Written at most once per document; idempotent if retried.
    async fn mark_vectorized(&self, id: &str) -> Result<(), StoreError>;
}

/// Chat completion capability consumed by the answer synthesizer.
#[async_trait]
pub trait ChatModel {
    async fn complete(
        &self,
        system: &str,
        context: &str,
        question: &str,
    ) -> Result<String, ChatError>;
}
